use molbus_protocol::packet::{parse_header, Messages, HEADER_LEN, MAX_BODY_LEN};
use molbus_protocol::Session;
use tokio::net::UdpSocket;

use crate::error::CommandError;

/// Binds the command address and, for each incoming packet, validates the
/// session and invokes a listener with each framed message body (§4.8).
/// Malformed packets are dropped with a warning; they never stop the
/// receiver.
pub struct CommandReceiver {
    session: Session,
    socket: UdpSocket,
}

impl CommandReceiver {
    pub fn new(session: Session, socket: UdpSocket) -> Self {
        Self { session, socket }
    }

    /// Receives packets until a socket error occurs, invoking `listener`
    /// with each message body found in a valid packet.
    pub async fn run(&self, mut listener: impl FnMut(&[u8])) -> Result<(), CommandError> {
        let mut buf = vec![0u8; HEADER_LEN + MAX_BODY_LEN];
        loop {
            let n = self.socket.recv(&mut buf).await?;
            self.handle_packet(&buf, n, &mut listener);
        }
    }

    fn handle_packet(&self, buf: &[u8], bytes_read: usize, listener: &mut impl FnMut(&[u8])) {
        if bytes_read < HEADER_LEN {
            tracing::warn!("dropping short command packet");
            return;
        }
        let header = match parse_header(buf, bytes_read) {
            Ok(header) => header,
            Err(_) => {
                tracing::warn!("dropping malformed command packet");
                return;
            }
        };
        match self.session.name() {
            None => {
                if self.session.set_name(header.session).is_err() {
                    return;
                }
            }
            Some(known) if known != header.session => {
                tracing::warn!("dropping command packet for a different session");
                return;
            }
            Some(_) => {}
        }

        let messages = Messages::new(buf, bytes_read, header.msg_count);
        for body in messages {
            listener(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molbus_protocol::packet::{encode_header, encode_length_prefix};
    use std::sync::{Arc, Mutex};

    fn frame(buf: &mut [u8], offset: usize, body: &[u8]) -> usize {
        encode_length_prefix(&mut buf[offset..offset + 2], body.len() as u16);
        buf[offset + 2..offset + 2 + body.len()].copy_from_slice(body);
        offset + 2 + body.len()
    }

    fn build_packet(session: &[u8; 10], first_seq: u64, messages: &[&[u8]]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + MAX_BODY_LEN];
        encode_header(&mut buf, session, first_seq, messages.len() as u16);
        let mut off = HEADER_LEN;
        for m in messages {
            off = frame(&mut buf, off, m);
        }
        buf.truncate(off);
        buf
    }

    #[tokio::test]
    async fn valid_packet_dispatches_every_message() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = CommandReceiver::new(Session::new(), socket);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let packet = build_packet(b"20240101AA", 1, &[b"one", b"two"]);
        receiver.handle_packet(&packet, packet.len(), &mut |body| {
            seen2.lock().unwrap().push(body.to_vec());
        });
        assert_eq!(*seen.lock().unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(receiver.session.name().unwrap(), *b"20240101AA");
    }

    #[tokio::test]
    async fn session_mismatch_is_dropped() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = CommandReceiver::new(Session::new(), socket);
        let first = build_packet(b"20240101AA", 1, &[b"a"]);
        receiver.handle_packet(&first, first.len(), &mut |_| {});
        let mut hits = 0;
        let other = build_packet(b"20240101BB", 2, &[b"b"]);
        receiver.handle_packet(&other, other.len(), &mut |_| hits += 1);
        assert_eq!(hits, 0);
    }

    #[tokio::test]
    async fn short_packet_is_dropped() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = CommandReceiver::new(Session::new(), socket);
        let mut hits = 0;
        receiver.handle_packet(&[0u8; 5], 5, &mut |_| hits += 1);
        assert_eq!(hits, 0);
        assert!(receiver.session.name().is_none());
    }
}
