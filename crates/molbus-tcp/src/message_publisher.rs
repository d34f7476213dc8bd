use std::sync::{Arc, Mutex};
use std::time::Duration;

use molbus_protocol::packet::MAX_MESSAGE_LEN;
use molbus_protocol::Session;
use molbus_store::MessageStore;
use tokio::net::TcpStream;

use crate::error::TcpError;
use crate::frame::{write_heartbeat, write_message};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Server side of the TCP unicast variant (§4.9): streams the same event
/// log as the UDP path to one connected peer, interleaving messages with
/// periodic heartbeats.
pub struct MessagePublisher<S> {
    session: Session,
    store: Arc<Mutex<S>>,
}

impl<S: MessageStore> MessagePublisher<S> {
    pub fn new(session: Session, store: Arc<Mutex<S>>) -> Self {
        Self { session, store }
    }

    /// Serves one accepted connection until it disconnects or errors.
    /// The peer's initial 8-byte `nextSeqNum` selects where streaming
    /// resumes.
    pub async fn serve(&self, mut stream: TcpStream) -> Result<(), TcpError> {
        use tokio::io::AsyncReadExt;
        let mut seq_buf = [0u8; 8];
        stream.read_exact(&mut seq_buf).await?;
        let mut next_seq = u64::from_be_bytes(seq_buf).max(1);

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Some(session_name) = self.session.name() {
                        write_heartbeat(&mut stream, &session_name, next_seq).await?;
                    }
                }
                _ = poll.tick() => {
                    self.drain(&mut stream, &mut next_seq).await?;
                }
            }
        }
    }

    async fn drain(&self, stream: &mut TcpStream, next_seq: &mut u64) -> Result<(), TcpError> {
        let mut body = vec![0u8; MAX_MESSAGE_LEN];
        loop {
            let count = self.store.lock().expect("store mutex poisoned").count();
            if *next_seq > count {
                return Ok(());
            }
            let len = self
                .store
                .lock()
                .expect("store mutex poisoned")
                .read(&mut body, 0, *next_seq)?;
            write_message(stream, &body[..len]).await?;
            *next_seq += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molbus_protocol::packet::encode_length_prefix;
    use molbus_store::MemoryMessageStore;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn frame(buf: &mut [u8], offset: usize, body: &[u8]) -> usize {
        encode_length_prefix(&mut buf[offset..offset + 2], body.len() as u16);
        buf[offset + 2..offset + 2 + body.len()].copy_from_slice(body);
        offset + 2 + body.len()
    }

    #[tokio::test]
    async fn streams_stored_messages_from_requested_offset() {
        let session = Session::new();
        session.create(*b"AA").unwrap();
        let mut store = MemoryMessageStore::new();
        let lengths = [3u16, 3];
        {
            let scratch = store.acquire();
            let mut off = frame(scratch, 0, b"one");
            off = frame(scratch, off, b"two");
            let _ = off;
        }
        store.commit(&lengths, 0, 2).unwrap();
        let store = Arc::new(Mutex::new(store));
        let publisher = MessagePublisher::new(session, store);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = tokio::time::timeout(Duration::from_millis(200), publisher.serve(stream)).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&2u64.to_be_bytes()).await.unwrap();

        let mut reader = client;
        let frame = crate::frame::read_frame(&mut reader).await.unwrap();
        match frame {
            crate::frame::Frame::Message(body) => assert_eq!(body, b"two"),
            crate::frame::Frame::Heartbeat { .. } => panic!("expected a message frame first"),
        }
        server.abort();
    }
}
