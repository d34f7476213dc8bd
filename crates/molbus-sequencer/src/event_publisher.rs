use std::sync::{Arc, Mutex};

use molbus_core::Activator;
use molbus_protocol::packet::{encode_header, encode_length_prefix, HEADER_LEN, MAX_BODY_LEN, MAX_MESSAGE_LEN};
use molbus_protocol::Session;
use molbus_store::MessageStore;
use tokio::net::UdpSocket;

use crate::error::PublishError;

/// Builds, persists, publishes and advances the session for one event
/// stream (§4.4).
///
/// Only one message may be acquired at a time: call [`acquire`](Self::acquire),
/// fill in the returned slice (the caller has already stamped
/// `applicationId`/`applicationSequenceNumber`/`timestamp` at schema
/// offsets before this), then [`commit`](Self::commit) it. Several
/// messages may be committed before a single [`send`](Self::send).
pub struct EventPublisher<S> {
    session: Session,
    store: Arc<Mutex<S>>,
    socket: UdpSocket,
    activator: Arc<dyn Activator>,
    packet: Box<[u8; HEADER_LEN + MAX_BODY_LEN]>,
    body_cursor: usize,
    lengths: Vec<u16>,
}

impl<S: MessageStore> EventPublisher<S> {
    pub fn new(
        session: Session,
        store: Arc<Mutex<S>>,
        socket: UdpSocket,
        activator: Arc<dyn Activator>,
    ) -> Self {
        Self {
            session,
            store,
            socket,
            activator,
            packet: Box::new([0u8; HEADER_LEN + MAX_BODY_LEN]),
            body_cursor: 0,
            lengths: Vec::new(),
        }
    }

    pub fn pending_count(&self) -> u16 {
        self.lengths.len() as u16
    }

    /// Returns the writable room after the last committed message,
    /// reserving the 2-byte length prefix the next [`commit`](Self::commit)
    /// will fill in.
    pub fn acquire(&mut self) -> Result<&mut [u8], PublishError> {
        if self.body_cursor + 2 >= MAX_BODY_LEN {
            return Err(PublishError::PacketFull);
        }
        Ok(&mut self.packet[HEADER_LEN + self.body_cursor + 2..HEADER_LEN + MAX_BODY_LEN])
    }

    /// Finalizes the most recently acquired message of `length` bytes.
    pub fn commit(&mut self, length: usize) -> Result<(), PublishError> {
        if length > MAX_MESSAGE_LEN {
            return Err(PublishError::TooLarge(length));
        }
        if self.body_cursor + 2 + length > MAX_BODY_LEN {
            return Err(PublishError::PacketFull);
        }
        let prefix_at = HEADER_LEN + self.body_cursor;
        encode_length_prefix(&mut self.packet[prefix_at..prefix_at + 2], length as u16);
        self.body_cursor += 2 + length;
        self.lengths.push(length as u16);
        Ok(())
    }

    /// Persists and emits the currently buffered packet, then advances the
    /// session. A no-op if nothing has been committed since the last send.
    ///
    /// Any I/O or store error halts the publisher via its activator — the
    /// sequencer must be restarted.
    pub async fn send(&mut self) -> Result<(), PublishError> {
        let count = self.lengths.len();
        if count == 0 {
            return Ok(());
        }
        let result = self.send_inner(count).await;
        if let Err(err) = &result {
            self.activator.not_ready("event-publisher", &err.to_string());
            self.activator.stop("event-publisher", &err.to_string());
        }
        result
    }

    async fn send_inner(&mut self, count: usize) -> Result<(), PublishError> {
        let session_name = self.session.name().ok_or(PublishError::SessionNotSet)?;
        let first_seq = self.session.next_seq();
        encode_header(&mut self.packet[..], &session_name, first_seq, count as u16);

        {
            let mut store = self.store.lock().expect("store mutex poisoned");
            let scratch = store.acquire();
            scratch[..self.body_cursor]
                .copy_from_slice(&self.packet[HEADER_LEN..HEADER_LEN + self.body_cursor]);
            store.commit(&self.lengths, 0, count)?;
        }
        self.session.advance(count as u64);

        self.socket
            .send(&self.packet[..HEADER_LEN + self.body_cursor])
            .await?;

        self.body_cursor = 0;
        self.lengths.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molbus_core::LoggingActivator;
    use molbus_store::MemoryMessageStore;

    async fn loopback_pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a.connect(b.local_addr().unwrap()).await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn send_persists_and_advances_session_and_emits_packet() {
        let session = Session::new();
        session.create(*b"AA").unwrap();
        let store = Arc::new(Mutex::new(MemoryMessageStore::new()));
        let (tx_sock, rx_sock) = loopback_pair().await;
        let mut publisher = EventPublisher::new(
            session.clone(),
            Arc::clone(&store),
            tx_sock,
            Arc::new(LoggingActivator),
        );

        let buf = publisher.acquire().unwrap();
        buf[..3].copy_from_slice(b"foo");
        publisher.commit(3).unwrap();
        let buf = publisher.acquire().unwrap();
        buf[..5].copy_from_slice(b"hello");
        publisher.commit(5).unwrap();

        publisher.send().await.unwrap();

        assert_eq!(session.next_seq(), 3);
        assert_eq!(store.lock().unwrap().count(), 2);

        let mut recv_buf = [0u8; HEADER_LEN + MAX_BODY_LEN];
        let n = rx_sock.recv(&mut recv_buf).await.unwrap();
        let header = molbus_protocol::packet::parse_header(&recv_buf, n).unwrap();
        assert_eq!(header.first_seq, 1);
        assert_eq!(header.msg_count, 2);
    }

    #[tokio::test]
    async fn send_with_nothing_committed_is_noop() {
        let session = Session::new();
        session.create(*b"AA").unwrap();
        let store = Arc::new(Mutex::new(MemoryMessageStore::new()));
        let (tx_sock, _rx_sock) = loopback_pair().await;
        let mut publisher = EventPublisher::new(session.clone(), store, tx_sock, Arc::new(LoggingActivator));
        publisher.send().await.unwrap();
        assert_eq!(session.next_seq(), 1);
    }

    #[tokio::test]
    async fn commit_rejects_oversize_message() {
        let session = Session::new();
        session.create(*b"AA").unwrap();
        let store = Arc::new(Mutex::new(MemoryMessageStore::new()));
        let (tx_sock, _rx_sock) = loopback_pair().await;
        let mut publisher = EventPublisher::new(session.clone(), store, tx_sock, Arc::new(LoggingActivator));
        let _ = publisher.acquire().unwrap();
        let err = publisher.commit(MAX_MESSAGE_LEN + 1).unwrap_err();
        assert!(matches!(err, PublishError::TooLarge(_)));
        assert_eq!(session.next_seq(), 1);
    }
}
