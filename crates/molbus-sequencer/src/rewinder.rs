use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use molbus_protocol::packet::{encode_header, parse_header, HEADER_LEN, MAX_BODY_LEN};
use molbus_protocol::{Address, Session};
use molbus_store::MessageStore;
use tokio::net::UdpSocket;

use crate::error::RewindError;

/// Serves rewind requests out of the shared message store and answers
/// discovery pings with the rewind socket's address (§4.5).
pub struct Rewinder<S> {
    session: Session,
    store: Arc<Mutex<S>>,
    discovery_socket: UdpSocket,
    rewind_socket: UdpSocket,
}

impl<S: MessageStore> Rewinder<S> {
    pub fn new(
        session: Session,
        store: Arc<Mutex<S>>,
        discovery_socket: UdpSocket,
        rewind_socket: UdpSocket,
    ) -> Self {
        Self { session, store, discovery_socket, rewind_socket }
    }

    /// The address peers should connect their rewind request to, in
    /// `inet:<host>:<port>` form.
    pub fn rewind_address(&self) -> std::io::Result<Address> {
        let addr = self.rewind_socket.local_addr()?;
        Ok(Address {
            host: addr.ip().to_string(),
            port: Some(addr.port()),
            interface: None,
        })
    }

    /// Runs the discovery and rewind serve loops until a socket error
    /// occurs. Callers normally spawn this as a task and observe failure
    /// through the returned error plus their own activator.
    pub async fn run(&self) -> Result<(), RewindError> {
        let mut discovery_buf = [0u8; 8];
        let mut rewind_buf = [0u8; HEADER_LEN];
        loop {
            tokio::select! {
                res = self.discovery_socket.recv_from(&mut discovery_buf) => {
                    let (n, from) = res?;
                    self.handle_discovery_ping(&discovery_buf[..n], from).await?;
                }
                res = self.rewind_socket.recv_from(&mut rewind_buf) => {
                    let (n, from) = res?;
                    self.handle_rewind_request(&rewind_buf, n, from).await?;
                }
            }
        }
    }

    async fn handle_discovery_ping(&self, buf: &[u8], from: SocketAddr) -> Result<(), RewindError> {
        if buf != b"D" {
            return Ok(());
        }
        let reply = self.rewind_address()?.to_string();
        self.discovery_socket.send_to(reply.as_bytes(), from).await?;
        Ok(())
    }

    async fn handle_rewind_request(
        &self,
        buf: &[u8],
        bytes_read: usize,
        from: SocketAddr,
    ) -> Result<(), RewindError> {
        let header = match parse_header(buf, bytes_read) {
            Ok(header) => header,
            Err(_) => {
                tracing::warn!(?from, "malformed rewind request");
                return Ok(());
            }
        };
        let Some(current_session) = self.session.name() else {
            tracing::warn!(?from, "rewind request before session is set");
            return Ok(());
        };
        if header.session != current_session {
            tracing::warn!(?from, "rewind request for a different session");
            return Ok(());
        }
        let first_seq = header.first_seq;
        let count = header.msg_count;
        let next_seq = self.session.next_seq();
        if first_seq == 0 || count == 0 || first_seq + u64::from(count) > next_seq {
            tracing::warn!(?from, first_seq, count, next_seq, "invalid rewind range");
            return Ok(());
        }

        let mut reply = vec![0u8; HEADER_LEN + MAX_BODY_LEN];
        let (written, packed) = {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.read_range_framed(&mut reply[HEADER_LEN..], first_seq, count)?
        };
        encode_header(&mut reply, &current_session, first_seq, packed);
        self.rewind_socket
            .send_to(&reply[..HEADER_LEN + written], from)
            .await?;
        Ok(())
    }
}
