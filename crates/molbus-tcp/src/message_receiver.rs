use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use molbus_core::ByteDispatcher;
use molbus_protocol::Session;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::TcpError;
use crate::frame::{read_frame, Frame};

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Client side of the TCP unicast variant (§4.9). Session adoption follows
/// the same rules as the UDP event receiver; gaps cannot occur on an
/// ordered byte stream, so every message received after the handshake is
/// delivered and the cursor simply increments.
pub struct MessageReceiver {
    session: Session,
    addr: SocketAddr,
    dispatcher: ByteDispatcher,
    next_seq_num: Mutex<u64>,
}

impl MessageReceiver {
    pub fn new(session: Session, addr: SocketAddr, starting_seq_num: u64) -> Arc<Self> {
        Arc::new(Self {
            session,
            addr,
            dispatcher: ByteDispatcher::new(),
            next_seq_num: Mutex::new(starting_seq_num.max(1)),
        })
    }

    pub fn dispatcher(&self) -> &ByteDispatcher {
        &self.dispatcher
    }

    pub fn next_seq_num(&self) -> u64 {
        *self.next_seq_num.lock().expect("receiver mutex poisoned")
    }

    /// Connects, streams, and reconnects on inactivity or I/O error,
    /// forever.
    pub async fn run(self: &Arc<Self>) -> ! {
        loop {
            if let Err(err) = self.connect_and_consume().await {
                tracing::warn!(%err, "tcp receiver disconnected, reconnecting");
            }
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    }

    async fn connect_and_consume(self: &Arc<Self>) -> Result<(), TcpError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        let next_seq = self.next_seq_num();
        stream.write_all(&next_seq.to_be_bytes()).await?;
        loop {
            let frame = tokio::time::timeout(INACTIVITY_TIMEOUT, read_frame(&mut stream))
                .await
                .map_err(|_| TcpError::InactivityTimeout)??;
            match frame {
                Frame::Message(body) => {
                    self.dispatcher.dispatch(&body);
                    *self.next_seq_num.lock().expect("receiver mutex poisoned") += 1;
                }
                Frame::Heartbeat { session, .. } => {
                    if self.session.name().is_none() {
                        let _ = self.session.set_name(session);
                    } else if self.session.name() != Some(session) {
                        tracing::warn!("heartbeat reports a different session, reconnecting");
                        return Ok(());
                    }
                }
            }
        }
    }
}
