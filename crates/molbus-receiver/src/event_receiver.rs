use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use molbus_core::{resolve, Activator, ByteDispatcher, Scheduler, TaskId};
use molbus_protocol::packet::{encode_header, parse_header, HEADER_LEN, MAX_BODY_LEN};
use molbus_protocol::{Address, Session};
use tokio::net::UdpSocket;

use crate::error::ReceiverError;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(1);
const REWIND_TIMEOUT: Duration = Duration::from_secs(1);
/// Largest rewind request count the receiver will ask for in one request.
const MAX_REWIND_COUNT: u64 = 32_767;

struct Inner {
    next_seq_num: u64,
    ready: bool,
    rewind_addresses: VecDeque<Address>,
    recovery_in_flight: bool,
    discovery_timer: Option<TaskId>,
    rewind_timer: Option<TaskId>,
}

/// Consumes the event stream in strict session-sequence order, filling
/// gaps via discovery + rewind (§4.6).
pub struct EventReceiver {
    session: Session,
    event_socket: UdpSocket,
    discovery_socket: UdpSocket,
    discovery_dest: SocketAddr,
    rewind_socket: UdpSocket,
    dispatcher: ByteDispatcher,
    scheduler: Arc<Scheduler>,
    activator: Arc<dyn Activator>,
    inner: Mutex<Inner>,
}

impl EventReceiver {
    pub fn new(
        session: Session,
        event_socket: UdpSocket,
        discovery_socket: UdpSocket,
        discovery_dest: SocketAddr,
        rewind_socket: UdpSocket,
        scheduler: Arc<Scheduler>,
        activator: Arc<dyn Activator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            event_socket,
            discovery_socket,
            discovery_dest,
            rewind_socket,
            dispatcher: ByteDispatcher::new(),
            scheduler,
            activator,
            inner: Mutex::new(Inner {
                next_seq_num: 1,
                ready: false,
                rewind_addresses: VecDeque::new(),
                recovery_in_flight: false,
                discovery_timer: None,
                rewind_timer: None,
            }),
        })
    }

    pub fn dispatcher(&self) -> &ByteDispatcher {
        &self.dispatcher
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().expect("receiver mutex poisoned").ready
    }

    pub fn next_seq_num(&self) -> u64 {
        self.inner.lock().expect("receiver mutex poisoned").next_seq_num
    }

    /// Drives the event, discovery-reply and rewind-reply sockets until an
    /// unrecoverable I/O error occurs.
    pub async fn run(self: &Arc<Self>) -> Result<(), ReceiverError> {
        let mut event_buf = vec![0u8; HEADER_LEN + MAX_BODY_LEN];
        let mut discovery_buf = [0u8; 64];
        let mut rewind_buf = vec![0u8; HEADER_LEN + MAX_BODY_LEN];
        loop {
            tokio::select! {
                res = self.event_socket.recv(&mut event_buf) => {
                    let n = res?;
                    self.handle_packet(&event_buf, n);
                }
                res = self.discovery_socket.recv(&mut discovery_buf) => {
                    let n = res?;
                    self.handle_discovery_reply(&discovery_buf[..n])?;
                }
                res = self.rewind_socket.recv(&mut rewind_buf) => {
                    let n = res?;
                    self.handle_packet(&rewind_buf, n);
                }
            }
        }
    }

    fn handle_discovery_reply(self: &Arc<Self>, reply: &[u8]) -> Result<(), ReceiverError> {
        let text = String::from_utf8_lossy(reply);
        let address = Address::parse(&text)?;
        let mut inner = self.inner.lock().expect("receiver mutex poisoned");
        inner.rewind_addresses.push_back(address);
        if let Some(id) = inner.discovery_timer.take() {
            self.scheduler.cancel(id);
        }
        inner.recovery_in_flight = false;
        drop(inner);
        self.maybe_start_recovery();
        Ok(())
    }

    /// Packet intake shared by the event and rewind-reply sockets (§4.6).
    fn handle_packet(self: &Arc<Self>, buf: &[u8], bytes_read: usize) {
        if bytes_read < HEADER_LEN {
            return;
        }
        let header = match parse_header(buf, bytes_read) {
            Ok(h) => h,
            Err(_) => return,
        };
        match self.session.name() {
            None => {
                if self.session.set_name(header.session).is_err() {
                    return;
                }
            }
            Some(known) if known != header.session => {
                tracing::warn!("dropping packet for a different session");
                return;
            }
            Some(_) => {}
        }
        self.session
            .advance_to_at_least(header.first_seq + u64::from(header.msg_count));

        let messages = molbus_protocol::packet::Messages::new(buf, bytes_read, header.msg_count);
        let mut seq = header.first_seq;
        for body in messages {
            let next_seq_num = self.inner.lock().expect("receiver mutex poisoned").next_seq_num;
            if seq == next_seq_num {
                self.dispatcher.dispatch(body);
                self.inner.lock().expect("receiver mutex poisoned").next_seq_num += 1;
            } else if seq < next_seq_num {
                // already delivered, expected under rewind overlap
            } else {
                break;
            }
            seq += 1;
        }

        self.check_ready_and_recover();
    }

    fn check_ready_and_recover(self: &Arc<Self>) {
        let next_seq_num = self.inner.lock().expect("receiver mutex poisoned").next_seq_num;
        let known_next = self.session.next_seq();
        if next_seq_num >= known_next {
            let mut inner = self.inner.lock().expect("receiver mutex poisoned");
            if !inner.ready {
                inner.ready = true;
                drop(inner);
                self.activator.ready("event-receiver");
            }
        } else {
            self.maybe_start_recovery();
        }
    }

    fn maybe_start_recovery(self: &Arc<Self>) {
        let mut inner = self.inner.lock().expect("receiver mutex poisoned");
        if inner.recovery_in_flight {
            return;
        }
        if self.session.next_seq() <= inner.next_seq_num {
            return;
        }
        inner.recovery_in_flight = true;
        if let Some(address) = inner.rewind_addresses.pop_front() {
            let next_seq_num = inner.next_seq_num;
            let behind = self.session.next_seq() - next_seq_num;
            let count = behind.min(MAX_REWIND_COUNT) as u16;
            drop(inner);
            self.send_rewind_request(address, next_seq_num, count);
        } else {
            drop(inner);
            self.send_discovery_ping();
        }
    }

    fn send_discovery_ping(self: &Arc<Self>) {
        let this = Arc::clone(self);
        if let Err(err) = self.discovery_socket.try_send_to(b"D", self.discovery_dest) {
            tracing::warn!(%err, "failed to send discovery ping");
        }
        let id = self.scheduler.schedule_in(DISCOVERY_TIMEOUT, async move {
            let mut inner = this.inner.lock().expect("receiver mutex poisoned");
            inner.recovery_in_flight = false;
            inner.discovery_timer = None;
            drop(inner);
            this.maybe_start_recovery();
        });
        self.inner.lock().expect("receiver mutex poisoned").discovery_timer = Some(id);
    }

    fn send_rewind_request(self: &Arc<Self>, address: Address, first_seq: u64, count: u16) {
        let this = Arc::clone(self);
        if let Some(session_name) = self.session.name() {
            if let Ok(dest) = resolve(&address) {
                let mut request = [0u8; HEADER_LEN];
                encode_header(&mut request, &session_name, first_seq, count);
                if let Err(err) = self.rewind_socket.try_send_to(&request, dest) {
                    tracing::warn!(%err, "failed to send rewind request");
                }
            }
        }
        let id = self.scheduler.schedule_in(REWIND_TIMEOUT, async move {
            let mut inner = this.inner.lock().expect("receiver mutex poisoned");
            inner.recovery_in_flight = false;
            inner.rewind_timer = None;
            drop(inner);
            this.maybe_start_recovery();
        });
        self.inner.lock().expect("receiver mutex poisoned").rewind_timer = Some(id);
    }
}
