use std::sync::{Arc, Mutex};
use std::time::Duration;

use molbus_core::{Activator, ByteDispatcher, PacketRing, PacketSlot, Scheduler, TaskId};
use molbus_protocol::packet::{encode_header, encode_length_prefix, HEADER_LEN, MAX_BODY_LEN, MAX_MESSAGE_LEN};
use molbus_protocol::schema::{read_u16, read_u32, write_u16, write_u32};
use molbus_protocol::{Schema, Session};
use tokio::net::UdpSocket;
use tokio::sync::Notify;

use crate::error::CommandError;

const SEND_TIMEOUT: Duration = Duration::from_millis(100);
const INITIAL_RING_CAPACITY: usize = 4;

struct State {
    app_id: u16,
    ready: bool,
    next_app_seq_num: u32,
    next_confirmed_app_seq_num: u32,
    ring: PacketRing,
    send_timer: Option<TaskId>,
}

/// Delivers each committed command into the event stream exactly once,
/// despite UDP loss, by retransmitting until the sequencer's echo confirms
/// it (§4.7). Implements the non-resetting variant (§9).
pub struct CommandPublisher {
    name: Vec<u8>,
    session: Session,
    schema: Arc<dyn Schema>,
    socket: UdpSocket,
    scheduler: Arc<Scheduler>,
    activator: Arc<dyn Activator>,
    notify: Notify,
    state: Mutex<State>,
}

impl CommandPublisher {
    /// Creates a publisher and enqueues its identity-bootstrap
    /// application-definition message (`applicationId = 0`), encoded by
    /// `encode_application_definition`.
    pub fn new(
        name: Vec<u8>,
        session: Session,
        schema: Arc<dyn Schema>,
        socket: UdpSocket,
        scheduler: Arc<Scheduler>,
        activator: Arc<dyn Activator>,
        application_definition: &[u8],
    ) -> Arc<Self> {
        let publisher = Arc::new(Self {
            name,
            session,
            schema,
            socket,
            scheduler,
            activator,
            notify: Notify::new(),
            state: Mutex::new(State {
                app_id: 0,
                ready: false,
                next_app_seq_num: 1,
                next_confirmed_app_seq_num: 1,
                ring: PacketRing::new(INITIAL_RING_CAPACITY),
                send_timer: None,
            }),
        });
        publisher
            .commit(application_definition)
            .expect("identity bootstrap message must fit one packet");
        publisher
    }

    /// Registers this publisher's echo-confirmation hook as a
    /// before-dispatch listener on the event dispatcher it is fed from
    /// (§9: publish-subscribe, no ownership cycle).
    pub fn attach(self: &Arc<Self>, dispatcher: &ByteDispatcher) {
        let this = Arc::clone(self);
        dispatcher.add_before_dispatch_listener(move |body| this.on_event(body));
    }

    pub fn application_id(&self) -> u16 {
        self.state.lock().expect("publisher mutex poisoned").app_id
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().expect("publisher mutex poisoned").ready
    }

    /// `nextConfirmedAppSeqNum == nextAppSeqNum`: every committed message
    /// has been echoed.
    pub fn is_current(&self) -> bool {
        let state = self.state.lock().expect("publisher mutex poisoned");
        state.next_confirmed_app_seq_num == state.next_app_seq_num
    }

    /// Stamps `body`'s applicationId/applicationSequenceNumber fields (at
    /// schema offsets) and enqueues it into the packet ring, opening a new
    /// packet if the current one is full. Returns the assigned
    /// applicationSequenceNumber.
    pub fn commit(self: &Arc<Self>, body: &[u8]) -> Result<u32, CommandError> {
        if body.len() > MAX_MESSAGE_LEN {
            return Err(CommandError::TooLarge(body.len()));
        }
        let mut stamped = body.to_vec();
        let mut state = self.state.lock().expect("publisher mutex poisoned");
        let app_seq = state.next_app_seq_num;
        state.next_app_seq_num += 1;
        write_u16(&mut stamped, self.schema.application_id_offset(), state.app_id);
        write_u32(&mut stamped, self.schema.application_seq_num_offset(), app_seq);

        loop {
            let slot = state.ring.next_slot_mut();
            let needed = 2 + stamped.len();
            if slot.count > 0 && slot.body_len + needed > MAX_BODY_LEN {
                state.ring.advance_sent();
                continue;
            }
            if slot.count == 0 {
                slot.first_app_seq = app_seq;
            }
            let at = slot.body_len;
            encode_length_prefix(&mut slot.body[at..at + 2], stamped.len() as u16);
            slot.body[at + 2..at + 2 + stamped.len()].copy_from_slice(&stamped);
            slot.body_len += needed;
            slot.count += 1;
            break;
        }
        drop(state);
        self.notify.notify_one();
        Ok(app_seq)
    }

    /// Wakes on commits and confirmations, transmitting or retransmitting
    /// the oldest outstanding packet. Runs until the task is dropped.
    pub async fn run(self: &Arc<Self>) {
        loop {
            self.notify.notified().await;
            self.try_send().await;
        }
    }

    async fn try_send(self: &Arc<Self>) {
        let outstanding = {
            let mut state = self.state.lock().expect("publisher mutex poisoned");
            {
                let current = state.ring.next_slot_mut();
                if current.count > 0 {
                    state.ring.advance_sent();
                }
            }
            if state.send_timer.is_some() {
                return;
            }
            state
                .ring
                .unconfirmed()
                .next()
                .map(packet_snapshot)
        };
        let Some((body, first_app_seq, count)) = outstanding else {
            return;
        };
        let Some(session_name) = self.session.name() else {
            return;
        };
        let mut packet = vec![0u8; HEADER_LEN + body.len()];
        encode_header(&mut packet, &session_name, u64::from(first_app_seq), count);
        packet[HEADER_LEN..].copy_from_slice(&body);
        if let Err(err) = self.socket.send(&packet).await {
            tracing::warn!(%err, "command send failed");
            return;
        }

        let this = Arc::clone(self);
        let id = self.scheduler.schedule_in(SEND_TIMEOUT, async move {
            this.state.lock().expect("publisher mutex poisoned").send_timer = None;
            this.try_send().await;
        });
        self.state.lock().expect("publisher mutex poisoned").send_timer = Some(id);
    }

    /// Before-dispatch hook: watches every event for this publisher's own
    /// echo or its identity-bootstrap applicationDefinition echo.
    fn on_event(self: &Arc<Self>, body: &[u8]) {
        if body.len() < self.schema.application_seq_num_offset() + 4 {
            return;
        }
        let event_app_id = read_u16(body, self.schema.application_id_offset());
        let event_app_seq = read_u32(body, self.schema.application_seq_num_offset());

        let mut state = self.state.lock().expect("publisher mutex poisoned");
        let confirmed = if state.app_id != 0 && event_app_id == state.app_id {
            true
        } else if state.app_id == 0
            && self.schema.message_name(body) == self.schema.application_definition_name()
            && self.schema.application_definition_applicant_name(body) == self.name.as_slice()
        {
            state.app_id = event_app_id;
            rewrite_applicant_ids(&mut state.ring, self.schema.as_ref(), event_app_id);
            state.ready = true;
            drop(state);
            self.activator.ready("command-publisher");
            state = self.state.lock().expect("publisher mutex poisoned");
            true
        } else {
            false
        };

        if !confirmed {
            return;
        }
        state.next_confirmed_app_seq_num = event_app_seq + 1;
        let before = state.ring.in_flight();
        state.ring.confirm_up_to(state.next_confirmed_app_seq_num);
        let shrank = state.ring.in_flight() < before;
        let timer = if shrank { state.send_timer.take() } else { None };
        drop(state);
        if let Some(id) = timer {
            self.scheduler.cancel(id);
        }
        self.notify.notify_one();
    }
}

fn packet_snapshot(slot: &PacketSlot) -> (Vec<u8>, u32, u16) {
    (slot.body[..slot.body_len].to_vec(), slot.first_app_seq, slot.count)
}

/// Rewrites the applicationId field of every still-buffered message across
/// every packet in the ring, in place, now that it has been learned.
fn rewrite_applicant_ids(ring: &mut PacketRing, schema: &dyn Schema, new_id: u16) {
    let offset = schema.application_id_offset();
    for slot in ring.all_buffered_mut() {
        let mut cursor = 0;
        for _ in 0..slot.count {
            let len = u16::from_be_bytes(slot.body[cursor..cursor + 2].try_into().unwrap()) as usize;
            let body_start = cursor + 2;
            write_u16(&mut slot.body[body_start..body_start + len], offset, new_id);
            cursor = body_start + len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molbus_core::LoggingActivator;

    const NAME_OFFSET: usize = 14;
    const NAME_LEN: usize = 8;
    const APPLICANT_OFFSET: usize = NAME_OFFSET + NAME_LEN;

    struct DemoSchema;

    impl Schema for DemoSchema {
        fn application_id_offset(&self) -> usize {
            0
        }
        fn application_seq_num_offset(&self) -> usize {
            2
        }
        fn timestamp_offset(&self) -> usize {
            6
        }
        fn application_definition_name(&self) -> &[u8] {
            b"APPDEF\0\0"
        }
        fn application_discovery_name(&self) -> &[u8] {
            b"APPDISC\0"
        }
        fn message_name<'a>(&self, body: &'a [u8]) -> &'a [u8] {
            &body[NAME_OFFSET..NAME_OFFSET + NAME_LEN]
        }
        fn application_definition_applicant_name<'a>(&self, body: &'a [u8]) -> &'a [u8] {
            &body[APPLICANT_OFFSET..]
        }
    }

    fn build_message(name: &[u8; 8], payload: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; APPLICANT_OFFSET + payload.len()];
        body[NAME_OFFSET..APPLICANT_OFFSET].copy_from_slice(name);
        body[APPLICANT_OFFSET..].copy_from_slice(payload);
        body
    }

    /// An event-stream echo of `original`, with applicationId/appSeqNum
    /// stamped as the sequencer would after accepting the command.
    fn echo(original: &[u8], app_id: u16, app_seq: u32) -> Vec<u8> {
        let mut body = original.to_vec();
        write_u16(&mut body, 0, app_id);
        write_u32(&mut body, 2, app_seq);
        body
    }

    async fn make_publisher(name: &[u8]) -> (Arc<CommandPublisher>, UdpSocket) {
        let session = Session::new();
        session.create(*b"AA").unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server.local_addr().unwrap()).await.unwrap();
        let bootstrap = build_message(b"APPDEF\0\0", name);
        let publisher = CommandPublisher::new(
            name.to_vec(),
            session,
            Arc::new(DemoSchema),
            socket,
            Scheduler::new(),
            Arc::new(LoggingActivator),
            &bootstrap,
        );
        (publisher, server)
    }

    #[tokio::test]
    async fn learns_application_id_and_rewrites_buffered_packets() {
        let (publisher, _server) = make_publisher(b"foo").await;
        assert_eq!(publisher.application_id(), 0);
        assert!(!publisher.is_ready());

        // Commit a second command before the identity-bootstrap message is
        // confirmed, so it sits in the ring stamped with applicationId 0.
        let cmd = build_message(b"DOTHING\0", b"payload");
        publisher.commit(&cmd).unwrap();

        let bootstrap = build_message(b"APPDEF\0\0", b"foo");
        let echoed = echo(&bootstrap, 7, 1);
        publisher.on_event(&echoed);

        assert_eq!(publisher.application_id(), 7);
        assert!(publisher.is_ready());
        assert!(!publisher.is_current(), "second command not yet confirmed");

        let mut state = publisher.state.lock().unwrap();
        let rewritten_id = {
            // Both messages still sit in the not-yet-sent current slot.
            let slot = state.ring.next_slot_mut();
            u16::from_be_bytes(slot.body[2..4].try_into().unwrap())
        };
        assert_eq!(rewritten_id, 7, "buffered message must be rewritten to the learned id");
    }

    #[tokio::test]
    async fn confirmation_of_own_echo_advances_ring_and_marks_current() {
        let (publisher, _server) = make_publisher(b"foo").await;
        let bootstrap = build_message(b"APPDEF\0\0", b"foo");
        publisher.on_event(&echo(&bootstrap, 7, 1));
        assert!(publisher.is_current());

        let cmd = build_message(b"DOTHING\0", b"payload");
        publisher.commit(&cmd).unwrap();
        assert!(!publisher.is_current());

        publisher.on_event(&echo(&cmd, 7, 2));
        assert!(publisher.is_current());
    }

    #[tokio::test(start_paused = true)]
    async fn ring_wraparound_reuses_slots_without_corrupting_framing() {
        let (publisher, server) = make_publisher(b"foo").await;
        tokio::spawn({
            let publisher = Arc::clone(&publisher);
            async move { publisher.run().await }
        });

        let mut buf = vec![0u8; HEADER_LEN + MAX_BODY_LEN];

        // Confirm the identity-bootstrap message (app seq 1) first.
        let n = server.recv(&mut buf).await.unwrap();
        let header = molbus_protocol::packet::parse_header(&buf, n).unwrap();
        assert_eq!(header.first_seq, 1);
        let bootstrap = build_message(b"APPDEF\0\0", b"foo");
        publisher.on_event(&echo(&bootstrap, 7, 1));
        tokio::task::yield_now().await;

        // Commit and confirm one command at a time, well past the ring's
        // initial capacity of 4, so physical slots get reused by
        // `next_slot_mut` after `confirm_up_to` frees them.
        for i in 0..6u32 {
            let app_seq = i + 2;
            let payload = format!("cmd{i}");
            let cmd = build_message(b"DOTHING\0", payload.as_bytes());
            publisher.commit(&cmd).unwrap();

            let n = server.recv(&mut buf).await.unwrap();
            let header = molbus_protocol::packet::parse_header(&buf, n).unwrap();
            assert_eq!(
                header.first_seq,
                u64::from(app_seq),
                "a reused slot must not keep the confirmed packet's old first_app_seq"
            );
            assert_eq!(
                header.msg_count, 1,
                "a reused slot must not carry over a stale message from before it was confirmed"
            );
            let messages: Vec<&[u8]> =
                molbus_protocol::packet::Messages::new(&buf, n, header.msg_count).collect();
            assert_eq!(
                messages,
                vec![cmd.as_slice()],
                "reused slot body must contain only the new message, not stale bytes appended after it"
            );

            publisher.on_event(&echo(&cmd, 7, app_seq));
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retransmits_every_100ms_until_confirmed() {
        let (publisher, server) = make_publisher(b"foo").await;
        tokio::spawn({
            let publisher = Arc::clone(&publisher);
            async move { publisher.run().await }
        });

        let mut buf = vec![0u8; HEADER_LEN + MAX_BODY_LEN];
        let n = server.recv(&mut buf).await.unwrap();
        let first_header = molbus_protocol::packet::parse_header(&buf, n).unwrap();
        assert_eq!(first_header.first_seq, 1); // the bootstrap message's app seq

        for _ in 0..3 {
            tokio::time::advance(SEND_TIMEOUT + Duration::from_millis(5)).await;
            let n = server.recv(&mut buf).await.unwrap();
            let header = molbus_protocol::packet::parse_header(&buf, n).unwrap();
            assert_eq!(header.first_seq, 1, "same unconfirmed packet must be retransmitted");
        }

        let bootstrap = build_message(b"APPDEF\0\0", b"foo");
        publisher.on_event(&echo(&bootstrap, 7, 1));
        tokio::task::yield_now().await;

        // No further retransmit once confirmed.
        tokio::time::advance(SEND_TIMEOUT * 3).await;
        let result = tokio::time::timeout(Duration::from_millis(10), server.recv(&mut buf)).await;
        assert!(result.is_err(), "confirmed packet must stop retransmitting");
    }
}
