use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use molbus_core::ByteDispatcher;
use molbus_protocol::schema::write_u64;
use molbus_protocol::Schema;
use molbus_sequencer::{EventPublisher, PublishError};
use molbus_store::MessageStore;

use crate::error::BusError;

/// Sequencer-facing facade (C10) composing an [`EventPublisher`] with the
/// schema's timestamp stamping and local event/command taps.
pub struct BusServer<S> {
    publisher: Mutex<EventPublisher<S>>,
    schema: Arc<dyn Schema>,
    event_dispatcher: ByteDispatcher,
    command_dispatcher: ByteDispatcher,
    active: AtomicBool,
    application_id: u16,
    application_seq_num: AtomicU32,
}

impl<S: MessageStore> BusServer<S> {
    pub fn new(publisher: EventPublisher<S>, schema: Arc<dyn Schema>, application_id: u16) -> Self {
        Self {
            publisher: Mutex::new(publisher),
            schema,
            event_dispatcher: ByteDispatcher::new(),
            command_dispatcher: ByteDispatcher::new(),
            active: AtomicBool::new(false),
            application_id,
            application_seq_num: AtomicU32::new(1),
        }
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }

    /// Dispatcher for locally observing events as they are committed.
    pub fn dispatcher(&self) -> &ByteDispatcher {
        &self.event_dispatcher
    }

    /// Dispatcher fed by [`copy`](Self::copy) with every inbound command
    /// accepted into the event stream.
    pub fn command_dispatcher(&self) -> &ByteDispatcher {
        &self.command_dispatcher
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn application_id(&self) -> u16 {
        self.application_id
    }

    pub fn application_seq_num(&self) -> u32 {
        self.application_seq_num.load(Ordering::SeqCst)
    }

    pub fn inc_application_seq_num(&self) -> u32 {
        self.application_seq_num.fetch_add(1, Ordering::SeqCst)
    }

    /// Acquires the writable tail of the current packet. The returned
    /// [`Acquired`] guard must be finalized with
    /// [`commit`](Acquired::commit) or [`commit_with_timestamp`](Acquired::commit_with_timestamp).
    pub fn acquire(&self) -> Result<Acquired<'_, S>, BusError> {
        let mut publisher = self.publisher.lock().expect("publisher mutex poisoned");
        publisher.acquire()?;
        Ok(Acquired {
            publisher,
            schema: Arc::clone(&self.schema),
            active: self.is_active(),
        })
    }

    pub async fn send(&self) -> Result<(), BusError> {
        let mut publisher = self.publisher.lock().expect("publisher mutex poisoned");
        publisher.send().await?;
        Ok(())
    }

    /// Copies an accepted command body into the event stream, applying
    /// `decoder` to validate/transform it first. Returns `Ok(None)` if the
    /// decoder rejected the command.
    pub fn copy(
        &self,
        command_body: &[u8],
        decoder: impl FnOnce(&[u8]) -> Option<Vec<u8>>,
        timestamp: Option<u64>,
    ) -> Result<Option<()>, BusError> {
        let Some(event_body) = decoder(command_body) else {
            return Ok(None);
        };
        self.command_dispatcher.dispatch(command_body);
        let mut publisher = self.publisher.lock().expect("publisher mutex poisoned");
        let buf = publisher.acquire()?;
        if event_body.len() > buf.len() {
            return Err(BusError::Publish(PublishError::PacketFull));
        }
        buf[..event_body.len()].copy_from_slice(&event_body);
        if self.is_active() {
            let ts = timestamp.unwrap_or_else(now_nanos);
            write_u64(buf, self.schema.timestamp_offset(), ts);
        }
        publisher.commit(event_body.len())?;
        drop(publisher);
        self.event_dispatcher.dispatch(&event_body);
        Ok(Some(()))
    }
}

/// A writable slot acquired from a [`BusServer`], released by committing.
pub struct Acquired<'a, S> {
    publisher: MutexGuard<'a, EventPublisher<S>>,
    schema: Arc<dyn Schema>,
    active: bool,
}

impl<'a, S: MessageStore> Acquired<'a, S> {
    pub fn as_mut(&mut self) -> &mut [u8] {
        self.publisher.acquire().expect("slot validated at acquire time")
    }

    /// Commits `length` bytes, stamping the current time into the schema's
    /// timestamp field when the server is active.
    pub fn commit(self, length: usize) -> Result<(), BusError> {
        self.commit_with_timestamp(length, now_nanos())
    }

    pub fn commit_with_timestamp(mut self, length: usize, timestamp: u64) -> Result<(), BusError> {
        if self.active {
            let offset = self.schema.timestamp_offset();
            let buf = self.publisher.acquire()?;
            write_u64(buf, offset, timestamp);
        }
        self.publisher.commit(length)?;
        Ok(())
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos() as u64
}
