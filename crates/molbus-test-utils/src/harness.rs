use std::sync::{Arc, Mutex};

use molbus_core::{Activator, LoggingActivator, Scheduler};
use molbus_protocol::Session;
use molbus_receiver::EventReceiver;
use molbus_sequencer::EventPublisher;
use molbus_store::MemoryMessageStore;

use crate::udp::{bind_loopback, loopback_pair};

/// A publisher wired directly to a receiver over real loopback UDP
/// sockets, backed by an in-memory store — enough to exercise full
/// publish/deliver round trips without a multicast group.
pub struct LoopbackHarness {
    pub publisher: EventPublisher<MemoryMessageStore>,
    pub receiver: Arc<EventReceiver>,
}

impl LoopbackHarness {
    pub async fn new() -> Self {
        let session_tx = Session::new();
        session_tx.create(*b"AA").expect("create session");
        let session_rx = Session::new();

        let (event_tx, event_rx) = loopback_pair().await;
        let discovery_tx = bind_loopback().await;
        let discovery_rx = bind_loopback().await;
        let discovery_dest = discovery_tx.local_addr().expect("discovery addr");
        let rewind_rx = bind_loopback().await;

        let store = Arc::new(Mutex::new(MemoryMessageStore::new()));
        let publisher = EventPublisher::new(session_tx, store, event_tx, Arc::new(LoggingActivator));

        let receiver = EventReceiver::new(
            session_rx,
            event_rx,
            discovery_rx,
            discovery_dest,
            rewind_rx,
            Scheduler::new(),
            Arc::new(LoggingActivator) as Arc<dyn Activator>,
        );

        Self { publisher, receiver }
    }

    /// Spawns the receiver's run loop in the background; returns its
    /// `JoinHandle` so callers can abort it at teardown.
    pub fn spawn_receiver(&self) -> tokio::task::JoinHandle<()> {
        let receiver = Arc::clone(&self.receiver);
        tokio::spawn(async move {
            let _ = receiver.run().await;
        })
    }
}
