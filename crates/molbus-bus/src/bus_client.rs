use std::sync::{Arc, Mutex};

use molbus_commands::CommandPublisher;
use molbus_core::{Activator, ByteDispatcher, Scheduler};
use molbus_protocol::{Schema, SessionName};
use molbus_receiver::EventReceiver;
use tokio::net::UdpSocket;

type CloseListener = Box<dyn Fn(&SessionName) + Send + Sync>;

/// Subscriber-facing facade (C10) wrapping an [`EventReceiver`] and minting
/// [`Provider`]s for sending commands back into the bus.
///
/// `Session` has no native concept of closing — a session simply ends when
/// a new one begins — so [`add_close_session_listener`](Self::add_close_session_listener)
/// is fired explicitly via [`notify_session_closed`](Self::notify_session_closed)
/// by whatever detects the transition (e.g. the binary wiring a fresh
/// `EventReceiver` for the next day's session).
pub struct BusClient {
    receiver: Arc<EventReceiver>,
    schema: Arc<dyn Schema>,
    scheduler: Arc<Scheduler>,
    activator: Arc<dyn Activator>,
    close_listeners: Mutex<Vec<CloseListener>>,
}

impl BusClient {
    pub fn new(
        receiver: Arc<EventReceiver>,
        schema: Arc<dyn Schema>,
        scheduler: Arc<Scheduler>,
        activator: Arc<dyn Activator>,
    ) -> Self {
        Self {
            receiver,
            schema,
            scheduler,
            activator,
            close_listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }

    pub fn dispatcher(&self) -> &ByteDispatcher {
        self.receiver.dispatcher()
    }

    pub fn session(&self) -> Option<SessionName> {
        self.receiver.session().name()
    }

    /// Registers a listener fired once the session name is known, or
    /// immediately if it already is.
    pub fn add_open_session_listener<F>(&self, listener: F)
    where
        F: Fn(&SessionName) + Send + Sync + 'static,
    {
        self.receiver.session().add_open_listener(listener);
    }

    pub fn add_close_session_listener<F>(&self, listener: F)
    where
        F: Fn(&SessionName) + Send + Sync + 'static,
    {
        self.close_listeners.lock().expect("listener mutex poisoned").push(Box::new(listener));
    }

    /// Fires every registered close-session listener with the session that
    /// just ended.
    pub fn notify_session_closed(&self, closed: &SessionName) {
        for listener in self.close_listeners.lock().expect("listener mutex poisoned").iter() {
            listener(closed);
        }
    }

    /// Mints a [`Provider`] for `app_name` that publishes commands into this
    /// bus and confirms them via echoes observed on this client's event
    /// dispatcher.
    pub fn provider(
        self: &Arc<Self>,
        app_name: Vec<u8>,
        socket: UdpSocket,
        application_definition: &[u8],
    ) -> Provider {
        let publisher = CommandPublisher::new(
            app_name,
            self.receiver.session().clone(),
            Arc::clone(&self.schema),
            socket,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.activator),
            application_definition,
        );
        publisher.attach(self.dispatcher());
        Provider { publisher }
    }
}

/// A named application's command-publishing handle, as returned by
/// [`BusClient::provider`]. Thin wrapper kept distinct from
/// [`CommandPublisher`] so callers go through `BusClient` to obtain one.
/// Cheap to clone: callers typically hold one clone for `commit` and spawn
/// another's [`run`](Self::run) as a background task.
#[derive(Clone)]
pub struct Provider {
    publisher: Arc<CommandPublisher>,
}

impl Provider {
    pub fn application_id(&self) -> u16 {
        self.publisher.application_id()
    }

    pub fn is_ready(&self) -> bool {
        self.publisher.is_ready()
    }

    pub fn is_current(&self) -> bool {
        self.publisher.is_current()
    }

    /// Commits a pre-encoded command body; see [`CommandPublisher::commit`].
    pub fn commit(&self, body: &[u8]) -> Result<u32, molbus_commands::CommandError> {
        self.publisher.commit(body)
    }

    /// Drives retransmission until the task is dropped; see
    /// [`CommandPublisher::run`].
    pub async fn run(&self) {
        self.publisher.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molbus_core::LoggingActivator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::UdpSocket;

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
            &body[14..22]
        }
        fn application_definition_applicant_name<'a>(&self, body: &'a [u8]) -> &'a [u8] {
            &body[22..]
        }
    }

    async fn make_client() -> Arc<BusClient> {
        let event_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let discovery_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rewind_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let discovery_dest = discovery_socket.local_addr().unwrap();
        let receiver = EventReceiver::new(
            molbus_protocol::Session::new(),
            event_socket,
            discovery_socket,
            discovery_dest,
            rewind_socket,
            Scheduler::new(),
            Arc::new(LoggingActivator),
        );
        Arc::new(BusClient::new(
            receiver,
            Arc::new(DemoSchema),
            Scheduler::new(),
            Arc::new(LoggingActivator),
        ))
    }

    #[tokio::test]
    async fn session_starts_unset_and_open_listener_fires_once_adopted() {
        let client = make_client().await;
        assert!(client.session().is_none());

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        client.add_open_session_listener(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        client.receiver.session().set_name(*b"20240101AA").unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(client.session(), Some(*b"20240101AA"));
    }

    #[tokio::test]
    async fn close_session_listener_fires_on_explicit_notification() {
        let client = make_client().await;
        let closed = Arc::new(Mutex::new(None));
        let closed2 = Arc::clone(&closed);
        client.add_close_session_listener(move |name| {
            *closed2.lock().unwrap() = Some(*name);
        });
        client.notify_session_closed(b"20240101AA");
        assert_eq!(*closed.lock().unwrap(), Some(*b"20240101AA"));
    }

    #[tokio::test]
    async fn provider_starts_unready_until_identity_is_learned() {
        let client = make_client().await;
        client.receiver.session().set_name(*b"20240101AA").unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server.local_addr().unwrap()).await.unwrap();
        let mut bootstrap = vec![0u8; 22 + 3];
        bootstrap[14..22].copy_from_slice(b"APPDEF\0\0");
        bootstrap[22..].copy_from_slice(b"app");
        let provider = client.provider(b"app".to_vec(), socket, &bootstrap);
        assert!(!provider.is_ready());
        assert_eq!(provider.application_id(), 0);
    }
}
