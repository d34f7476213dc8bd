use std::sync::Mutex;

/// Fan-out to registered listeners, in registration order, with a
/// `before` tier that always runs first.
///
/// The command publisher registers its own echo-confirmation hook as a
/// before-dispatch listener so it sees an echoed command and cancels the
/// retransmit timer before the application's own listeners run (§9).
#[derive(Default)]
pub struct ByteDispatcher {
    before: Mutex<Vec<Box<dyn Fn(&[u8]) + Send + Sync>>>,
    listeners: Mutex<Vec<Box<dyn Fn(&[u8]) + Send + Sync>>>,
}

impl ByteDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before_dispatch_listener(&self, listener: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.before.lock().unwrap().push(Box::new(listener));
    }

    pub fn add_listener(&self, listener: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// Delivers `message` to the before-dispatch listeners, then the
    /// regular listeners. `message` is a borrowed view scoped to this
    /// call; listeners that need to keep data must copy it.
    pub fn dispatch(&self, message: &[u8]) {
        for listener in self.before.lock().unwrap().iter() {
            listener(message);
        }
        for listener in self.listeners.lock().unwrap().iter() {
            listener(message);
        }
    }
}
