/// Failure-policy hook invoked when a component hits a condition it
/// cannot recover from on its own (a fatal I/O error on the message
/// store, an unrecoverable socket error) — see §4.4 and §9.
///
/// `ready`/`not_ready` report the component's current serviceability;
/// `stop` reports that it has given up and needs to be torn down by its
/// owner. Implementations decide what "not ready" and "stop" mean for
/// the surrounding process (log and keep running degraded, or exit).
pub trait Activator: Send + Sync {
    fn ready(&self, component: &str);
    fn not_ready(&self, component: &str, reason: &str);
    fn stop(&self, component: &str, reason: &str);
}

/// Default [`Activator`] that just logs transitions via `tracing`.
#[derive(Default, Clone, Copy)]
pub struct LoggingActivator;

impl Activator for LoggingActivator {
    fn ready(&self, component: &str) {
        tracing::info!(component, "ready");
    }

    fn not_ready(&self, component: &str, reason: &str) {
        tracing::warn!(component, reason, "not ready");
    }

    fn stop(&self, component: &str, reason: &str) {
        tracing::error!(component, reason, "stopped");
    }
}
