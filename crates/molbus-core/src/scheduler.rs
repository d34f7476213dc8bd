use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle returned by [`Scheduler::schedule_in`], used to [`Scheduler::cancel`]
/// a pending timer before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Named, cancellable one-shot timers (§5: discovery/rewind timeouts,
/// command retransmit, TCP heartbeat and inactivity watchdogs).
///
/// Each component owns an `Arc<Scheduler>` rather than calling
/// `tokio::time::sleep` inline, so a pending timer can be cancelled when
/// the event it was waiting for arrives first (e.g. an echoed command
/// cancels its retransmit timer).
#[derive(Default)]
pub struct Scheduler {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs `task` after `delay` on the current Tokio runtime. Returns a
    /// [`TaskId`] that can be passed to [`cancel`](Self::cancel).
    pub fn schedule_in<F>(self: &Arc<Self>, delay: Duration, task: F) -> TaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
            this.tasks.lock().unwrap().remove(&id);
        });
        self.tasks.lock().unwrap().insert(id, handle);
        TaskId(id)
    }

    /// Cancels a pending timer. A no-op if it already fired or was already
    /// cancelled.
    pub fn cancel(&self, id: TaskId) {
        if let Some(handle) = self.tasks.lock().unwrap().remove(&id.0) {
            handle.abort();
        }
    }

    /// Number of timers currently pending. Exposed for tests.
    pub fn pending_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        scheduler.schedule_in(Duration::from_millis(100), async move {
            fired2.store(true, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        let id = scheduler.schedule_in(Duration::from_millis(100), async move {
            fired2.store(true, Ordering::SeqCst);
        });
        scheduler.cancel(id);
        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
