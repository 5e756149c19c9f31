// Re-armable timeout guard for the active inference
//
// At most one timer is armed at a time, tagged with the inference id and a
// generation counter. Re-arming replaces the previous timer; a firing whose
// generation is no longer current is a stale result and does nothing.

use crate::error::TimeoutKind;
use crate::session::InferenceId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Invoked when an armed budget expires without progress.
///
/// Runs on a background task; implementations marshal back to the owner and
/// must apply the id-equality rule before mutating state.
pub type TimeoutHandler = Arc<dyn Fn(InferenceId, TimeoutKind) + Send + Sync>;

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Watchdog for the currently active inference.
///
/// `arm` is called when an inference starts (first-token budget) and again
/// on every received token (stall budget). Either expiry triggers the same
/// cancellation path as a user cancel, with a distinct message.
pub struct InferenceWatchdog {
    armed: Mutex<Option<ArmedTimer>>,
    generation: AtomicU64,
    handler: Mutex<Option<TimeoutHandler>>,
}

impl InferenceWatchdog {
    pub fn new() -> Self {
        Self {
            armed: Mutex::new(None),
            generation: AtomicU64::new(0),
            handler: Mutex::new(None),
        }
    }

    /// Install the timeout handler. Must be called before the first `arm`.
    pub fn set_handler(&self, handler: TimeoutHandler) {
        *self.handler.lock() = Some(handler);
    }

    /// Arm (or re-arm) the watchdog for `inference_id` with the given budget.
    ///
    /// Replaces any previously armed timer. The timer task re-checks its
    /// generation when it wakes, so a replaced timer can never fire.
    pub fn arm(self: &Arc<Self>, inference_id: InferenceId, kind: TimeoutKind, budget: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let watchdog = Arc::clone(self);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            watchdog.fire(inference_id, kind, generation);
        });

        let mut armed = self.armed.lock();
        if let Some(previous) = armed.take() {
            previous.handle.abort();
        }
        *armed = Some(ArmedTimer { generation, handle });
    }

    /// Disarm without firing.
    pub fn clear(&self) {
        // Bump the generation so a timer that already woke cannot fire
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.armed.lock().take() {
            previous.handle.abort();
        }
    }

    fn fire(&self, inference_id: InferenceId, kind: TimeoutKind, generation: u64) {
        {
            let mut armed = self.armed.lock();
            match armed.as_ref() {
                Some(current) if current.generation == generation => {
                    *armed = None;
                }
                // Replaced or cleared since this timer was armed: stale firing
                _ => {
                    crate::trace!("[watchdog] Stale timer firing ignored (gen {})", generation);
                    return;
                }
            }
        }

        crate::warn!(
            "[watchdog] Timeout ({:?}) for inference {}",
            kind,
            inference_id
        );
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(inference_id, kind);
        }
    }
}

impl Default for InferenceWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn recording_handler(fired: Arc<Mutex<Vec<(InferenceId, TimeoutKind)>>>) -> TimeoutHandler {
        Arc::new(move |id, kind| fired.lock().push((id, kind)))
    }

    #[tokio::test]
    async fn test_armed_watchdog_fires_once_after_budget() {
        let watchdog = Arc::new(InferenceWatchdog::new());
        let fired = Arc::new(Mutex::new(Vec::new()));
        watchdog.set_handler(recording_handler(fired.clone()));

        let id = InferenceId::new();
        watchdog.arm(id, TimeoutKind::FirstToken, Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(80)).await;

        let fired = fired.lock();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0], (id, TimeoutKind::FirstToken));
    }

    #[tokio::test]
    async fn test_rearm_replaces_previous_timer() {
        let watchdog = Arc::new(InferenceWatchdog::new());
        let fired = Arc::new(Mutex::new(Vec::new()));
        watchdog.set_handler(recording_handler(fired.clone()));

        let id = InferenceId::new();
        watchdog.arm(id, TimeoutKind::FirstToken, Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Token arrived: switch to the stall budget
        watchdog.arm(id, TimeoutKind::Stall, Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(100)).await;

        let fired = fired.lock();
        assert_eq!(fired.len(), 1, "replaced timer must not fire");
        assert_eq!(fired[0].1, TimeoutKind::Stall);
    }

    #[tokio::test]
    async fn test_clear_prevents_firing() {
        let watchdog = Arc::new(InferenceWatchdog::new());
        let fired = Arc::new(Mutex::new(Vec::new()));
        watchdog.set_handler(recording_handler(fired.clone()));

        watchdog.arm(
            InferenceId::new(),
            TimeoutKind::Stall,
            Duration::from_millis(20),
        );
        watchdog.clear();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_rearm_keeps_watchdog_quiet_while_tokens_flow() {
        let watchdog = Arc::new(InferenceWatchdog::new());
        let fired = Arc::new(Mutex::new(Vec::new()));
        watchdog.set_handler(recording_handler(fired.clone()));

        let id = InferenceId::new();
        for _ in 0..5 {
            watchdog.arm(id, TimeoutKind::Stall, Duration::from_millis(50));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(fired.lock().is_empty(), "no budget expired while re-arming");

        watchdog.clear();
    }

    #[tokio::test]
    async fn test_clear_without_arm_is_a_no_op() {
        let watchdog = Arc::new(InferenceWatchdog::new());
        watchdog.clear();
    }
}
