// Idempotency guards for per-session side effects
//
// Three sets keyed by session id gate the side effects a session may perform
// at most once: starting an inference, pasting the result, and writing the
// history record. Guards use the *session* id (not the inference id) so a
// cancel-then-retry within one session cannot double-insert.

use super::SessionId;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Default)]
struct TrackerSets {
    inference_started: HashSet<SessionId>,
    pasted: HashSet<SessionId>,
    history_inserted: HashSet<SessionId>,
}

/// Tracks which side effects already happened for each session id.
///
/// Each `register_*` method returns `true` exactly once per id and `false`
/// on every subsequent call with that id, independent of how many async
/// paths race to the same effect. Entries are only removed by `reset()`.
pub struct SessionTracker {
    sets: Mutex<TrackerSets>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(TrackerSets::default()),
        }
    }

    /// Claim the one inference start allowed for this session.
    #[must_use = "a false return means another path already started inference"]
    pub fn register_inference_start(&self, id: SessionId) -> bool {
        self.sets.lock().inference_started.insert(id)
    }

    /// Claim the one paste allowed for this session.
    #[must_use = "a false return means the text was already pasted"]
    pub fn register_paste(&self, id: SessionId) -> bool {
        self.sets.lock().pasted.insert(id)
    }

    /// Claim the one history insert allowed for this session.
    #[must_use = "a false return means history was already written"]
    pub fn register_history_insert(&self, id: SessionId) -> bool {
        self.sets.lock().history_inserted.insert(id)
    }

    /// Forget all sessions. Used by `terminate()` and by full failure resets.
    pub fn reset(&self) {
        let mut sets = self.sets.lock();
        sets.inference_started.clear();
        sets.pasted.clear();
        sets.history_inserted.clear();
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
