use super::*;
use std::sync::Arc;

#[test]
fn test_each_guard_returns_true_exactly_once() {
    let tracker = SessionTracker::new();
    let id = SessionId::new();

    assert!(tracker.register_inference_start(id));
    assert!(!tracker.register_inference_start(id));

    assert!(tracker.register_paste(id));
    assert!(!tracker.register_paste(id));

    assert!(tracker.register_history_insert(id));
    assert!(!tracker.register_history_insert(id));
}

#[test]
fn test_guards_are_independent_per_session() {
    let tracker = SessionTracker::new();
    let a = SessionId::new();
    let b = SessionId::new();

    assert!(tracker.register_paste(a));
    // A different session is unaffected by a's entry
    assert!(tracker.register_paste(b));
    assert!(!tracker.register_paste(a));
    assert!(!tracker.register_paste(b));
}

#[test]
fn test_guards_are_independent_per_effect() {
    let tracker = SessionTracker::new();
    let id = SessionId::new();

    assert!(tracker.register_inference_start(id));
    // Claiming one effect does not claim the others
    assert!(tracker.register_paste(id));
    assert!(tracker.register_history_insert(id));
}

#[test]
fn test_reset_clears_all_sets() {
    let tracker = SessionTracker::new();
    let id = SessionId::new();

    assert!(tracker.register_inference_start(id));
    assert!(tracker.register_paste(id));
    assert!(tracker.register_history_insert(id));

    tracker.reset();

    assert!(tracker.register_inference_start(id));
    assert!(tracker.register_paste(id));
    assert!(tracker.register_history_insert(id));
}

#[test]
fn test_concurrent_registration_admits_exactly_one_winner() {
    // Simulates completion/timeout/user-cancel paths racing to paste for the
    // same session: exactly one thread may win the guard.
    let tracker = Arc::new(SessionTracker::new());
    let id = SessionId::new();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let tracker = tracker.clone();
        handles.push(std::thread::spawn(move || tracker.register_paste(id)));
    }

    let wins: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();
    assert_eq!(wins, 1);
}

#[test]
fn test_repeating_a_completion_path_does_not_redo_side_effects() {
    // Replaying any completion path twice with the same session id must not
    // re-paste or re-write history.
    let tracker = SessionTracker::new();
    let id = SessionId::new();

    let mut pastes = 0;
    let mut history_writes = 0;
    for _ in 0..2 {
        if tracker.register_paste(id) {
            pastes += 1;
        }
        if tracker.register_history_insert(id) {
            history_writes += 1;
        }
    }

    assert_eq!(pastes, 1);
    assert_eq!(history_writes, 1);
}
