// Session identity for recording workflows
//
// Opaque ids for recording sessions and inference attempts, plus the
// workflow mode that selects the dictate/ask/translate pipeline.

mod tracker;

pub use tracker::SessionTracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one recording session.
///
/// Every asynchronous completion path captures the id it was issued under
/// and compares it against the currently active id before applying effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for one inference attempt within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferenceId(Uuid);

impl InferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-triggered workflow mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Transcribe and rewrite into clean written text
    Dictate,
    /// Answer a spoken question, optionally over selected context text
    Ask,
    /// Translate the spoken content into a target language
    Translate,
}

impl WorkflowMode {
    /// Wire name used by the backend routes and meta payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::Dictate => "dictate",
            WorkflowMode::Ask => "ask",
            WorkflowMode::Translate => "translate",
        }
    }
}

impl std::fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One active recording workflow.
///
/// Exactly one may exist at a time; it is destroyed on stop/cancel/terminate.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: SessionId,
    /// Current workflow mode; `promote` may change it mid-recording
    pub mode: WorkflowMode,
    pub created_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn new(mode: WorkflowMode) -> Self {
        Self {
            id: SessionId::new(),
            mode,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_ne!(InferenceId::new(), InferenceId::new());
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(WorkflowMode::Dictate.as_str(), "dictate");
        assert_eq!(WorkflowMode::Ask.as_str(), "ask");
        assert_eq!(WorkflowMode::Translate.as_str(), "translate");
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let json = serde_json::to_string(&WorkflowMode::Translate).unwrap();
        assert_eq!(json, "\"translate\"");
    }

    #[test]
    fn test_new_session_carries_mode() {
        let session = RecordingSession::new(WorkflowMode::Ask);
        assert_eq!(session.mode, WorkflowMode::Ask);
    }
}
