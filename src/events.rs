// Engine events for host notification
// Defines event payloads and emission traits for testability

use crate::pretranscribe::RuntimeSnapshot;
use crate::session::{InferenceId, SessionId, WorkflowMode};
use serde::Serialize;

/// Event names as constants for consistency
pub mod event_names {
    pub const RECORDING_STARTED: &str = "recording_started";
    pub const RECORDING_STOPPED: &str = "recording_stopped";
    pub const RECORDING_CANCELLED: &str = "recording_cancelled";
    pub const RECORDING_ERROR: &str = "recording_error";
    pub const INFERENCE_STARTED: &str = "inference_started";
    pub const INFERENCE_STREAM_DELTA: &str = "inference_stream_delta";
    pub const INFERENCE_COMPLETED: &str = "inference_completed";
    pub const INFERENCE_FAILED: &str = "inference_failed";
    pub const CONFIGURATION_PROMPT: &str = "configuration_prompt";
    pub const PRETRANSCRIPTION_SNAPSHOT: &str = "pretranscription_snapshot";
    pub const REFINEMENT_REPLACED: &str = "refinement_replaced";
}

/// Current time as an ISO 8601 string for event payloads
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Payload for recording_started event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStartedPayload {
    pub session_id: SessionId,
    pub mode: WorkflowMode,
    pub timestamp: String,
}

/// Payload for recording_stopped event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStoppedPayload {
    pub session_id: SessionId,
    pub duration_secs: f64,
    pub timestamp: String,
}

/// Payload for recording_cancelled event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingCancelledPayload {
    /// User-facing reason for the cancellation
    pub reason: String,
    pub timestamp: String,
}

/// Payload for recording_error event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingErrorPayload {
    pub message: String,
}

/// Payload for inference_started event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceStartedPayload {
    pub session_id: SessionId,
    pub inference_id: InferenceId,
    pub mode: WorkflowMode,
    /// ASR and LLM run on different engines for this inference
    pub hybrid: bool,
    pub timestamp: String,
}

/// Payload for inference_stream_delta event.
/// Carries the full merged text so the host never has to re-apply merges.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamDeltaPayload {
    pub inference_id: InferenceId,
    pub text: String,
}

/// Payload for inference_completed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceCompletedPayload {
    pub session_id: SessionId,
    pub mode: WorkflowMode,
    pub raw_text: String,
    pub output_text: String,
    pub used_web_search: bool,
    pub duration_ms: u64,
}

/// Payload for inference_failed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceFailedPayload {
    /// Short user-facing status string
    pub message: String,
}

/// Payload for configuration_prompt event (cloud route without credentials)
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPromptPayload {
    /// Engine stage missing configuration ("asr" or "llm")
    pub stage: String,
    pub message: String,
}

/// Payload for refinement_replaced event (quality pass replaced delivered text)
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefinementReplacedPayload {
    pub session_id: SessionId,
    pub output_text: String,
}

/// Trait for emitting recording lifecycle events
/// Allows mocking in tests while using a real host bridge in production
pub trait RecordingEventEmitter: Send + Sync {
    fn emit_recording_started(&self, payload: RecordingStartedPayload);
    fn emit_recording_stopped(&self, payload: RecordingStoppedPayload);
    fn emit_recording_cancelled(&self, payload: RecordingCancelledPayload);
    fn emit_recording_error(&self, payload: RecordingErrorPayload);
}

/// Trait for emitting inference lifecycle events
pub trait InferenceEventEmitter: Send + Sync {
    fn emit_inference_started(&self, payload: InferenceStartedPayload);
    fn emit_stream_delta(&self, payload: StreamDeltaPayload);
    fn emit_inference_completed(&self, payload: InferenceCompletedPayload);
    fn emit_inference_failed(&self, payload: InferenceFailedPayload);
    fn emit_configuration_prompt(&self, payload: ConfigurationPromptPayload);
    fn emit_refinement_replaced(&self, payload: RefinementReplacedPayload);
}

/// Trait for surfacing pretranscription runtime snapshots
pub trait PretranscriptionEventEmitter: Send + Sync {
    fn emit_pretranscription_snapshot(&self, session_id: SessionId, snapshot: RuntimeSnapshot);
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every emitted event for assertions in controller and
    /// executor tests.
    #[derive(Default)]
    pub struct MockEngineEmitter {
        pub started: Mutex<Vec<RecordingStartedPayload>>,
        pub stopped: Mutex<Vec<RecordingStoppedPayload>>,
        pub cancelled: Mutex<Vec<RecordingCancelledPayload>>,
        pub recording_errors: Mutex<Vec<RecordingErrorPayload>>,
        pub inference_started: Mutex<Vec<InferenceStartedPayload>>,
        pub deltas: Mutex<Vec<StreamDeltaPayload>>,
        pub completed: Mutex<Vec<InferenceCompletedPayload>>,
        pub failed: Mutex<Vec<InferenceFailedPayload>>,
        pub prompts: Mutex<Vec<ConfigurationPromptPayload>>,
        pub replacements: Mutex<Vec<RefinementReplacedPayload>>,
        pub snapshots: Mutex<Vec<(SessionId, RuntimeSnapshot)>>,
    }

    impl MockEngineEmitter {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl RecordingEventEmitter for MockEngineEmitter {
        fn emit_recording_started(&self, payload: RecordingStartedPayload) {
            self.started.lock().push(payload);
        }
        fn emit_recording_stopped(&self, payload: RecordingStoppedPayload) {
            self.stopped.lock().push(payload);
        }
        fn emit_recording_cancelled(&self, payload: RecordingCancelledPayload) {
            self.cancelled.lock().push(payload);
        }
        fn emit_recording_error(&self, payload: RecordingErrorPayload) {
            self.recording_errors.lock().push(payload);
        }
    }

    impl InferenceEventEmitter for MockEngineEmitter {
        fn emit_inference_started(&self, payload: InferenceStartedPayload) {
            self.inference_started.lock().push(payload);
        }
        fn emit_stream_delta(&self, payload: StreamDeltaPayload) {
            self.deltas.lock().push(payload);
        }
        fn emit_inference_completed(&self, payload: InferenceCompletedPayload) {
            self.completed.lock().push(payload);
        }
        fn emit_inference_failed(&self, payload: InferenceFailedPayload) {
            self.failed.lock().push(payload);
        }
        fn emit_configuration_prompt(&self, payload: ConfigurationPromptPayload) {
            self.prompts.lock().push(payload);
        }
        fn emit_refinement_replaced(&self, payload: RefinementReplacedPayload) {
            self.replacements.lock().push(payload);
        }
    }

    impl PretranscriptionEventEmitter for MockEngineEmitter {
        fn emit_pretranscription_snapshot(
            &self,
            session_id: SessionId,
            snapshot: RuntimeSnapshot,
        ) {
            self.snapshots.lock().push((session_id, snapshot));
        }
    }

    #[test]
    fn test_timestamp_is_iso8601() {
        let ts = current_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_payloads_serialize_camel_case() {
        let payload = InferenceStartedPayload {
            session_id: SessionId::new(),
            inference_id: InferenceId::new(),
            mode: WorkflowMode::Dictate,
            hybrid: false,
            timestamp: current_timestamp(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("sessionId"));
        assert!(json.contains("inferenceId"));
        assert!(json.contains("\"dictate\""));
    }

    #[test]
    fn test_mock_emitter_records_calls() {
        let emitter = MockEngineEmitter::new();
        emitter.emit_inference_failed(InferenceFailedPayload {
            message: "test".to_string(),
        });
        assert_eq!(emitter.failed.lock().len(), 1);
    }
}
