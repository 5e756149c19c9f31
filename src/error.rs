// Orchestration-level error taxonomy
//
// Every failure a session can surface flows through this enum. `Cancelled`
// is benign and never shown to the user; all other variants carry a short
// user-facing message built by `user_message()`.

use thiserror::Error;

/// Which watchdog budget expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// No token arrived within the time-to-first-token budget
    FirstToken,
    /// The stream stalled after the last received token
    Stall,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::FirstToken => write!(f, "waiting for first token"),
            TimeoutKind::Stall => write!(f, "stream stalled"),
        }
    }
}

/// Engine stage a credentials/availability failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    Asr,
    Llm,
}

impl std::fmt::Display for EngineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStage::Asr => write!(f, "speech recognition"),
            EngineStage::Llm => write!(f, "text generation"),
        }
    }
}

/// Errors surfaced by the orchestration core
#[derive(Debug, Error)]
pub enum EngineError {
    /// Microphone/permission failure while starting or stopping capture
    #[error("recording failed: {0}")]
    RecordingFailure(String),

    /// Local inference backend did not become healthy within budget
    #[error("inference backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Network/HTTP/stream-parse failure in a provider transport
    #[error("provider transport failure: {0}")]
    ProviderTransport(String),

    /// Cloud route selected but the required secret is absent.
    /// Detected before any network call is made.
    #[error("credentials missing for {stage} engine")]
    CredentialsMissing { stage: EngineStage },

    /// No eligible provider for the locked route plan
    #[error("routing failure: {0}")]
    RoutingFailure(String),

    /// Speech-to-text stage failed
    #[error("transcription failed: {0}")]
    AsrFailure(String),

    /// Text-generation stage failed
    #[error("rewriting failed: {0}")]
    LlmFailure(String),

    /// Watchdog fired: no progress within budget
    #[error("inference timed out ({0})")]
    WatchdogTimeout(TimeoutKind),

    /// Benign cancellation (user- or system-initiated). Always resolves to a
    /// silent return to idle, never an error message.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// True for errors that must unwind silently instead of surfacing a
    /// failed state.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// Short status string shown to the user on a failed session.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::RecordingFailure(_) => "Recording failed".to_string(),
            EngineError::BackendUnavailable(_) => "Local engine is not available".to_string(),
            EngineError::ProviderTransport(_) => "Connection to the engine failed".to_string(),
            EngineError::CredentialsMissing { stage } => {
                format!("Add an API key to use the cloud {} engine", stage)
            }
            EngineError::RoutingFailure(_) => "No engine available for this request".to_string(),
            EngineError::AsrFailure(_) => "Could not transcribe the recording".to_string(),
            EngineError::LlmFailure(_) => "Could not rewrite the transcript".to_string(),
            EngineError::WatchdogTimeout(kind) => format!("Inference timed out ({})", kind),
            EngineError::Cancelled => String::new(),
        }
    }
}
