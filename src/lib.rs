// GhostType inference orchestration engine.
//
// Owns one voice-driven workflow from "recording started" to "text delivered
// or cancelled": incremental pretranscription, local/remote provider routing,
// streaming token assembly, watchdog-based cancellation and idempotent
// delivery. Audio capture, text insertion and the inference models themselves
// live behind collaborator traits.

// Enable coverage attribute on nightly for explicit exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod audio;
pub mod backend;
pub mod context;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod events;
pub mod executor;
pub mod paths;
pub mod pretranscribe;
pub mod provider;
pub mod routing;
pub mod session;
pub mod settings;
pub mod text;
pub mod watchdog;

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};

pub use controller::RecordingSessionController;
pub use error::EngineError;
pub use session::WorkflowMode;
