// Inference provider contract
//
// Both the local backend and the cloud service implement the same provider
// surface: a full streaming run, a streaming run over an already-produced
// transcript, single-chunk transcription, and an idempotent terminate.

mod cloud;
mod http;
mod local;
pub mod sse;

pub use cloud::CloudProvider;
pub use local::LocalProvider;

use crate::audio::{AudioProfile, AudioReference};
use crate::context::ResolvedPreset;
use crate::session::WorkflowMode;
use crate::settings::EngineSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from a provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network/HTTP failure before or during the stream
    #[error("transport failure: {0}")]
    Transport(String),
    /// The stream violated the wire contract
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The backend reported an error (error event or HTTP error payload)
    #[error("backend error: {0}")]
    Backend(String),
    /// Cloud call attempted without an API key
    #[error("credentials missing")]
    CredentialsMissing,
    /// The call was terminated by a cancellation path
    #[error("cancelled")]
    Cancelled,
}

/// Immutable snapshot of one inference attempt.
///
/// Built once per attempt and never mutated; the embedded settings clone is
/// the locked configuration for the attempt's whole duration.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub mode: WorkflowMode,
    /// Recorded audio; absent for prepared-transcript-only calls
    pub audio: Option<AudioReference>,
    /// Selected context text captured at recording start (ask mode)
    pub selected_text: String,
    /// Dictation preset locked for the session, if one resolved
    pub preset: Option<ResolvedPreset>,
    pub audio_profile: AudioProfile,
    pub config: EngineSettings,
}

impl InferenceRequest {
    fn system_prompt(&self) -> Option<&str> {
        self.preset
            .as_ref()
            .and_then(|p| p.system_prompt.as_deref())
    }
}

/// One web source consulted by an ask run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WebSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Final result bundle of a streaming run. Field names match the wire
/// `meta` object byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StreamInferenceMeta {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub output_text: String,
    #[serde(default)]
    pub used_web_search: bool,
    #[serde(default)]
    pub web_sources: Vec<WebSource>,
    #[serde(default)]
    pub timing_ms: BTreeMap<String, f64>,
    #[serde(default)]
    pub asr_language_detected: Option<String>,
    #[serde(default)]
    pub output_language_policy: Option<String>,
}

/// Request for transcribing one audio chunk (or, on hybrid routes, the
/// whole recording) without an LLM pass
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub wav_path: PathBuf,
    pub audio_profile: AudioProfile,
    pub config: EngineSettings,
}

/// Transcript of one chunk
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChunkTranscript {
    pub text: String,
    #[serde(default)]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub timing_ms: BTreeMap<String, f64>,
}

/// Callback receiving each partial-text token as it streams in
pub type TokenCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Provider surface implemented by the local backend client and the cloud
/// client.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Full run: ASR over the request audio, then the mode's LLM pass,
    /// streaming tokens until a terminal result.
    async fn run(
        &self,
        request: &InferenceRequest,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, ProviderError>;

    /// LLM pass over an already-produced transcript; skips ASR entirely.
    async fn run_prepared_transcript(
        &self,
        request: &InferenceRequest,
        raw_text: &str,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, ProviderError>;

    /// Transcribe a single audio file without any LLM pass.
    async fn transcribe_chunk(
        &self,
        request: &ChunkRequest,
    ) -> Result<ChunkTranscript, ProviderError>;

    /// Abort any in-flight calls. Safe to call from a cancellation path
    /// even when nothing is running.
    fn terminate_if_running(&self);
}

/// Body for the mode streaming routes (/dictate/stream, /ask/stream,
/// /translate/stream). Field names follow the backend request models.
#[derive(Debug, Serialize)]
pub(crate) struct StreamRunBody {
    pub audio_path: String,
    pub inference_audio_profile: &'static str,
    pub asr_model: String,
    pub llm_model: String,
    pub audio_enhancement_enabled: bool,
    pub audio_enhancement_mode: String,
    pub enhancement_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_search_results: Option<u32>,
    pub max_tokens: u32,
}

impl StreamRunBody {
    pub fn from_request(request: &InferenceRequest) -> Result<Self, ProviderError> {
        let audio = request.audio.as_ref().ok_or_else(|| {
            ProviderError::Protocol("streaming run requires an audio reference".to_string())
        })?;
        let config = &request.config;

        let mut body = Self {
            audio_path: audio.wav_path.to_string_lossy().into_owned(),
            inference_audio_profile: request.audio_profile.wire_profile(),
            asr_model: config.asr_model.clone(),
            llm_model: config.llm_model.clone(),
            audio_enhancement_enabled: config.audio_enhancement_enabled,
            audio_enhancement_mode: config.enhancement_mode.as_str().to_string(),
            enhancement_mode: request.audio_profile.wire_enhancement_mode(),
            ui_language: None,
            output_language: None,
            target_language: None,
            selected_text: None,
            system_prompt: request.system_prompt().map(str::to_string),
            web_search_enabled: None,
            max_search_results: None,
            max_tokens: config.clamped_max_tokens(),
        };

        match request.mode {
            WorkflowMode::Dictate => {
                body.ui_language = Some(config.ui_language.clone());
                body.output_language = Some(config.output_language.clone());
            }
            WorkflowMode::Ask => {
                body.ui_language = Some(config.ui_language.clone());
                body.output_language = Some(config.output_language.clone());
                body.selected_text = Some(request.selected_text.clone());
                body.web_search_enabled = Some(config.web_search_enabled);
                body.max_search_results = Some(config.max_search_results);
            }
            WorkflowMode::Translate => {
                body.target_language = Some(config.target_language.clone());
            }
        }

        Ok(body)
    }
}

/// Body for /llm/stream (prepared transcript)
#[derive(Debug, Serialize)]
pub(crate) struct PreparedTranscriptBody {
    pub mode: &'static str,
    pub raw_text: String,
    pub selected_text: String,
    pub target_language: String,
    pub asr_model: String,
    pub llm_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub web_search_enabled: bool,
    pub max_search_results: u32,
    pub max_tokens: u32,
    pub timing_ms: BTreeMap<String, f64>,
}

impl PreparedTranscriptBody {
    pub fn from_request(
        request: &InferenceRequest,
        raw_text: &str,
        timing_ms: BTreeMap<String, f64>,
    ) -> Self {
        let config = &request.config;
        Self {
            mode: request.mode.as_str(),
            raw_text: raw_text.to_string(),
            selected_text: request.selected_text.clone(),
            target_language: config.target_language.clone(),
            asr_model: config.asr_model.clone(),
            llm_model: config.llm_model.clone(),
            system_prompt: request.system_prompt().map(str::to_string),
            web_search_enabled: config.web_search_enabled,
            max_search_results: config.max_search_results,
            max_tokens: config.clamped_max_tokens(),
            timing_ms,
        }
    }
}

/// Body for /asr/transcribe
#[derive(Debug, Serialize)]
pub(crate) struct ChunkBody {
    pub audio_path: String,
    pub inference_audio_profile: &'static str,
    pub asr_model: String,
    pub llm_model: String,
    pub audio_enhancement_enabled: bool,
    pub audio_enhancement_mode: String,
    pub enhancement_mode: &'static str,
}

impl ChunkBody {
    pub fn from_request(request: &ChunkRequest) -> Self {
        let config = &request.config;
        Self {
            audio_path: request.wav_path.to_string_lossy().into_owned(),
            inference_audio_profile: request.audio_profile.wire_profile(),
            asr_model: config.asr_model.clone(),
            llm_model: config.llm_model.clone(),
            audio_enhancement_enabled: config.audio_enhancement_enabled,
            audio_enhancement_mode: config.enhancement_mode.as_str().to_string(),
            enhancement_mode: request.audio_profile.wire_enhancement_mode(),
        }
    }
}

/// Streaming route for a workflow mode
pub(crate) fn stream_route(mode: WorkflowMode) -> &'static str {
    match mode {
        WorkflowMode::Dictate => "/dictate/stream",
        WorkflowMode::Ask => "/ask/stream",
        WorkflowMode::Translate => "/translate/stream",
    }
}
