// Streaming inference executor
//
// Drives the locked route plan to completion: single-provider streaming on
// uniform routes, an explicit ASR step followed by a prepared-transcript
// stream on hybrid routes, and an ASR-only path for dictation with
// rewriting disabled. Credentials for cloud stages are checked before any
// network call.

use crate::error::{EngineError, EngineStage};
use crate::provider::{
    ChunkRequest, InferenceProvider, InferenceRequest, StreamInferenceMeta, TokenCallback,
};
use crate::routing::{EngineKind, RoutePlan};
use crate::text;
use std::sync::Arc;
use std::time::Instant;

/// Final result of a driven inference
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub meta: StreamInferenceMeta,
    /// Post-processed text ready for delivery
    pub output_text: String,
}

/// Executor over the shared provider clients
pub struct StreamingInferenceExecutor {
    local: Arc<dyn InferenceProvider>,
    cloud: Option<Arc<dyn InferenceProvider>>,
}

impl StreamingInferenceExecutor {
    pub fn new(
        local: Arc<dyn InferenceProvider>,
        cloud: Option<Arc<dyn InferenceProvider>>,
    ) -> Self {
        Self { local, cloud }
    }

    /// Provider for one side of the locked plan.
    pub fn provider_for(&self, kind: EngineKind) -> Result<Arc<dyn InferenceProvider>, EngineError> {
        match kind {
            EngineKind::Local => Ok(self.local.clone()),
            EngineKind::Cloud => self.cloud.clone().ok_or_else(|| {
                EngineError::RoutingFailure("no cloud provider configured".to_string())
            }),
        }
    }

    /// Terminate any in-flight provider calls. Idempotent.
    pub fn terminate_all(&self) {
        self.local.terminate_if_running();
        if let Some(cloud) = &self.cloud {
            cloud.terminate_if_running();
        }
    }

    /// Cloud stages require a key; detected before any network call.
    fn check_credentials(plan: &RoutePlan, request: &InferenceRequest) -> Result<(), EngineError> {
        let has_key = request
            .config
            .cloud
            .api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty());
        if !plan.asr_is_local() && !has_key {
            return Err(EngineError::CredentialsMissing {
                stage: EngineStage::Asr,
            });
        }
        if !plan.llm_is_local() && !has_key {
            return Err(EngineError::CredentialsMissing {
                stage: EngineStage::Llm,
            });
        }
        Ok(())
    }

    /// Run the full pipeline for the locked plan, streaming tokens to the
    /// callback, and return the post-processed outcome.
    pub async fn execute(
        &self,
        plan: &RoutePlan,
        request: &InferenceRequest,
        pretranscript: Option<&str>,
        on_token: TokenCallback<'_>,
    ) -> Result<InferenceOutcome, EngineError> {
        Self::check_credentials(plan, request)?;

        let meta = if plan.is_hybrid() {
            self.execute_hybrid(plan, request, pretranscript, on_token)
                .await?
        } else {
            let provider = self.provider_for(plan.llm_provider)?;
            let result = match pretranscript {
                Some(transcript) => {
                    crate::debug!("[executor] Continuing from prepared transcript");
                    provider
                        .run_prepared_transcript(request, transcript, on_token)
                        .await
                }
                None => provider.run(request, on_token).await,
            };
            result.map_err(|e| map_provider_error(e, EngineStage::Llm))?
        };

        Ok(Self::finish(request, meta))
    }

    /// Hybrid plan: ASR to completion first (skipped when pretranscription
    /// already supplied a transcript), then the LLM side continues from the
    /// transcript.
    async fn execute_hybrid(
        &self,
        plan: &RoutePlan,
        request: &InferenceRequest,
        pretranscript: Option<&str>,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, EngineError> {
        let mut asr_latency_ms: Option<f64> = None;
        let transcribed;

        let raw_text: &str = match pretranscript {
            Some(transcript) => transcript,
            None => {
                let asr = self.provider_for(plan.asr_provider)?;
                let audio = request.audio.as_ref().ok_or_else(|| {
                    EngineError::AsrFailure("no audio available for transcription".to_string())
                })?;

                let started = Instant::now();
                let chunk = asr
                    .transcribe_chunk(&ChunkRequest {
                        wav_path: audio.wav_path.clone(),
                        audio_profile: request.audio_profile,
                        config: request.config.clone(),
                    })
                    .await
                    .map_err(|e| map_provider_error(e, EngineStage::Asr))?;
                asr_latency_ms = Some(started.elapsed().as_millis() as f64);
                transcribed = chunk.text;
                &transcribed
            }
        };

        let llm = self.provider_for(plan.llm_provider)?;
        let mut meta = llm
            .run_prepared_transcript(request, raw_text, on_token)
            .await
            .map_err(|e| map_provider_error(e, EngineStage::Llm))?;

        if let Some(ms) = asr_latency_ms {
            meta.timing_ms.insert("asr".to_string(), ms);
        }
        if meta.raw_text.is_empty() {
            meta.raw_text = raw_text.to_string();
        }
        Ok(meta)
    }

    /// ASR-only bypass for dictation with LLM rewriting disabled. Shares
    /// the finalize path with the full pipeline.
    pub async fn transcribe_only(
        &self,
        plan: &RoutePlan,
        request: &InferenceRequest,
        pretranscript: Option<&str>,
    ) -> Result<InferenceOutcome, EngineError> {
        let transcript = match pretranscript {
            Some(transcript) => transcript.to_string(),
            None => {
                let has_key = request
                    .config
                    .cloud
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty());
                if !plan.asr_is_local() && !has_key {
                    return Err(EngineError::CredentialsMissing {
                        stage: EngineStage::Asr,
                    });
                }
                let asr = self.provider_for(plan.asr_provider)?;
                let audio = request.audio.as_ref().ok_or_else(|| {
                    EngineError::AsrFailure("no audio available for transcription".to_string())
                })?;
                let started = Instant::now();
                let chunk = asr
                    .transcribe_chunk(&ChunkRequest {
                        wav_path: audio.wav_path.clone(),
                        audio_profile: request.audio_profile,
                        config: request.config.clone(),
                    })
                    .await
                    .map_err(|e| map_provider_error(e, EngineStage::Asr))?;

                let mut meta = StreamInferenceMeta {
                    mode: request.mode.as_str().to_string(),
                    raw_text: chunk.text.clone(),
                    asr_language_detected: chunk.detected_language.clone(),
                    ..StreamInferenceMeta::default()
                };
                meta.timing_ms
                    .insert("asr".to_string(), started.elapsed().as_millis() as f64);
                meta.output_text = chunk.text;
                return Ok(Self::finish(request, meta));
            }
        };

        let meta = StreamInferenceMeta {
            mode: request.mode.as_str().to_string(),
            raw_text: transcript.clone(),
            output_text: transcript,
            ..StreamInferenceMeta::default()
        };
        Ok(Self::finish(request, meta))
    }

    /// Local post-processing shared by every completion path.
    fn finish(request: &InferenceRequest, meta: StreamInferenceMeta) -> InferenceOutcome {
        let source = if meta.output_text.trim().is_empty() {
            &meta.raw_text
        } else {
            &meta.output_text
        };
        let output_text =
            text::finalize_output(request.mode, &text::dedupe_repeated_phrases(source));

        if text::effectively_unchanged(
            &meta.raw_text,
            &output_text,
            request.config.refinement.normalization,
        ) {
            crate::debug!("[executor] Rewrite left the transcript effectively unchanged");
        }

        InferenceOutcome { meta, output_text }
    }
}

fn map_provider_error(error: crate::provider::ProviderError, stage: EngineStage) -> EngineError {
    use crate::provider::ProviderError;
    match error {
        ProviderError::Cancelled => EngineError::Cancelled,
        ProviderError::CredentialsMissing => EngineError::CredentialsMissing { stage },
        ProviderError::Transport(message) | ProviderError::Protocol(message) => {
            EngineError::ProviderTransport(message)
        }
        ProviderError::Backend(message) => match stage {
            EngineStage::Asr => EngineError::AsrFailure(message),
            EngineStage::Llm => EngineError::LlmFailure(message),
        },
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
