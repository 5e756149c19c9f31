// Provider client for the resident local inference backend

use super::http::HttpCore;
use super::{
    stream_route, ChunkBody, ChunkRequest, ChunkTranscript, InferenceProvider, InferenceRequest,
    PreparedTranscriptBody, ProviderError, StreamInferenceMeta, StreamRunBody, TokenCallback,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Client for the local backend's HTTP surface.
///
/// Stateless between calls; shared behind an Arc by the executor and the
/// pretranscription chunk path.
pub struct LocalProvider {
    core: HttpCore,
}

impl LocalProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            core: HttpCore::new(base_url, None),
        }
    }
}

#[async_trait]
impl InferenceProvider for LocalProvider {
    async fn run(
        &self,
        request: &InferenceRequest,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, ProviderError> {
        let body = StreamRunBody::from_request(request)?;
        crate::debug!(
            "[provider] local run mode={} profile={}",
            request.mode,
            body.inference_audio_profile
        );
        self.core
            .post_stream(stream_route(request.mode), &body, on_token)
            .await
    }

    async fn run_prepared_transcript(
        &self,
        request: &InferenceRequest,
        raw_text: &str,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, ProviderError> {
        let body = PreparedTranscriptBody::from_request(request, raw_text, BTreeMap::new());
        crate::debug!(
            "[provider] local prepared-transcript run mode={} ({} chars)",
            request.mode,
            raw_text.len()
        );
        self.core.post_stream("/llm/stream", &body, on_token).await
    }

    async fn transcribe_chunk(
        &self,
        request: &ChunkRequest,
    ) -> Result<ChunkTranscript, ProviderError> {
        let body = ChunkBody::from_request(request);
        self.core.post_json("/asr/transcribe", &body).await
    }

    fn terminate_if_running(&self) {
        self.core.terminate_all();
    }
}
