// Provider client for the cloud inference service
//
// Speaks the same streaming contract as the local backend against a
// configured base URL, authenticated with a bearer token. Constructing a
// request without a key is normally prevented upstream by the
// credentials short-circuit; the client re-checks as a last line.

use super::http::HttpCore;
use super::{
    stream_route, ChunkBody, ChunkRequest, ChunkTranscript, InferenceProvider, InferenceRequest,
    PreparedTranscriptBody, ProviderError, StreamInferenceMeta, StreamRunBody, TokenCallback,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct CloudProvider {
    core: HttpCore,
    has_key: bool,
}

impl CloudProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let has_key = api_key.as_deref().is_some_and(|k| !k.is_empty());
        Self {
            core: HttpCore::new(base_url, api_key),
            has_key,
        }
    }

    fn require_key(&self) -> Result<(), ProviderError> {
        if self.has_key {
            Ok(())
        } else {
            Err(ProviderError::CredentialsMissing)
        }
    }
}

#[async_trait]
impl InferenceProvider for CloudProvider {
    async fn run(
        &self,
        request: &InferenceRequest,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, ProviderError> {
        self.require_key()?;
        let body = StreamRunBody::from_request(request)?;
        crate::debug!("[provider] cloud run mode={}", request.mode);
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
        self.require_key()?;
        let body = PreparedTranscriptBody::from_request(request, raw_text, BTreeMap::new());
        self.core.post_stream("/llm/stream", &body, on_token).await
    }

    async fn transcribe_chunk(
        &self,
        request: &ChunkRequest,
    ) -> Result<ChunkTranscript, ProviderError> {
        self.require_key()?;
        let body = ChunkBody::from_request(request);
        self.core.post_json("/asr/transcribe", &body).await
    }

    fn terminate_if_running(&self) {
        self.core.terminate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioProfile;
    use crate::settings::EngineSettings;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_keyless_client_short_circuits_before_any_network_call() {
        // Unroutable base URL: if the client tried the network this test
        // would hang instead of failing fast.
        let provider = CloudProvider::new("http://10.255.255.1:9".to_string(), None);
        let request = ChunkRequest {
            wav_path: PathBuf::from("/tmp/chunk.wav"),
            audio_profile: AudioProfile::Fast,
            config: EngineSettings::default(),
        };
        let result = provider.transcribe_chunk(&request).await;
        assert!(matches!(result, Err(ProviderError::CredentialsMissing)));
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let provider = CloudProvider::new("https://api.test".to_string(), Some(String::new()));
        assert!(provider.require_key().is_err());

        let provider =
            CloudProvider::new("https://api.test".to_string(), Some("sk-abc".to_string()));
        assert!(provider.require_key().is_ok());
    }
}
