// Shared HTTP core for the local and cloud provider clients
//
// Tracks every in-flight call with an abort handle so a cancellation path
// can terminate all of them idempotently, whether or not anything is
// running.

use super::{sse, ProviderError, StreamInferenceMeta, TokenCallback};
use futures_util::future::{AbortHandle, Abortable, Aborted};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub(crate) struct HttpCore {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
    calls: Mutex<HashMap<u64, AbortHandle>>,
    next_call: AtomicU64,
}

impl HttpCore {
    pub fn new(base_url: String, bearer: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer,
            calls: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(0),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn register_call(&self) -> (u64, futures_util::future::AbortRegistration) {
        let id = self.next_call.fetch_add(1, Ordering::SeqCst);
        let (handle, registration) = AbortHandle::new_pair();
        self.calls.lock().insert(id, handle);
        (id, registration)
    }

    fn finish_call(&self, id: u64) {
        self.calls.lock().remove(&id);
    }

    /// Abort every in-flight call. No-op when nothing is running.
    pub fn terminate_all(&self) {
        let handles: Vec<AbortHandle> = self.calls.lock().drain().map(|(_, h)| h).collect();
        if !handles.is_empty() {
            crate::debug!("[provider] Terminating {} in-flight call(s)", handles.len());
        }
        for handle in handles {
            handle.abort();
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The backend's error payloads carry a human_message field
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("human_message")
                    .or_else(|| v.get("detail"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {}", status));
        Err(ProviderError::Backend(message))
    }

    /// POST a body and drive the SSE response to completion.
    pub async fn post_stream<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        on_token: TokenCallback<'_>,
    ) -> Result<StreamInferenceMeta, ProviderError> {
        let (call_id, registration) = self.register_call();

        let work = async {
            let response = self
                .request(path)
                .json(body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;
            let response = Self::check_status(response).await?;
            sse::drive_stream(response, on_token).await
        };

        let result = match Abortable::new(work, registration).await {
            Ok(result) => result,
            Err(Aborted) => Err(ProviderError::Cancelled),
        };
        self.finish_call(call_id);
        result
    }

    /// POST a body and decode a JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let (call_id, registration) = self.register_call();

        let work = async {
            let response = self
                .request(path)
                .json(body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;
            let response = Self::check_status(response).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Protocol(e.to_string()))
        };

        let result = match Abortable::new(work, registration).await {
            Ok(result) => result,
            Err(Aborted) => Err(ProviderError::Cancelled),
        };
        self.finish_call(call_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_stripped() {
        let core = HttpCore::new("http://127.0.0.1:8765/".to_string(), None);
        assert_eq!(core.base_url(), "http://127.0.0.1:8765");
    }

    #[test]
    fn test_terminate_all_without_calls_is_a_no_op() {
        let core = HttpCore::new("http://127.0.0.1:8765".to_string(), None);
        core.terminate_all();
        core.terminate_all();
    }

    #[tokio::test]
    async fn test_terminate_aborts_in_flight_call() {
        // Point at a non-routable address so the connect hangs long enough
        // for the abort to land first.
        let core = std::sync::Arc::new(HttpCore::new("http://10.255.255.1:9".to_string(), None));

        let task_core = core.clone();
        let task = tokio::spawn(async move {
            let sink = |_t: &str| {};
            task_core
                .post_stream("/dictate/stream", &serde_json::json!({}), &sink)
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        core.terminate_all();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
