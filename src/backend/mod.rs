// Local inference backend lifecycle manager
//
// The backend subprocess is a process-wide singleton. Every start/stop/
// health/config-push operation goes through one control task fed by a
// command channel, so health polling, teardown and restart-after-cancel
// can never interleave destructively.

mod process;

pub use process::ManagedChild;

use crate::settings::BackendSettings;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from backend lifecycle operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to spawn backend: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("backend not healthy after {waited_ms}ms ({attempts} attempts)")]
    HealthCheckFailed { waited_ms: u64, attempts: u32 },

    #[error("backend control task is gone")]
    ControlChannelClosed,
}

/// Configuration for spawning and supervising the backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub program: String,
    pub args: Vec<String>,
    pub base_url: String,
    /// Health budget when a warm backend is expected
    pub warm_budget: Duration,
    /// Health budget when a model may need to download first
    pub cold_budget: Duration,
    pub poll_interval: Duration,
    pub idle_timeout_seconds: u64,
}

impl BackendConfig {
    pub fn from_settings(settings: &BackendSettings) -> Self {
        let mut args = settings.args.clone();
        args.extend([
            "--host".to_string(),
            settings.host.clone(),
            "--port".to_string(),
            settings.port.to_string(),
        ]);
        Self {
            program: settings.program.clone(),
            args,
            base_url: settings.base_url(),
            warm_budget: Duration::from_millis(settings.health_budget_warm_ms),
            cold_budget: Duration::from_millis(settings.health_budget_cold_ms),
            poll_interval: Duration::from_millis(settings.health_poll_interval_ms),
            idle_timeout_seconds: settings.idle_timeout_seconds,
        }
    }
}

/// Health payload of the backend's /health route
#[derive(Debug, Clone, Deserialize)]
pub struct BackendHealth {
    pub status: String,
    #[serde(default)]
    pub asr_model: String,
    #[serde(default)]
    pub llm_model: String,
    #[serde(default)]
    pub llm_loaded: bool,
    #[serde(default)]
    pub idle_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub last_active_age_seconds: Option<f64>,
}

enum BackendCommand {
    StartIfNeeded {
        asr_model: String,
        llm_model: String,
        reply: oneshot::Sender<Result<(), BackendError>>,
    },
    StopIfNeeded {
        reply: oneshot::Sender<()>,
    },
    Health {
        reply: oneshot::Sender<Result<BackendHealth, BackendError>>,
    },
}

/// Cloneable handle to the backend control task
#[derive(Clone)]
pub struct BackendHandle {
    tx: mpsc::Sender<BackendCommand>,
}

impl BackendHandle {
    /// Spawn the control task and return its handle.
    pub fn spawn(config: BackendConfig) -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(ControlTask::new(config).run(rx));
        Self { tx }
    }

    /// Ensure the backend is running and healthy with the given models.
    /// Serialized with every other backend operation.
    pub async fn start_if_needed(
        &self,
        asr_model: &str,
        llm_model: &str,
    ) -> Result<(), BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BackendCommand::StartIfNeeded {
                asr_model: asr_model.to_string(),
                llm_model: llm_model.to_string(),
                reply,
            })
            .await
            .map_err(|_| BackendError::ControlChannelClosed)?;
        rx.await.map_err(|_| BackendError::ControlChannelClosed)?
    }

    /// Stop the backend if it is running. Idempotent.
    pub async fn stop_if_needed(&self) -> Result<(), BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BackendCommand::StopIfNeeded { reply })
            .await
            .map_err(|_| BackendError::ControlChannelClosed)?;
        rx.await.map_err(|_| BackendError::ControlChannelClosed)
    }

    /// One health probe against the running backend.
    pub async fn health(&self) -> Result<BackendHealth, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BackendCommand::Health { reply })
            .await
            .map_err(|_| BackendError::ControlChannelClosed)?;
        rx.await.map_err(|_| BackendError::ControlChannelClosed)?
    }
}

struct ControlTask {
    config: BackendConfig,
    http: reqwest::Client,
    child: Option<ManagedChild>,
}

impl ControlTask {
    fn new(config: BackendConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            child: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<BackendCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                BackendCommand::StartIfNeeded {
                    asr_model,
                    llm_model,
                    reply,
                } => {
                    let result = self.handle_start(&asr_model, &llm_model).await;
                    let _ = reply.send(result);
                }
                BackendCommand::StopIfNeeded { reply } => {
                    self.stop_child().await;
                    let _ = reply.send(());
                }
                BackendCommand::Health { reply } => {
                    let _ = reply.send(self.probe_health().await);
                }
            }
        }
        // Channel closed: the engine is shutting down
        self.stop_child().await;
    }

    async fn handle_start(&mut self, asr_model: &str, llm_model: &str) -> Result<(), BackendError> {
        // A live child that answers health within the warm budget is reused
        let child_running = match self.child.as_mut() {
            Some(child) => child.is_running(),
            None => false,
        };
        if child_running {
            if self.poll_health(self.config.warm_budget).await.is_ok() {
                crate::debug!("[backend] Already healthy, reusing process");
                return Ok(());
            }
            crate::warn!("[backend] Running process failed health check, restarting");
        }
        self.stop_child().await;

        let mut args = self.config.args.clone();
        args.extend([
            "--asr-model".to_string(),
            asr_model.to_string(),
            "--llm-model".to_string(),
            llm_model.to_string(),
            "--idle-timeout".to_string(),
            self.config.idle_timeout_seconds.to_string(),
        ]);
        self.child = Some(ManagedChild::spawn(&self.config.program, &args)?);

        // Cold budget: first start may have to download model weights
        let health = self.poll_health(self.config.cold_budget).await?;
        crate::info!(
            "[backend] Healthy: asr={} llm={} llm_loaded={}",
            health.asr_model,
            health.llm_model,
            health.llm_loaded
        );

        self.push_memory_timeout().await;
        Ok(())
    }

    async fn stop_child(&mut self) {
        if let Some(child) = self.child.take() {
            crate::info!("[backend] Stopping process (pid {:?})", child.pid());
            child.shutdown().await;
        }
    }

    async fn probe_health(&self) -> Result<BackendHealth, BackendError> {
        let url = format!("{}/health", self.config.base_url);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                crate::trace!("[backend] Health probe failed: {}", e);
                return Err(BackendError::HealthCheckFailed {
                    waited_ms: 0,
                    attempts: 1,
                });
            }
        };
        response
            .json::<BackendHealth>()
            .await
            .map_err(|_| BackendError::HealthCheckFailed {
                waited_ms: 0,
                attempts: 1,
            })
    }

    /// Bounded retry with a short sleep between attempts.
    async fn poll_health(&self, budget: Duration) -> Result<BackendHealth, BackendError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Ok(health) = self.probe_health().await {
                if health.status == "ok" {
                    return Ok(health);
                }
            }
            if started.elapsed() >= budget {
                return Err(BackendError::HealthCheckFailed {
                    waited_ms: started.elapsed().as_millis() as u64,
                    attempts,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn push_memory_timeout(&self) {
        let url = format!("{}/config/memory-timeout", self.config.base_url);
        let body = serde_json::json!({
            "idle_timeout_seconds": self.config.idle_timeout_seconds,
        });
        match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                crate::debug!(
                    "[backend] Pushed idle timeout {}s",
                    self.config.idle_timeout_seconds
                );
            }
            Ok(response) => {
                crate::warn!("[backend] Idle timeout push rejected: {}", response.status());
            }
            Err(e) => crate::warn!("[backend] Idle timeout push failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_settings(port: u16) -> BackendSettings {
        BackendSettings {
            program: "/nonexistent/ghosttype-backend".to_string(),
            args: vec![],
            host: "127.0.0.1".to_string(),
            port,
            idle_timeout_seconds: 60,
            health_budget_warm_ms: 100,
            health_budget_cold_ms: 200,
            health_poll_interval_ms: 20,
        }
    }

    #[test]
    fn test_config_from_settings_builds_host_args() {
        let config = BackendConfig::from_settings(&test_settings(9123));
        assert!(config.args.contains(&"--host".to_string()));
        assert!(config.args.contains(&"9123".to_string()));
        assert_eq!(config.base_url, "http://127.0.0.1:9123");
    }

    #[tokio::test]
    async fn test_start_with_missing_program_reports_spawn_failure() {
        let handle = BackendHandle::spawn(BackendConfig::from_settings(&test_settings(9124)));
        let result = handle.start_if_needed("asr-model", "llm-model").await;
        assert!(matches!(result, Err(BackendError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_stop_if_needed_is_idempotent() {
        let handle = BackendHandle::spawn(BackendConfig::from_settings(&test_settings(9125)));
        handle.stop_if_needed().await.unwrap();
        handle.stop_if_needed().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_unhealthy_child_fails_within_cold_budget() {
        // A child that runs but never serves /health
        let mut settings = test_settings(9126);
        settings.program = "/bin/sh".to_string();
        settings.args = vec!["-c".to_string(), "sleep 30".to_string()];

        let handle = BackendHandle::spawn(BackendConfig::from_settings(&settings));
        let result = handle.start_if_needed("asr", "llm").await;
        assert!(matches!(
            result,
            Err(BackendError::HealthCheckFailed { .. })
        ));

        handle.stop_if_needed().await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_are_serialized_in_submission_order() {
        // Two concurrent stop commands resolve in order without interleaving
        let handle = BackendHandle::spawn(BackendConfig::from_settings(&test_settings(9127)));
        let h1 = handle.clone();
        let h2 = handle.clone();
        let (r1, r2) = tokio::join!(h1.stop_if_needed(), h2.stop_if_needed());
        assert!(r1.is_ok());
        assert!(r2.is_ok());
    }

    #[test]
    fn test_health_payload_deserializes() {
        let health: BackendHealth = serde_json::from_str(
            r#"{"status":"ok","asr_model":"whisper","llm_model":"qwen","llm_loaded":true,
                "idle_timeout_seconds":300,"last_active_age_seconds":1.5}"#,
        )
        .unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.llm_loaded);
        assert_eq!(health.idle_timeout_seconds, Some(300));
    }
}
