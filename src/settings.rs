// Engine settings and per-inference configuration snapshots
//
// Settings are read from settings.json under the platform config dir. A
// clone of the full settings value is embedded in every InferenceRequest;
// the route plan and request fields are derived from that snapshot, so
// edits made while an inference is running never affect it.

use crate::audio::EnhancementMode;
use crate::error::TimeoutKind;
use crate::pretranscribe::PretranscriptionConfig;
use crate::routing::EngineKind;
use crate::text::NormalizationRule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cloud provider access configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudSettings {
    pub base_url: String,
    /// The core only checks presence; the secret itself is opaque to it
    pub api_key: Option<String>,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.ghosttype.app".to_string(),
            api_key: None,
        }
    }
}

/// Local backend subprocess configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub program: String,
    pub args: Vec<String>,
    pub host: String,
    pub port: u16,
    /// Pushed to the backend after startup; models unload after this idle time
    pub idle_timeout_seconds: u64,
    /// Health budget when a warm backend is expected
    pub health_budget_warm_ms: u64,
    /// Health budget when a model may need to download first
    pub health_budget_cold_ms: u64,
    pub health_poll_interval_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["service.py".to_string()],
            host: "127.0.0.1".to_string(),
            port: 8765,
            idle_timeout_seconds: 300,
            health_budget_warm_ms: 5_000,
            health_budget_cold_ms: 180_000,
            health_poll_interval_ms: 500,
        }
    }
}

impl BackendSettings {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Watchdog timeout budgets.
///
/// Time-to-first-token is longer on local routes because it may include
/// model load; the stall budget is uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchdogBudgets {
    pub first_token_local_ms: u64,
    pub first_token_cloud_ms: u64,
    pub stall_ms: u64,
}

impl Default for WatchdogBudgets {
    fn default() -> Self {
        Self {
            first_token_local_ms: 60_000,
            first_token_cloud_ms: 20_000,
            stall_ms: 10_000,
        }
    }
}

impl WatchdogBudgets {
    pub fn budget_for(&self, kind: TimeoutKind, route_is_local: bool) -> Duration {
        let ms = match kind {
            TimeoutKind::FirstToken if route_is_local => self.first_token_local_ms,
            TimeoutKind::FirstToken => self.first_token_cloud_ms,
            TimeoutKind::Stall => self.stall_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Dual-pass quality refinement configuration (dictation only)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefinementConfig {
    pub enabled: bool,
    /// Replace already-delivered text in place when the quality pass differs
    pub auto_replace: bool,
    pub normalization: NormalizationRule,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_replace: true,
            normalization: NormalizationRule::default(),
        }
    }
}

/// Full engine configuration. Cloned into each InferenceRequest as the
/// locked snapshot for that attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub asr_engine: EngineKind,
    pub llm_engine: EngineKind,
    pub asr_model: String,
    pub llm_model: String,
    /// When false, dictation skips the LLM pass entirely (ASR-only bypass)
    pub llm_rewrite_enabled: bool,
    pub ui_language: String,
    pub output_language: String,
    pub target_language: String,
    pub max_tokens: u32,
    pub web_search_enabled: bool,
    pub max_search_results: u32,
    pub audio_enhancement_enabled: bool,
    pub enhancement_mode: EnhancementMode,
    pub cloud: CloudSettings,
    pub backend: BackendSettings,
    pub pretranscription: PretranscriptionConfig,
    pub watchdog: WatchdogBudgets,
    pub refinement: RefinementConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            asr_engine: EngineKind::Local,
            llm_engine: EngineKind::Local,
            asr_model: "mlx-community/whisper-small-mlx".to_string(),
            llm_model: "mlx-community/Qwen2.5-1.5B-Instruct-4bit".to_string(),
            llm_rewrite_enabled: true,
            ui_language: "English".to_string(),
            output_language: "Auto".to_string(),
            target_language: "Chinese".to_string(),
            max_tokens: 350,
            web_search_enabled: true,
            max_search_results: 3,
            audio_enhancement_enabled: true,
            enhancement_mode: EnhancementMode::Webrtc,
            cloud: CloudSettings::default(),
            backend: BackendSettings::default(),
            pretranscription: PretranscriptionConfig::default(),
            watchdog: WatchdogBudgets::default(),
            refinement: RefinementConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings, falling back to defaults on a missing or invalid file.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    crate::warn!(
                        "[settings] Invalid settings file {}, using defaults: {}",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                crate::debug!(
                    "[settings] No settings file at {}, using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Persist settings as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Backend clamps max_tokens to [1, 350]; match it locally.
    pub fn clamped_max_tokens(&self) -> u32 {
        self.max_tokens.clamp(1, 350)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_local_engines() {
        let settings = EngineSettings::default();
        assert_eq!(settings.asr_engine, EngineKind::Local);
        assert_eq!(settings.llm_engine, EngineKind::Local);
        assert!(settings.llm_rewrite_enabled);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings::load_or_default(&dir.path().join("none.json"));
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = EngineSettings::default();
        settings.asr_engine = EngineKind::Cloud;
        settings.cloud.api_key = Some("sk-test".to_string());
        settings.save(&path).unwrap();

        let loaded = EngineSettings::load_or_default(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_settings_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"llmRewriteEnabled": false}"#).unwrap();

        let loaded = EngineSettings::load_or_default(&path);
        assert!(!loaded.llm_rewrite_enabled);
        assert_eq!(loaded.max_tokens, 350);
    }

    #[test]
    fn test_invalid_settings_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let loaded = EngineSettings::load_or_default(&path);
        assert_eq!(loaded, EngineSettings::default());
    }

    #[test]
    fn test_max_tokens_clamp() {
        let mut settings = EngineSettings::default();
        settings.max_tokens = 9999;
        assert_eq!(settings.clamped_max_tokens(), 350);
        settings.max_tokens = 0;
        assert_eq!(settings.clamped_max_tokens(), 1);
    }

    #[test]
    fn test_watchdog_budget_selection() {
        let budgets = WatchdogBudgets::default();
        assert!(
            budgets.budget_for(TimeoutKind::FirstToken, true)
                > budgets.budget_for(TimeoutKind::FirstToken, false)
        );
        assert_eq!(
            budgets.budget_for(TimeoutKind::Stall, true),
            budgets.budget_for(TimeoutKind::Stall, false)
        );
    }

    #[test]
    fn test_backend_base_url() {
        assert_eq!(
            BackendSettings::default().base_url(),
            "http://127.0.0.1:8765"
        );
    }
}
