// Route planning for one inference attempt
//
// Reads the locked configuration snapshot and decides where ASR and LLM
// run. The plan is computed once per inference and held fixed for its
// duration; a hybrid plan forces the two-step executor path because no
// single provider spans both engines.

use crate::settings::EngineSettings;
use serde::{Deserialize, Serialize};

/// Where an engine stage runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Local,
    Cloud,
}

impl EngineKind {
    pub fn is_local(&self) -> bool {
        matches!(self, EngineKind::Local)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Local => write!(f, "local"),
            EngineKind::Cloud => write!(f, "cloud"),
        }
    }
}

/// Locked provider selection for one inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePlan {
    pub asr_provider: EngineKind,
    pub llm_provider: EngineKind,
}

impl RoutePlan {
    pub fn asr_is_local(&self) -> bool {
        self.asr_provider.is_local()
    }

    pub fn llm_is_local(&self) -> bool {
        self.llm_provider.is_local()
    }

    /// ASR and LLM on different engines: the executor must run them as two
    /// explicit sequential steps.
    pub fn is_hybrid(&self) -> bool {
        self.asr_is_local() != self.llm_is_local()
    }

    /// True when any stage of the plan needs the local backend.
    pub fn needs_local_backend(&self) -> bool {
        self.asr_is_local() || self.llm_is_local()
    }

    /// True when any stage of the plan needs cloud credentials.
    pub fn needs_cloud(&self) -> bool {
        !self.asr_is_local() || !self.llm_is_local()
    }
}

/// Compute the route plan from the configuration snapshot.
pub fn plan(config: &EngineSettings) -> RoutePlan {
    let plan = RoutePlan {
        asr_provider: config.asr_engine,
        llm_provider: config.llm_engine,
    };
    crate::debug!(
        "[routing] Locked route: asr={}, llm={}, hybrid={}",
        plan.asr_provider,
        plan.llm_provider,
        plan.is_hybrid()
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(asr: EngineKind, llm: EngineKind) -> EngineSettings {
        EngineSettings {
            asr_engine: asr,
            llm_engine: llm,
            ..EngineSettings::default()
        }
    }

    #[test]
    fn test_all_local_is_not_hybrid() {
        let plan = plan(&settings(EngineKind::Local, EngineKind::Local));
        assert!(plan.asr_is_local());
        assert!(plan.llm_is_local());
        assert!(!plan.is_hybrid());
        assert!(plan.needs_local_backend());
        assert!(!plan.needs_cloud());
    }

    #[test]
    fn test_all_cloud_is_not_hybrid() {
        let plan = plan(&settings(EngineKind::Cloud, EngineKind::Cloud));
        assert!(!plan.is_hybrid());
        assert!(!plan.needs_local_backend());
        assert!(plan.needs_cloud());
    }

    #[test]
    fn test_split_engines_are_hybrid() {
        let plan_a = plan(&settings(EngineKind::Local, EngineKind::Cloud));
        assert!(plan_a.is_hybrid());
        assert!(plan_a.needs_local_backend());
        assert!(plan_a.needs_cloud());

        let plan_b = plan(&settings(EngineKind::Cloud, EngineKind::Local));
        assert!(plan_b.is_hybrid());
    }
}
