//! Decision outputs.

use crate::machine::Machine;
use serde::{Deserialize, Serialize};

/// Scope that has to be aborted when a pre-check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopProcess {
    /// The whole process instance must stop.
    Instance,
    /// Only the current token must stop.
    Token,
}

/// Result of the abort pre-check. Output only, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortCheck {
    #[serde(default)]
    pub stop_process: Option<StopProcess>,

    #[serde(default)]
    pub unfulfilled_constraints: Vec<String>,
}

impl AbortCheck {
    /// Check that passed: execution may continue.
    pub fn passed() -> Self {
        Self::default()
    }

    pub fn stop(scope: StopProcess, unfulfilled_constraints: Vec<String>) -> Self {
        Self {
            stop_process: Some(scope),
            unfulfilled_constraints,
        }
    }

    pub fn aborted(&self) -> bool {
        self.stop_process.is_some()
    }
}

/// Ranked machine recommendation returned to the workflow engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecommendation {
    /// Candidate engines; best fit first when `prioritized`.
    pub engine_list: Vec<Machine>,

    /// Whether the list is ordered by soft-constraint score.
    pub prioritized: bool,

    /// Outcome of the abort pre-check.
    pub abort_check: AbortCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_check_states() {
        assert!(!AbortCheck::passed().aborted());

        let stopped = AbortCheck::stop(StopProcess::Token, vec!["maxMachineHops".into()]);
        assert!(stopped.aborted());
        assert_eq!(stopped.unfulfilled_constraints, vec!["maxMachineHops"]);
    }

    #[test]
    fn test_stop_process_serialization() {
        assert_eq!(
            serde_json::to_string(&StopProcess::Instance).unwrap(),
            "\"instance\""
        );
        assert_eq!(serde_json::to_string(&StopProcess::Token).unwrap(), "\"token\"");
    }
}
