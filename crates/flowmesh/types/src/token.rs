//! Execution-context facts handed in by the workflow engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-instance execution-state record, consumed read-only.
///
/// Relative times are milliseconds already spent; counters are cumulative
/// over the token's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionToken {
    /// When the instance was started globally.
    pub global_start_time: DateTime<Utc>,

    /// When the token started on the local engine.
    pub local_start_time: DateTime<Utc>,

    /// Milliseconds the token has spent executing locally.
    pub local_execution_time: u64,

    /// Milliseconds spent on the current flow node.
    pub flow_node_time: u64,

    /// Number of machines the token has already been on.
    pub machine_hops: u32,

    /// Milliseconds the token has spent in storage.
    pub storage_time: u64,

    /// Number of storage rounds the token has been through.
    pub storage_rounds: u32,
}

impl DecisionToken {
    /// Milliseconds elapsed since the global instance start.
    pub fn global_elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.global_start_time).num_milliseconds()
    }
}

/// Information about the next flow node a machine is being selected for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeInfo {
    pub id: String,

    #[serde(default)]
    pub is_user_task: bool,
}

/// Information about the running process model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The BPMN element the decision is being made for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_flow_node: Option<FlowNodeInfo>,
}

/// Flat facts the execution-constraint check compares against.
///
/// A `None` fact means the dimension does not apply to the current check
/// stage and can never exceed a limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionFacts {
    /// Local execution time, milliseconds (`maxTime`).
    pub time: Option<f64>,

    /// Global elapsed time, milliseconds (`maxTimeGlobal`).
    pub time_global: Option<f64>,

    /// Machine hops so far (`maxMachineHops`).
    pub machine_hops: Option<f64>,

    /// Token storage time, milliseconds (`maxTokenStorageTime`).
    pub storage_time: Option<f64>,

    /// Token storage rounds (`maxTokenStorageRounds`).
    pub storage_rounds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_global_elapsed() {
        let start = Utc::now();
        let token = DecisionToken {
            global_start_time: start,
            local_start_time: start,
            local_execution_time: 0,
            flow_node_time: 0,
            machine_hops: 0,
            storage_time: 0,
            storage_rounds: 0,
        };
        assert_eq!(token.global_elapsed_ms(start + Duration::seconds(2)), 2000);
    }
}
