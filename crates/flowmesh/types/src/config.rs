//! Configuration surface consumed by the placement subsystem.
//!
//! Loading and persistence are owned by an external configuration
//! collaborator; these structs are the read-only view this subsystem needs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default port assumed for machines forced in through an address constraint.
pub const DEFAULT_PEER_PORT: u16 = 33029;

/// Governs whether and how many external peers are queried per decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftConstraintPolicy {
    /// Never leave the local machine.
    LocalMachineOnly,

    /// Use the local machine whenever it is eligible.
    PreferLocalMachine,

    /// Return as soon as one qualifying machine answers; probes skip
    /// soft-constraint values.
    OnFirstFittingMachine,

    /// Query everyone but skip soft-constraint values to save round trips.
    AsFastAsPossible,

    /// Query everyone and rank by soft-constraint score.
    #[default]
    EvaluateAll,
}

impl SoftConstraintPolicy {
    /// Policies that send hard-constraint-only probes.
    pub fn skips_soft_values(&self) -> bool {
        matches!(
            self,
            SoftConstraintPolicy::AsFastAsPossible | SoftConstraintPolicy::OnFirstFittingMachine
        )
    }

    /// Policies that keep execution local when the local machine qualifies.
    pub fn prefers_local(&self) -> bool {
        matches!(
            self,
            SoftConstraintPolicy::PreferLocalMachine | SoftConstraintPolicy::OnFirstFittingMachine
        )
    }
}

/// Routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    pub soft_constraint_policy: SoftConstraintPolicy,

    /// Upper bound on waiting for external evaluation replies.
    pub wait_time_external_evaluations: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            soft_constraint_policy: SoftConstraintPolicy::default(),
            wait_time_external_evaluations: Duration::from_secs(10),
        }
    }
}

/// Engine-level network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Timeout for a single outbound peer request.
    pub network_request_timeout: Duration,

    /// Interval between health-check rounds over discovered peers.
    pub discovery_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network_request_timeout: Duration::from_secs(10),
            discovery_interval: Duration::from_secs(10),
        }
    }
}

/// Process execution switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessesConfig {
    /// Globally deactivates process execution on this machine.
    pub deactivate_process_execution: bool,

    /// Whether this machine accepts user tasks.
    pub accept_user_tasks: bool,
}

impl Default for ProcessesConfig {
    fn default() -> Self {
        Self {
            deactivate_process_execution: false,
            accept_user_tasks: true,
        }
    }
}

/// Configured elapsed-time limits, in seconds; `-1` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTimeLimits {
    pub max_time_process_global: i64,
    pub max_time_process_local: i64,
    pub max_time_flow_node: i64,
}

impl Default for ProcessTimeLimits {
    fn default() -> Self {
        Self {
            max_time_process_global: -1,
            max_time_process_local: -1,
            max_time_flow_node: -1,
        }
    }
}

impl ProcessTimeLimits {
    /// Whether `elapsed_ms` exceeds a limit given in seconds (`-1` unlimited).
    pub fn exceeded(limit_secs: i64, elapsed_ms: i64) -> bool {
        limit_secs != -1 && limit_secs * 1000 < elapsed_ms
    }
}

/// Complete configuration view for a decider instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeciderConfig {
    pub router: RouterConfig,
    pub engine: EngineConfig,
    pub processes: ProcessesConfig,
    pub process: ProcessTimeLimits,
}

impl DeciderConfig {
    /// Deadline for the bounded external-evaluation wait.
    pub fn external_evaluation_deadline(&self) -> Duration {
        self.router
            .wait_time_external_evaluations
            .min(self.engine.network_request_timeout)
    }
}
