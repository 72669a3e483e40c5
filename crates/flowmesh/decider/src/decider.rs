//! Decision orchestration.
//!
//! Entry points the workflow engine calls when a token reaches a flow node:
//! abort pre-checks against the execution state, local-eligibility checks,
//! and the ranked machine recommendation.

use std::sync::Arc;

use chrono::Utc;
use flowmesh_constraints::{hard, soft};
use flowmesh_registry::{PeerRegistry, PeerTransport};
use flowmesh_types::{
    AbortCheck, Constraint, ConstraintSet, DeciderConfig, DecisionToken, Machine,
    MachineInformation, MachineRecommendation, ProcessInfo, ProcessTimeLimits, ScoredMachine,
    StopProcess,
};
use tracing::{info, instrument};

use crate::error::{DeciderError, DeciderResult};
use crate::manager::ConstraintManager;
use crate::{facts, helper};

/// Per-engine decision orchestrator.
///
/// Holds the descriptor of the local machine so recommendations can list it
/// alongside external candidates.
pub struct Decider {
    manager: ConstraintManager,
    introspection: Arc<dyn MachineInformation>,
    local_machine: Machine,
}

impl Decider {
    pub fn new(
        config: DeciderConfig,
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn PeerTransport>,
        introspection: Arc<dyn MachineInformation>,
        local_machine: Machine,
    ) -> Self {
        let manager =
            ConstraintManager::new(config, registry, transport, Arc::clone(&introspection));
        Self {
            manager,
            introspection,
            local_machine,
        }
    }

    pub fn local_machine(&self) -> &Machine {
        &self.local_machine
    }

    /// Check whether the token may continue at all before any machine is
    /// considered.
    ///
    /// Stages, first failure wins: configured process time limits, then
    /// process-level execution constraints (both stop the whole instance),
    /// then the configured flow-node time limit, then flow-node execution
    /// constraints (both stop only this token). A process-level execution
    /// constraint shadowed by a flow-node constraint of the same name is not
    /// checked at instance scope.
    #[instrument(skip_all, fields(process = %process.id))]
    pub fn pre_check_abort(
        &self,
        process: &ProcessInfo,
        token: &DecisionToken,
        flow_node_hc: &[Constraint],
        process_hc: &[Constraint],
    ) -> AbortCheck {
        let global_elapsed = token.global_elapsed_ms(Utc::now());
        let limits = &self.manager.config().process;

        let mut over_limits: Vec<String> = Vec::new();
        if ProcessTimeLimits::exceeded(limits.max_time_process_global, global_elapsed) {
            over_limits.push("maxTimeProcessGlobal".into());
        }
        if ProcessTimeLimits::exceeded(
            limits.max_time_process_local,
            token.local_execution_time as i64,
        ) {
            over_limits.push("maxTimeProcessLocal".into());
        }
        if !over_limits.is_empty() {
            info!(limits = ?over_limits, "configured process time limits exceeded");
            return AbortCheck::stop(StopProcess::Instance, over_limits);
        }

        let process_facts = flowmesh_types::ExecutionFacts {
            time: Some(token.local_execution_time as f64),
            time_global: Some(global_elapsed as f64),
            machine_hops: Some(token.machine_hops as f64),
            storage_time: Some(token.storage_time as f64),
            storage_rounds: Some(token.storage_rounds as f64),
        };
        let process_only = helper::filter_out_duplicate_process_constraints(process_hc, flow_node_hc);
        let unsatisfied = hard::unsatisfied_execution_constraints(&process_only, &process_facts);
        if !unsatisfied.is_empty() {
            return AbortCheck::stop(StopProcess::Instance, constraint_names(&unsatisfied));
        }

        if ProcessTimeLimits::exceeded(limits.max_time_flow_node, token.flow_node_time as i64) {
            info!(flow_node_time = token.flow_node_time, "flow node time limit exceeded");
            return AbortCheck::stop(StopProcess::Token, vec!["maxTimeFlowNode".into()]);
        }

        // Flow-node scope: maxTime now measures the current node, and the
        // global time dimension does not apply.
        let flow_node_facts = flowmesh_types::ExecutionFacts {
            time: Some(token.flow_node_time as f64),
            time_global: None,
            ..process_facts
        };
        let unsatisfied = hard::unsatisfied_execution_constraints(flow_node_hc, &flow_node_facts);
        if !unsatisfied.is_empty() {
            return AbortCheck::stop(StopProcess::Token, constraint_names(&unsatisfied));
        }

        AbortCheck::passed()
    }

    /// Whether this machine may execute the next flow node itself.
    pub async fn allowed_to_execute_locally(
        &self,
        process: Option<&ProcessInfo>,
        token: Option<&DecisionToken>,
        flow_node_hc: &[Constraint],
        process_hc: &[Constraint],
    ) -> DeciderResult<bool> {
        let process = process.ok_or(DeciderError::MissingProcessInfo)?;

        // Without any constraints there is nothing to check; the engine
        // configuration is consulted only when a machine is being selected.
        if flow_node_hc.is_empty() && process_hc.is_empty() {
            return Ok(true);
        }
        if let Some(token) = token {
            if self
                .pre_check_abort(process, token, flow_node_hc, process_hc)
                .aborted()
            {
                return Ok(false);
            }
        }

        let merged = helper::concat_all_constraints(process_hc, flow_node_hc);
        let capability = helper::filter_out_process_execution_constraints(&merged);
        Ok(
            facts::machine_satisfies_all_hard_constraints(
                self.introspection.as_ref(),
                &capability,
            )
            .await,
        )
    }

    /// Recommend machines for the token's next flow node, local machine
    /// included when eligible.
    #[instrument(skip_all, fields(process = %process.map(|p| p.id.as_str()).unwrap_or_default()))]
    pub async fn find_optimal_next_machine(
        &self,
        process: Option<&ProcessInfo>,
        token: Option<&DecisionToken>,
        flow_node: &ConstraintSet,
        process_constraints: &ConstraintSet,
    ) -> DeciderResult<MachineRecommendation> {
        let process = process.ok_or(DeciderError::MissingProcessInfo)?;
        let token = token.ok_or(DeciderError::MissingToken)?;

        let abort_check = self.pre_check_abort(
            process,
            token,
            &flow_node.hard_constraints,
            &process_constraints.hard_constraints,
        );
        if abort_check.aborted() {
            return Ok(MachineRecommendation {
                engine_list: Vec::new(),
                prioritized: false,
                abort_check,
            });
        }

        let hard_constraints = helper::concat_all_constraints(
            &process_constraints.hard_constraints,
            &flow_node.hard_constraints,
        );
        let soft_constraints = helper::concat_soft_constraints(
            &process_constraints.soft_constraints,
            &flow_node.soft_constraints,
        );
        let flow_node_info = process.next_flow_node.as_ref();

        let capability = helper::filter_out_process_execution_constraints(&hard_constraints);
        let locally_eligible = self.manager.check_execution_config(flow_node_info)
            && facts::machine_satisfies_all_hard_constraints(
                self.introspection.as_ref(),
                &capability,
            )
            .await;

        // Pinned to this machine: no network either way.
        if self.manager.pre_check_local_exec(&hard_constraints) {
            let engine_list = if locally_eligible {
                vec![self.local_machine.clone()]
            } else {
                Vec::new()
            };
            return Ok(MachineRecommendation {
                engine_list,
                prioritized: false,
                abort_check,
            });
        }

        if self
            .manager
            .config()
            .router
            .soft_constraint_policy
            .prefers_local()
            && locally_eligible
        {
            return Ok(MachineRecommendation {
                engine_list: vec![self.local_machine.clone()],
                prioritized: false,
                abort_check,
            });
        }

        let mut candidates: Vec<ScoredMachine> = Vec::new();
        if locally_eligible {
            let values = self
                .manager
                .get_local_soft_constraint_values(&soft_constraints)
                .await;
            candidates.push(ScoredMachine::new(self.local_machine.clone(), values));
        }
        candidates.extend(
            self.manager
                .get_external_soft_constraint_values(
                    &capability,
                    &soft_constraints,
                    flow_node_info,
                    &[],
                )
                .await,
        );

        let prioritized = !soft_constraints.is_empty();
        Ok(MachineRecommendation {
            engine_list: soft::rank(&soft_constraints, candidates),
            prioritized,
            abort_check,
        })
    }

    /// Recommend external machines only, e.g. when forwarding a token this
    /// machine must not execute. Explicitly named machines join the pool.
    #[instrument(skip_all, fields(additional = additional_machines.len()))]
    pub async fn find_optimal_external_machine(
        &self,
        process: Option<&ProcessInfo>,
        token: Option<&DecisionToken>,
        flow_node: &ConstraintSet,
        process_constraints: &ConstraintSet,
        additional_machines: &[Machine],
    ) -> DeciderResult<MachineRecommendation> {
        let process = process.ok_or(DeciderError::MissingProcessInfo)?;

        let mut abort_check = AbortCheck::passed();
        if let Some(token) = token {
            abort_check = self.pre_check_abort(
                process,
                token,
                &flow_node.hard_constraints,
                &process_constraints.hard_constraints,
            );
            if abort_check.aborted() {
                return Ok(MachineRecommendation {
                    engine_list: Vec::new(),
                    prioritized: false,
                    abort_check,
                });
            }
        }

        let hard_constraints = helper::concat_all_constraints(
            &process_constraints.hard_constraints,
            &flow_node.hard_constraints,
        );
        let soft_constraints = helper::concat_soft_constraints(
            &process_constraints.soft_constraints,
            &flow_node.soft_constraints,
        );
        let capability = helper::filter_out_process_execution_constraints(&hard_constraints);

        let candidates = self
            .manager
            .get_external_soft_constraint_values(
                &capability,
                &soft_constraints,
                process.next_flow_node.as_ref(),
                additional_machines,
            )
            .await;

        let prioritized = !soft_constraints.is_empty();
        Ok(MachineRecommendation {
            engine_list: soft::rank(&soft_constraints, candidates),
            prioritized,
            abort_check,
        })
    }
}

fn constraint_names(constraints: &[flowmesh_types::HardConstraint]) -> Vec<String> {
    constraints.iter().map(|hc| hc.name.clone()).collect()
}
