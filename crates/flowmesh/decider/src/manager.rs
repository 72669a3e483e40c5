//! Constraint manager: policy checks and the external evaluation fan-out.
//!
//! Fan-out protocol: one request task per candidate machine, all sharing one
//! `mpsc` sender. A task sends a `ScoredMachine` only when its peer reports
//! that it qualifies; channel closure (every sender dropped) is the terminal
//! signal. The fan-in side stops on closure, on the policy's early exit, or
//! on the deadline, whichever comes first. Late replies are dropped, never
//! cancelled.

use std::sync::Arc;

use flowmesh_constraints::hard;
use flowmesh_registry::{PeerRegistry, PeerTransport};
use flowmesh_types::{
    AttributeMap, Condition, Constraint, DeciderConfig, EvaluationRequest, FlowNodeInfo, Machine,
    MachineInformation, ScoredMachine, SoftConstraint, SoftConstraintPolicy, DEFAULT_PEER_PORT,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::facts;

/// Constraint names that address specific machines instead of describing
/// required capabilities. They are evaluated locally against the peer pool
/// and never sent out.
pub const ADDRESS_CONSTRAINT_NAMES: [&str; 8] = [
    "machine.id",
    "machine.name",
    "machine.hostname",
    "machine.network.ip4",
    "machine.network.ip6",
    "machine.network.mac",
    "machine.network.netmaskv4",
    "machine.network.netmaskv6",
];

/// Policy checks and external-evaluation fan-out for one engine.
pub struct ConstraintManager {
    config: DeciderConfig,
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn PeerTransport>,
    introspection: Arc<dyn MachineInformation>,
}

impl ConstraintManager {
    pub fn new(
        config: DeciderConfig,
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn PeerTransport>,
        introspection: Arc<dyn MachineInformation>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
            introspection,
        }
    }

    pub fn config(&self) -> &DeciderConfig {
        &self.config
    }

    /// Whether execution is pinned to the local machine before any
    /// evaluation: either by policy, or by the last `sameMachine` constraint
    /// (its last listed value decides).
    pub fn pre_check_local_exec(&self, hard_constraints: &[Constraint]) -> bool {
        if self.config.router.soft_constraint_policy == SoftConstraintPolicy::LocalMachineOnly {
            return true;
        }

        hard_constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Hard(hc) if hc.name == "sameMachine" => hc.values.last(),
                _ => None,
            })
            .last()
            .map(is_truthy)
            .unwrap_or(false)
    }

    /// Whether the local engine configuration allows executing the next node.
    pub fn check_execution_config(&self, flow_node: Option<&FlowNodeInfo>) -> bool {
        if self.config.processes.deactivate_process_execution {
            return false;
        }
        match flow_node {
            Some(node) if node.is_user_task => self.config.processes.accept_user_tasks,
            _ => true,
        }
    }

    /// Local values for the attributes the soft constraints reference.
    pub async fn get_local_soft_constraint_values(
        &self,
        soft_constraints: &[SoftConstraint],
    ) -> AttributeMap {
        let names: Vec<String> = soft_constraints.iter().map(|sc| sc.name.clone()).collect();
        facts::local_attribute_values(self.introspection.as_ref(), &names).await
    }

    /// Fan out one evaluation request per candidate machine.
    ///
    /// Candidates are the registry pool plus any not-yet-known
    /// `additional_machines`, filtered by the address constraints; `==`
    /// constraints on `machine.network.ip4` force-add undiscovered machines
    /// at the default port. The returned channel yields qualifying peers and
    /// closes once every request has concluded.
    #[instrument(skip_all, fields(hard = hard_constraints.len(), soft = soft_constraints.len()))]
    pub fn send_hard_constraints(
        &self,
        hard_constraints: &[Constraint],
        soft_constraints: &[SoftConstraint],
        flow_node: Option<&FlowNodeInfo>,
        additional_machines: &[Machine],
    ) -> mpsc::Receiver<ScoredMachine> {
        let address_constraints = collect_address_constraints(hard_constraints);

        let mut candidates = self.registry.available_machines();
        for machine in additional_machines {
            if !candidates.iter().any(|known| known.same_machine(machine)) {
                candidates.push(machine.clone());
            }
        }

        candidates.retain(|machine| {
            address_constraints.is_empty()
                || hard::evaluate_all(&address_constraints, &address_attributes(machine))
        });

        // Explicitly addressed machines bypass the local filter; the peer
        // re-verifies the full constraint list against its own facts.
        force_add_addressed_machines(&address_constraints, &mut candidates);

        debug!(candidates = candidates.len(), "sending hard constraints to peers");

        let request = EvaluationRequest {
            hard_constraints: hard_constraints.to_vec(),
            soft_constraints: if self.config.router.soft_constraint_policy.skips_soft_values() {
                Vec::new()
            } else {
                soft_constraints.to_vec()
            },
            flow_node_information: flow_node.cloned(),
        };

        let (tx, rx) = mpsc::channel(candidates.len().max(1));
        for machine in candidates {
            let tx = tx.clone();
            let transport = Arc::clone(&self.transport);
            let request = request.clone();
            tokio::spawn(async move {
                match transport
                    .request_evaluation(&machine.ip, machine.port, &request)
                    .await
                {
                    Ok(Some(values)) => {
                        let Some(machine) = identified(transport.as_ref(), machine).await else {
                            return;
                        };
                        let _ = tx.send(ScoredMachine::new(machine, values)).await;
                    }
                    Ok(None) => {
                        debug!(endpoint = %machine.endpoint(), "peer does not qualify");
                    }
                    Err(e) => {
                        warn!(endpoint = %machine.endpoint(), error = %e, "evaluation request failed");
                    }
                }
            });
        }
        // Receiver closure now tracks the spawned tasks alone.
        drop(tx);
        rx
    }

    /// Collect qualifying peers within the bounded wait.
    ///
    /// The deadline is the smaller of the configured wait and the per-request
    /// network timeout. `OnFirstFittingMachine` returns after the first
    /// qualifying peer.
    pub async fn get_external_soft_constraint_values(
        &self,
        hard_constraints: &[Constraint],
        soft_constraints: &[SoftConstraint],
        flow_node: Option<&FlowNodeInfo>,
        additional_machines: &[Machine],
    ) -> Vec<ScoredMachine> {
        let mut replies = self.send_hard_constraints(
            hard_constraints,
            soft_constraints,
            flow_node,
            additional_machines,
        );

        let deadline = tokio::time::Instant::now() + self.config.external_evaluation_deadline();
        let first_fit = self.config.router.soft_constraint_policy
            == SoftConstraintPolicy::OnFirstFittingMachine;

        let mut qualified = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some(scored)) => {
                    qualified.push(scored);
                    if first_fit {
                        break;
                    }
                }
                // Channel closed: every request concluded.
                Ok(None) => break,
                // Deadline: stop listening, in-flight requests are dropped.
                Err(_) => {
                    debug!(
                        qualified = qualified.len(),
                        "external evaluation wait expired"
                    );
                    break;
                }
            }
        }
        qualified
    }
}

/// Fill in the identity of an address-only machine before its result counts.
async fn identified(transport: &dyn PeerTransport, machine: Machine) -> Option<Machine> {
    if machine.id.is_some() {
        return Some(machine);
    }
    match transport.identity(&machine.ip, machine.port).await {
        Ok(identity) => Some(Machine {
            id: Some(identity.id),
            ip: machine.ip,
            port: machine.port,
            name: machine.name.or(identity.name),
            hostname: identity.hostname,
            currently_connected_environments: identity.currently_connected_environments,
        }),
        Err(e) => {
            warn!(endpoint = %machine.endpoint(), error = %e, "identity lookup failed");
            None
        }
    }
}

fn collect_address_constraints(constraints: &[Constraint]) -> Vec<Constraint> {
    constraints
        .iter()
        .filter(|c| {
            c.name()
                .map(|name| ADDRESS_CONSTRAINT_NAMES.contains(&name))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Known address facts of a candidate, for address-constraint filtering.
/// Absent facts fail the operator, so constraints on unknown dimensions
/// (e.g. mac) exclude discovered peers.
fn address_attributes(machine: &Machine) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    if let Some(id) = &machine.id {
        attrs.insert("machine.id".into(), Value::String(id.to_string()));
    }
    if let Some(name) = &machine.name {
        attrs.insert("machine.name".into(), Value::String(name.clone()));
    }
    if let Some(hostname) = &machine.hostname {
        attrs.insert("machine.hostname".into(), Value::String(hostname.clone()));
    }
    attrs.insert("machine.network.ip4".into(), Value::String(machine.ip.clone()));
    attrs
}

/// Machines explicitly requested by an `ip ==` constraint that no discovery
/// round has seen yet are contacted anyway, at the default port.
fn force_add_addressed_machines(address_constraints: &[Constraint], candidates: &mut Vec<Machine>) {
    for constraint in address_constraints {
        let Constraint::Hard(hc) = constraint else {
            continue;
        };
        if hc.name != "machine.network.ip4" || hc.condition != Condition::Eq {
            continue;
        }
        for value in &hc.values {
            if let Value::String(ip) = value {
                if !candidates.iter().any(|m| &m.ip == ip) {
                    candidates.push(Machine::from_address(ip.clone(), DEFAULT_PEER_PORT));
                }
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}
