//! Peer machine descriptors.

use crate::ids::MachineId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A candidate machine in the peer network.
///
/// Lifecycle is owned by the peer registry: created on discovery, mutated on
/// re-discovery, removed on eviction or explicit withdrawal. Machines that
/// are only reachable through an address constraint start without an id; the
/// identity probe fills it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MachineId>,

    pub ip: String,

    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub currently_connected_environments: Vec<String>,
}

impl Machine {
    /// Descriptor for a machine known only by address.
    pub fn from_address(ip: impl Into<String>, port: u16) -> Self {
        Self {
            id: None,
            ip: ip.into(),
            port,
            name: None,
            hostname: None,
            currently_connected_environments: Vec::new(),
        }
    }

    /// `ip:port` key used by the strike map and for deduplication.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Whether two descriptors refer to the same machine, by id or address.
    pub fn same_machine(&self, other: &Machine) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) if a == b => true,
            _ => self.ip == other.ip && self.port == other.port,
        }
    }
}

/// A candidate together with its reported soft-constraint values.
///
/// Lives for a single decision call; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMachine {
    #[serde(flatten)]
    pub machine: Machine,

    #[serde(default)]
    pub soft_constraint_values: HashMap<String, Value>,
}

impl ScoredMachine {
    pub fn new(machine: Machine, soft_constraint_values: HashMap<String, Value>) -> Self {
        Self {
            machine,
            soft_constraint_values,
        }
    }
}
