//! Wire types of the peer evaluation protocol.
//!
//! Transport-agnostic: the actual transport is implemented outside this
//! subsystem against the `PeerTransport` trait in `flowmesh-registry`.

use crate::constraint::{Constraint, SoftConstraint};
use crate::ids::MachineId;
use crate::token::FlowNodeInfo;
use serde::{Deserialize, Serialize};

/// Request asking a peer to self-evaluate hard constraints and report
/// soft-constraint values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationRequest {
    pub hard_constraints: Vec<Constraint>,

    pub soft_constraints: Vec<SoftConstraint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_node_information: Option<FlowNodeInfo>,
}

/// Identity facts reported by a peer on discovery or address-forced lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    pub id: MachineId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub currently_connected_environments: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_deserializes_minimal() {
        let identity: PeerIdentity = serde_json::from_value(json!({ "id": "m1" })).unwrap();
        assert_eq!(identity.id, MachineId::new("m1"));
        assert!(identity.hostname.is_none());
        assert!(identity.currently_connected_environments.is_empty());
    }

    #[test]
    fn test_request_omits_absent_flow_node() {
        let request = EvaluationRequest::default();
        let encoded = serde_json::to_value(&request).unwrap();
        assert!(encoded.get("flowNodeInformation").is_none());
    }
}
