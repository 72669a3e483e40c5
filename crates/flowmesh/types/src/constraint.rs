//! Constraint model.
//!
//! Immutable tree types consumed from the external constraint parser. A
//! constraint is either a leaf hard constraint (possibly nested), a named
//! constraint group, or a reference to another group's result. Soft
//! constraints are flat scored preferences.
//!
//! Trees are treated as immutable values throughout: nested-name rewriting
//! during evaluation produces fresh leaf nodes, so the same tree can be
//! evaluated against multiple attribute maps concurrently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Attribute values keyed by dotted name, e.g. `machine.cpu.currentLoad`.
///
/// An array value means the attribute has many instances (multiple network
/// interfaces, multiple input devices); comparison semantics flatten this
/// into some/every checks.
pub type AttributeMap = HashMap<String, Value>;

/// Comparison operator of a leaf hard constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::Lt => "<",
            Condition::Gt => ">",
            Condition::Eq => "==",
            Condition::Ne => "!=",
            Condition::Le => "<=",
            Condition::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Optimization direction of a soft constraint.
///
/// `Min` means "lower is better"; the scorer uses the minimum observed value
/// as the reference point, it does not pick the minimum candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Max,
    Min,
}

/// How multiple values or sub-constraints combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conjunction {
    And,
    #[default]
    Or,
}

/// A node of the hard-constraint tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    #[serde(rename = "hardConstraint")]
    Hard(HardConstraint),

    #[serde(rename = "constraintGroup")]
    Group(ConstraintGroup),

    #[serde(rename = "constraintGroupRef")]
    GroupRef(ConstraintGroupRef),
}

impl Constraint {
    /// The attribute name, for leaf hard constraints.
    pub fn name(&self) -> Option<&str> {
        match self {
            Constraint::Hard(hc) => Some(&hc.name),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Constraint::Group(_))
    }
}

/// Leaf or nested hard constraint.
///
/// When `hard_constraints` is non-empty the constraint is nested: each value
/// in `values` spawns one evaluation of the child subtree under a composite
/// attribute namespace (`<name><condition><value>.<child>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardConstraint {
    /// Dotted attribute path, e.g. `machine.os.platform`.
    pub name: String,

    pub condition: Condition,

    /// Literal values to compare against, in order.
    #[serde(default)]
    pub values: Vec<Value>,

    /// Governs how multiple values combine; defaults to OR.
    #[serde(default)]
    pub conjunction: Conjunction,

    /// Child constraints; non-empty makes this a nested constraint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hard_constraints: Vec<Constraint>,
}

impl HardConstraint {
    /// Convenience constructor for a flat leaf constraint.
    pub fn leaf(
        name: impl Into<String>,
        condition: Condition,
        values: Vec<Value>,
        conjunction: Conjunction,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            values,
            conjunction,
            hard_constraints: Vec::new(),
        }
    }

    pub fn is_nested(&self) -> bool {
        !self.hard_constraints.is_empty()
    }
}

/// Named, conjunction-combined collection of hard constraints and group refs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintGroup {
    pub id: String,

    #[serde(default)]
    pub conjunction: Conjunction,

    /// Members: leaf/nested hard constraints or references to earlier groups.
    #[serde(default)]
    pub constraint_group: Vec<Constraint>,
}

/// Reference to another group's already-computed boolean result.
///
/// Must resolve to a sibling-or-earlier group id within the same evaluation
/// pass; the evaluator does not perform topological sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintGroupRef {
    #[serde(rename = "ref")]
    pub group_ref: String,
}

/// Scored preference; never eligibility-gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftConstraint {
    /// Dotted attribute path, e.g. `machine.mem.free`.
    pub name: String,

    /// Optimization direction.
    pub condition: Goal,

    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl SoftConstraint {
    pub fn new(name: impl Into<String>, condition: Goal) -> Self {
        Self {
            name: name.into(),
            condition,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Parsed constraints attached to a flow node or a whole process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConstraintSet {
    pub hard_constraints: Vec<Constraint>,
    pub soft_constraints: Vec<SoftConstraint>,
}

impl ConstraintSet {
    pub fn is_empty(&self) -> bool {
        self.hard_constraints.is_empty() && self.soft_constraints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hard_constraint_roundtrip() {
        let parsed: Constraint = serde_json::from_value(json!({
            "type": "hardConstraint",
            "name": "machine.os.platform",
            "condition": "==",
            "values": ["linux"],
        }))
        .unwrap();

        match &parsed {
            Constraint::Hard(hc) => {
                assert_eq!(hc.name, "machine.os.platform");
                assert_eq!(hc.condition, Condition::Eq);
                assert_eq!(hc.conjunction, Conjunction::Or);
                assert!(!hc.is_nested());
            }
            other => panic!("expected hard constraint, got {:?}", other),
        }
    }

    #[test]
    fn test_group_with_ref() {
        let parsed: Constraint = serde_json::from_value(json!({
            "type": "constraintGroup",
            "id": "g2",
            "conjunction": "AND",
            "constraintGroup": [
                { "type": "constraintGroupRef", "ref": "g1" },
                {
                    "type": "hardConstraint",
                    "name": "machine.cpu.currentLoad",
                    "condition": "<",
                    "values": [60],
                }
            ]
        }))
        .unwrap();

        let Constraint::Group(group) = parsed else {
            panic!("expected group");
        };
        assert_eq!(group.id, "g2");
        assert_eq!(group.conjunction, Conjunction::And);
        assert_eq!(group.constraint_group.len(), 2);
        assert!(matches!(
            group.constraint_group[0],
            Constraint::GroupRef(ConstraintGroupRef { ref group_ref }) if group_ref == "g1"
        ));
    }

    #[test]
    fn test_soft_constraint_default_weight() {
        let sc: SoftConstraint = serde_json::from_value(json!({
            "name": "machine.mem.free",
            "condition": "max",
        }))
        .unwrap();
        assert_eq!(sc.weight, 1.0);
        assert_eq!(sc.condition, Goal::Max);
    }

    #[test]
    fn test_constraint_set_defaults_empty() {
        let set: ConstraintSet = serde_json::from_value(json!({})).unwrap();
        assert!(set.is_empty());
    }
}
