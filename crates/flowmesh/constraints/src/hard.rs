//! Hard-constraint evaluation.
//!
//! Boolean evaluator for constraint trees against an attribute map. Leaf
//! comparison uses double quantification: with conjunction OR the leaf is
//! satisfied if *some* listed value matches *some* attribute instance, with
//! AND *every* listed value must match *some* instance. Attribute values are
//! always treated as a list, so array-valued attributes (e.g. multiple
//! network interfaces) fall out of the same rule.

use flowmesh_types::{
    AttributeMap, Condition, Conjunction, Constraint, ConstraintGroup, ExecutionFacts,
    HardConstraint,
};
use serde_json::Value;
use tracing::warn;

/// Reserved constraint names that describe the process execution itself
/// rather than machine facts. They are checked by the abort pre-check and
/// stripped before any machine-eligibility evaluation.
pub const PROCESS_EXECUTION_CONSTRAINT_NAMES: [&str; 6] = [
    "maxTime",
    "maxTimeGlobal",
    "maxMachineHops",
    "maxTokenStorageTime",
    "maxTokenStorageRounds",
    "sameMachine",
];

/// Evaluate a single hard constraint (leaf or nested).
pub fn evaluate(constraint: &HardConstraint, attributes: &AttributeMap) -> bool {
    if constraint.is_nested() {
        evaluate_nested(constraint, attributes)
    } else {
        evaluate_leaf(constraint, attributes.get(&constraint.name))
    }
}

/// Evaluate a full top-level constraint list.
///
/// The result is the AND of all constraint groups not referenced by another
/// group (each reduced by its own conjunction) and every top-level leaf hard
/// constraint.
pub fn evaluate_all(constraints: &[Constraint], attributes: &AttributeMap) -> bool {
    let groups: Vec<&ConstraintGroup> = constraints
        .iter()
        .filter_map(|c| match c {
            Constraint::Group(group) => Some(group),
            _ => None,
        })
        .collect();

    let groups_satisfied = evaluate_groups(&groups, attributes);

    let leaves_satisfied = constraints
        .iter()
        .filter_map(|c| match c {
            Constraint::Hard(hc) => Some(hc),
            _ => None,
        })
        .all(|hc| evaluate(hc, attributes));

    groups_satisfied && leaves_satisfied
}

/// Evaluate constraint groups in declaration order.
///
/// Two passes over a result table: every group is evaluated into the table so
/// later `constraintGroupRef` members can reuse its boolean; the final
/// reduction only counts groups no other group referenced. References must
/// point at already-evaluated groups; a dangling or forward reference fails
/// the referencing group.
pub fn evaluate_groups(groups: &[&ConstraintGroup], attributes: &AttributeMap) -> bool {
    let mut evaluated: Vec<(&str, bool)> = Vec::with_capacity(groups.len());
    let mut referenced: Vec<&str> = Vec::new();

    for group in groups {
        let mut member_results = Vec::with_capacity(group.constraint_group.len());

        for member in &group.constraint_group {
            let result = match member {
                Constraint::Hard(hc) => evaluate(hc, attributes),
                Constraint::GroupRef(group_ref) => {
                    match evaluated
                        .iter()
                        .find(|(id, _)| *id == group_ref.group_ref)
                    {
                        Some(&(id, result)) => {
                            referenced.push(id);
                            result
                        }
                        None => {
                            warn!(
                                group = %group.id,
                                reference = %group_ref.group_ref,
                                "constraint group references an unknown or later group"
                            );
                            false
                        }
                    }
                }
                Constraint::Group(inner) => {
                    // The parser flattens groups to one level; tolerate a
                    // stray inner group as an anonymous sub-evaluation.
                    evaluate_groups(&[inner], attributes)
                }
            };
            member_results.push(result);
        }

        let satisfied = match group.conjunction {
            Conjunction::Or => member_results.iter().any(|r| *r),
            Conjunction::And => member_results.iter().all(|r| *r),
        };
        evaluated.push((group.id.as_str(), satisfied));
    }

    evaluated
        .iter()
        .all(|(id, result)| referenced.contains(id) || *result)
}

/// Flat set of attribute paths a constraint list needs resolved, in first-use
/// order. Nested constraints contribute one prefixed path per parent value,
/// exactly as evaluation will look them up.
pub fn hard_constraint_names(constraints: &[Constraint]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    collect_names(constraints, &mut names);
    names
}

/// Execution-constraint check used by abort pre-checks.
///
/// A separate flat check against the reserved time/hop/storage names; each is
/// compared with strict `>` against the corresponding fact, and a constraint
/// is unsatisfied as soon as *any* of its listed values is exceeded. Never
/// folded into the tree evaluator.
pub fn unsatisfied_execution_constraints(
    constraints: &[Constraint],
    facts: &ExecutionFacts,
) -> Vec<HardConstraint> {
    constraints
        .iter()
        .filter_map(|c| match c {
            Constraint::Hard(hc) => Some(hc),
            _ => None,
        })
        .filter(|hc| {
            let fact = match hc.name.as_str() {
                "maxTime" => facts.time,
                "maxTimeGlobal" => facts.time_global,
                "maxMachineHops" => facts.machine_hops,
                "maxTokenStorageTime" => facts.storage_time,
                "maxTokenStorageRounds" => facts.storage_rounds,
                _ => return false,
            };
            let Some(fact) = fact else {
                return false;
            };
            hc.values
                .iter()
                .any(|limit| matches!(as_number(limit), Some(limit) if fact > limit))
        })
        .cloned()
        .collect()
}

fn collect_names(constraints: &[Constraint], names: &mut Vec<String>) {
    for constraint in constraints {
        match constraint {
            Constraint::Hard(hc) if hc.is_nested() => {
                let mut child_names = Vec::new();
                collect_names(&hc.hard_constraints, &mut child_names);
                for child_name in &child_names {
                    for value in &hc.values {
                        push_unique(names, nested_name(hc, value, child_name));
                    }
                }
            }
            Constraint::Hard(hc) => push_unique(names, hc.name.clone()),
            Constraint::Group(group) => collect_names(&group.constraint_group, names),
            Constraint::GroupRef(_) => {}
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Evaluate a nested constraint: one independent subtree evaluation per
/// parent value, combined by the parent conjunction. Rewriting builds fresh
/// nodes; the input tree is never mutated.
fn evaluate_nested(constraint: &HardConstraint, attributes: &AttributeMap) -> bool {
    let per_value: Vec<bool> = constraint
        .values
        .iter()
        .map(|value| {
            let rewritten: Vec<Constraint> = constraint
                .hard_constraints
                .iter()
                .map(|child| prefixed(constraint, value, child))
                .collect();
            evaluate_all(&rewritten, attributes)
        })
        .collect();

    match constraint.conjunction {
        Conjunction::Or => per_value.iter().any(|r| *r),
        Conjunction::And => per_value.iter().all(|r| *r),
    }
}

/// Composite namespace for one parent value: `<name><condition><value>.<child>`.
/// Dots inside the value are flattened to underscores so the fragment stays a
/// single path segment and remains injective per value.
fn nested_name(parent: &HardConstraint, value: &Value, child_name: &str) -> String {
    format!(
        "{}{}{}.{}",
        parent.name,
        parent.condition,
        value_fragment(value),
        child_name
    )
}

/// One-level rewrite of a nested constraint's child under a parent value.
/// Deeper nesting is handled when the (already renamed) child is evaluated.
fn prefixed(parent: &HardConstraint, value: &Value, child: &Constraint) -> Constraint {
    match child {
        Constraint::Hard(hc) => {
            let mut renamed = hc.clone();
            renamed.name = nested_name(parent, value, &hc.name);
            Constraint::Hard(renamed)
        }
        Constraint::Group(group) => {
            let mut renamed = group.clone();
            renamed.constraint_group = group
                .constraint_group
                .iter()
                .map(|member| prefixed(parent, value, member))
                .collect();
            Constraint::Group(renamed)
        }
        Constraint::GroupRef(_) => child.clone(),
    }
}

fn evaluate_leaf(constraint: &HardConstraint, attribute: Option<&Value>) -> bool {
    // Absent attribute fails every operator.
    let instances: Vec<&Value> = match attribute {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
    };

    let value_matches = |value: &Value| {
        instances
            .iter()
            .any(|instance| compare(constraint.condition, instance, value))
    };

    match constraint.conjunction {
        Conjunction::Or => constraint.values.iter().any(|v| value_matches(v)),
        Conjunction::And => {
            !constraint.values.is_empty() && constraint.values.iter().all(|v| value_matches(v))
        }
    }
}

/// Compare one attribute instance against one literal under an operator.
/// Numeric comparison when both sides coerce to a number (literals from the
/// XML parser often arrive as strings), otherwise string ordering for the
/// relational operators and JSON equality for `==`/`!=`.
fn compare(condition: Condition, instance: &Value, literal: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(instance), as_number(literal)) {
        return match condition {
            Condition::Lt => a < b,
            Condition::Gt => a > b,
            Condition::Eq => a == b,
            Condition::Ne => a != b,
            Condition::Le => a <= b,
            Condition::Ge => a >= b,
        };
    }

    match condition {
        Condition::Eq => loose_eq(instance, literal),
        Condition::Ne => !loose_eq(instance, literal),
        _ => match (instance.as_str(), literal.as_str()) {
            (Some(a), Some(b)) => match condition {
                Condition::Lt => a < b,
                Condition::Gt => a > b,
                Condition::Le => a <= b,
                Condition::Ge => a >= b,
                _ => unreachable!(),
            },
            _ => false,
        },
    }
}

fn loose_eq(instance: &Value, literal: &Value) -> bool {
    if instance == literal {
        return true;
    }
    // Bridge typed attribute values and string-typed literals.
    match (instance, literal) {
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s == if *b { "true" } else { "false" }
        }
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Content of a literal value as a name fragment, dots flattened.
fn value_fragment(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_types::ConstraintGroupRef;
    use serde_json::json;
    use std::collections::HashMap;

    fn leaf(name: &str, condition: Condition, values: Vec<Value>, conj: Conjunction) -> Constraint {
        Constraint::Hard(HardConstraint::leaf(name, condition, values, conj))
    }

    fn attrs(entries: &[(&str, Value)]) -> AttributeMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_leaf_single_value() {
        let constraint =
            HardConstraint::leaf("machine.os.platform", Condition::Eq, vec![json!("linux")], Conjunction::Or);

        let linux = attrs(&[("machine.os.platform", json!("linux"))]);
        assert!(evaluate(&constraint, &linux));

        let windows = attrs(&[("machine.os.platform", json!("windows"))]);
        assert!(!evaluate(&constraint, &windows));
    }

    #[test]
    fn test_leaf_missing_attribute_fails() {
        let constraint =
            HardConstraint::leaf("machine.os.platform", Condition::Ne, vec![json!("linux")], Conjunction::Or);
        assert!(!evaluate(&constraint, &AttributeMap::new()));
    }

    #[test]
    fn test_leaf_multiple_values_and_conjunction() {
        let constraint = HardConstraint::leaf(
            "machine.inputs",
            Condition::Eq,
            vec![json!("Keyboard"), json!("Touch")],
            Conjunction::And,
        );

        let both = attrs(&[("machine.inputs", json!(["Keyboard", "Touch"]))]);
        assert!(evaluate(&constraint, &both));

        let one = attrs(&[("machine.inputs", json!(["Keyboard", "Mouse"]))]);
        assert!(!evaluate(&constraint, &one));
    }

    #[test]
    fn test_leaf_multiple_values_or_conjunction() {
        let constraint = HardConstraint::leaf(
            "machine.inputs",
            Condition::Eq,
            vec![json!("Keyboard"), json!("Touch")],
            Conjunction::Or,
        );

        let touch_only = attrs(&[("machine.inputs", json!(["Touch"]))]);
        assert!(evaluate(&constraint, &touch_only));

        let mouse_only = attrs(&[("machine.inputs", json!(["Mouse"]))]);
        assert!(!evaluate(&constraint, &mouse_only));
    }

    #[test]
    fn test_flipping_conjunction_flips_quantifier() {
        let machine = attrs(&[("machine.inputs", json!(["Touch"]))]);

        let mut constraint = HardConstraint::leaf(
            "machine.inputs",
            Condition::Eq,
            vec![json!("Keyboard"), json!("Touch")],
            Conjunction::Or,
        );
        assert!(evaluate(&constraint, &machine));

        constraint.conjunction = Conjunction::And;
        assert!(!evaluate(&constraint, &machine));
    }

    #[test]
    fn test_numeric_comparison_with_string_literal() {
        let constraint = HardConstraint::leaf(
            "machine.cpu.currentLoad",
            Condition::Lt,
            vec![json!("60")],
            Conjunction::Or,
        );
        let load = attrs(&[("machine.cpu.currentLoad", json!(59))]);
        assert!(evaluate(&constraint, &load));

        let busy = attrs(&[("machine.cpu.currentLoad", json!(61))]);
        assert!(!evaluate(&constraint, &busy));
    }

    #[test]
    fn test_nested_single_value() {
        let constraint = HardConstraint {
            name: "machine.possibleConnectionTo".into(),
            condition: Condition::Eq,
            values: vec![json!("google_de")],
            conjunction: Conjunction::Or,
            hard_constraints: vec![leaf("latency", Condition::Lt, vec![json!(50)], Conjunction::Or)],
        };

        let fast = attrs(&[("machine.possibleConnectionTo==google_de.latency", json!(49))]);
        assert!(evaluate(&constraint, &fast));

        let slow = attrs(&[("machine.possibleConnectionTo==google_de.latency", json!(51))]);
        assert!(!evaluate(&constraint, &slow));
    }

    #[test]
    fn test_nested_branches_are_independent_per_value() {
        let constraint = HardConstraint {
            name: "machine.possibleConnectionTo".into(),
            condition: Condition::Eq,
            values: vec![json!("google_de"), json!("yahoo_de")],
            conjunction: Conjunction::And,
            hard_constraints: vec![leaf("latency", Condition::Lt, vec![json!(50)], Conjunction::Or)],
        };

        let both_fast = attrs(&[
            ("machine.possibleConnectionTo==google_de.latency", json!(49)),
            ("machine.possibleConnectionTo==yahoo_de.latency", json!(49)),
        ]);
        assert!(evaluate(&constraint, &both_fast));

        // Each branch must reflect its own attribute value.
        let one_slow = attrs(&[
            ("machine.possibleConnectionTo==google_de.latency", json!(49)),
            ("machine.possibleConnectionTo==yahoo_de.latency", json!(51)),
        ]);
        assert!(!evaluate(&constraint, &one_slow));

        let mut or_constraint = constraint.clone();
        or_constraint.conjunction = Conjunction::Or;
        assert!(evaluate(&or_constraint, &one_slow));
    }

    #[test]
    fn test_group_conjunctions() {
        let group = |conj| {
            ConstraintGroup {
                id: "g1".into(),
                conjunction: conj,
                constraint_group: vec![
                    leaf("machine.os.platform", Condition::Eq, vec![json!("linux")], Conjunction::Or),
                    leaf("machine.os.distro", Condition::Eq, vec![json!("Ubuntu")], Conjunction::Or),
                ],
            }
        };

        let ubuntu = attrs(&[
            ("machine.os.platform", json!("linux")),
            ("machine.os.distro", json!("Ubuntu")),
        ]);
        let kubuntu = attrs(&[
            ("machine.os.platform", json!("linux")),
            ("machine.os.distro", json!("Kubuntu")),
        ]);
        let windows = attrs(&[
            ("machine.os.platform", json!("windows")),
            ("machine.os.distro", json!("Windows10")),
        ]);

        let and_group = group(Conjunction::And);
        assert!(evaluate_groups(&[&and_group], &ubuntu));
        assert!(!evaluate_groups(&[&and_group], &kubuntu));

        let or_group = group(Conjunction::Or);
        assert!(evaluate_groups(&[&or_group], &kubuntu));
        assert!(!evaluate_groups(&[&or_group], &windows));
    }

    #[test]
    fn test_referenced_group_excluded_from_top_level() {
        // g1 fails on its own, but only feeds into g2 which ORs it away.
        let g1 = ConstraintGroup {
            id: "g1".into(),
            conjunction: Conjunction::And,
            constraint_group: vec![leaf(
                "machine.os.platform",
                Condition::Eq,
                vec![json!("windows")],
                Conjunction::Or,
            )],
        };
        let g2 = ConstraintGroup {
            id: "g2".into(),
            conjunction: Conjunction::Or,
            constraint_group: vec![
                Constraint::GroupRef(ConstraintGroupRef {
                    group_ref: "g1".into(),
                }),
                leaf("machine.os.platform", Condition::Eq, vec![json!("linux")], Conjunction::Or),
            ],
        };

        let linux = attrs(&[("machine.os.platform", json!("linux"))]);
        assert!(evaluate_groups(&[&g1, &g2], &linux));
    }

    #[test]
    fn test_dangling_group_ref_fails_referencing_group() {
        let group = ConstraintGroup {
            id: "g1".into(),
            conjunction: Conjunction::And,
            constraint_group: vec![Constraint::GroupRef(ConstraintGroupRef {
                group_ref: "missing".into(),
            })],
        };
        assert!(!evaluate_groups(&[&group], &AttributeMap::new()));
    }

    #[test]
    fn test_evaluate_all_mixes_groups_and_leaves() {
        let constraints = vec![
            leaf("machine.os.platform", Condition::Eq, vec![json!("linux")], Conjunction::Or),
            Constraint::Group(ConstraintGroup {
                id: "g1".into(),
                conjunction: Conjunction::And,
                constraint_group: vec![leaf(
                    "machine.cpu.currentLoad",
                    Condition::Lt,
                    vec![json!(60)],
                    Conjunction::Or,
                )],
            }),
        ];

        let good = attrs(&[
            ("machine.os.platform", json!("linux")),
            ("machine.cpu.currentLoad", json!(59)),
        ]);
        assert!(evaluate_all(&constraints, &good));

        let busy = attrs(&[
            ("machine.os.platform", json!("linux")),
            ("machine.cpu.currentLoad", json!(75)),
        ]);
        assert!(!evaluate_all(&constraints, &busy));
    }

    #[test]
    fn test_hard_constraint_names_with_nesting() {
        let constraints = vec![
            leaf("machine.os.platform", Condition::Eq, vec![json!("linux")], Conjunction::Or),
            Constraint::Hard(HardConstraint {
                name: "machine.possibleConnectionTo".into(),
                condition: Condition::Eq,
                values: vec![json!("google_de"), json!("yahoo_de")],
                conjunction: Conjunction::Or,
                hard_constraints: vec![leaf("latency", Condition::Lt, vec![json!(50)], Conjunction::Or)],
            }),
            Constraint::Group(ConstraintGroup {
                id: "g1".into(),
                conjunction: Conjunction::Or,
                constraint_group: vec![leaf(
                    "machine.os.distro",
                    Condition::Eq,
                    vec![json!("Ubuntu")],
                    Conjunction::Or,
                )],
            }),
        ];

        assert_eq!(
            hard_constraint_names(&constraints),
            vec![
                "machine.os.platform",
                "machine.possibleConnectionTo==google_de.latency",
                "machine.possibleConnectionTo==yahoo_de.latency",
                "machine.os.distro",
            ]
        );
    }

    #[test]
    fn test_dotted_values_flattened_in_names() {
        let constraints = vec![Constraint::Hard(HardConstraint {
            name: "machine.reachableBy".into(),
            condition: Condition::Eq,
            values: vec![json!("111.111.111.111")],
            conjunction: Conjunction::Or,
            hard_constraints: vec![leaf("latency", Condition::Lt, vec![json!(50)], Conjunction::Or)],
        })];

        assert_eq!(
            hard_constraint_names(&constraints),
            vec!["machine.reachableBy==111_111_111_111.latency"]
        );
    }

    #[test]
    fn test_execution_constraints_strict_greater() {
        let hops = vec![leaf("maxMachineHops", Condition::Eq, vec![json!(2)], Conjunction::Or)];

        let within = ExecutionFacts {
            machine_hops: Some(2.0),
            ..Default::default()
        };
        assert!(unsatisfied_execution_constraints(&hops, &within).is_empty());

        let exceeded = ExecutionFacts {
            machine_hops: Some(3.0),
            ..Default::default()
        };
        let unsatisfied = unsatisfied_execution_constraints(&hops, &exceeded);
        assert_eq!(unsatisfied.len(), 1);
        assert_eq!(unsatisfied[0].name, "maxMachineHops");
    }

    #[test]
    fn test_execution_constraints_ignore_missing_facts() {
        let time = vec![leaf("maxTimeGlobal", Condition::Eq, vec![json!(60000)], Conjunction::Or)];
        let facts = ExecutionFacts::default();
        assert!(unsatisfied_execution_constraints(&time, &facts).is_empty());

        let over = ExecutionFacts {
            time_global: Some(60001.0),
            ..Default::default()
        };
        assert_eq!(unsatisfied_execution_constraints(&time, &over).len(), 1);
    }

    #[test]
    fn test_execution_constraints_skip_machine_facts() {
        let constraints = vec![leaf(
            "machine.os.platform",
            Condition::Eq,
            vec![json!("linux")],
            Conjunction::Or,
        )];
        let facts = ExecutionFacts {
            time: Some(1e12),
            ..Default::default()
        };
        assert!(unsatisfied_execution_constraints(&constraints, &facts).is_empty());
    }

    #[test]
    fn test_input_tree_not_mutated_by_nested_evaluation() {
        let constraint = HardConstraint {
            name: "machine.possibleConnectionTo".into(),
            condition: Condition::Eq,
            values: vec![json!("google_de")],
            conjunction: Conjunction::Or,
            hard_constraints: vec![leaf("latency", Condition::Lt, vec![json!(50)], Conjunction::Or)],
        };
        let before = constraint.clone();

        let map: HashMap<String, Value> =
            attrs(&[("machine.possibleConnectionTo==google_de.latency", json!(49))]);
        let _ = evaluate(&constraint, &map);

        assert_eq!(constraint, before);
    }
}
