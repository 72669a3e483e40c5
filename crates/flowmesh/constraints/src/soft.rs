//! Soft-constraint scoring and ranking.
//!
//! Every candidate's reported values are normalized against the extreme
//! value observed across all candidates, weighted, summed, and the list is
//! stable-sorted descending by total score. `min` marks "lower is better":
//! the minimum observed value is the normalization reference point, not a
//! selection rule.

use flowmesh_types::{Goal, Machine, ScoredMachine, SoftConstraint};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

/// Rank candidates by soft-constraint score, best first.
///
/// Returns plain machine descriptors with the score data stripped. With an
/// empty constraint list the input order is preserved. A candidate missing a
/// value for some constraint (or reporting a non-numeric one) gets a zero
/// contribution for that constraint; it is demoted relative to candidates
/// that did report, never dropped and never an error.
pub fn rank(soft_constraints: &[SoftConstraint], candidates: Vec<ScoredMachine>) -> Vec<Machine> {
    if soft_constraints.is_empty() || candidates.len() < 2 {
        return candidates.into_iter().map(|c| c.machine).collect();
    }

    let mut totals = vec![0.0f64; candidates.len()];

    for constraint in soft_constraints {
        let values: Vec<Option<f64>> = candidates
            .iter()
            .map(|c| c.soft_constraint_values.get(&constraint.name).and_then(numeric))
            .collect();

        let extreme = match constraint.condition {
            Goal::Max => values.iter().flatten().cloned().fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }),
            Goal::Min => values.iter().flatten().cloned().fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            }),
        };
        let Some(extreme) = extreme else {
            debug!(constraint = %constraint.name, "no candidate reported a usable value");
            continue;
        };

        for (total, value) in totals.iter_mut().zip(&values) {
            let Some(value) = value else { continue };
            let contribution = match constraint.condition {
                Goal::Max => value / extreme,
                Goal::Min => extreme / value,
            } * constraint.weight;

            if contribution.is_finite() {
                *total += contribution;
            }
        }
    }

    let mut indexed: Vec<(usize, ScoredMachine)> = candidates.into_iter().enumerate().collect();
    // Stable sort: ties keep original relative order.
    indexed.sort_by(|(a, _), (b, _)| {
        totals[*b].partial_cmp(&totals[*a]).unwrap_or(Ordering::Equal)
    });

    indexed.into_iter().map(|(_, c)| c.machine).collect()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn candidate(id: &str, values: &[(&str, Value)]) -> ScoredMachine {
        let mut machine = Machine::from_address("10.0.0.1", 33029);
        machine.id = Some(id.into());
        ScoredMachine::new(
            machine,
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn ids(machines: &[Machine]) -> Vec<&str> {
        machines
            .iter()
            .map(|m| m.id.as_ref().unwrap().as_str())
            .collect()
    }

    #[test]
    fn test_max_ranking_orders_descending() {
        let ranked = rank(
            &[SoftConstraint::new("machine.mem.free", Goal::Max)],
            vec![
                candidate("m1", &[("machine.mem.free", json!(4000))]),
                candidate("m2", &[("machine.mem.free", json!(6000))]),
                candidate("m3", &[("machine.mem.free", json!(12000))]),
            ],
        );
        assert_eq!(ids(&ranked), vec!["m3", "m2", "m1"]);
    }

    #[test]
    fn test_min_ranking_prefers_lower() {
        let ranked = rank(
            &[SoftConstraint::new("machine.cpu.currentLoad", Goal::Min)],
            vec![
                candidate("m1", &[("machine.cpu.currentLoad", json!(80))]),
                candidate("m2", &[("machine.cpu.currentLoad", json!(20))]),
                candidate("m3", &[("machine.cpu.currentLoad", json!(40))]),
            ],
        );
        assert_eq!(ids(&ranked), vec!["m2", "m3", "m1"]);
    }

    #[test]
    fn test_weight_shifts_the_balance() {
        let constraints = vec![
            SoftConstraint::new("machine.mem.free", Goal::Max),
            SoftConstraint::new("machine.cpu.currentLoad", Goal::Min).with_weight(3.0),
        ];
        let ranked = rank(
            &constraints,
            vec![
                candidate(
                    "big-but-busy",
                    &[
                        ("machine.mem.free", json!(16000)),
                        ("machine.cpu.currentLoad", json!(90)),
                    ],
                ),
                candidate(
                    "small-but-idle",
                    &[
                        ("machine.mem.free", json!(8000)),
                        ("machine.cpu.currentLoad", json!(10)),
                    ],
                ),
            ],
        );
        assert_eq!(ids(&ranked), vec!["small-but-idle", "big-but-busy"]);
    }

    #[test]
    fn test_empty_constraints_preserve_order() {
        let ranked = rank(
            &[],
            vec![
                candidate("m1", &[]),
                candidate("m2", &[]),
                candidate("m3", &[]),
            ],
        );
        assert_eq!(ids(&ranked), vec!["m1", "m2", "m3"]);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_missing_value_contributes_zero() {
        let ranked = rank(
            &[SoftConstraint::new("machine.mem.free", Goal::Max)],
            vec![
                candidate("silent", &[]),
                candidate("m2", &[("machine.mem.free", json!(6000))]),
            ],
        );
        // The silent candidate is demoted but still present.
        assert_eq!(ids(&ranked), vec!["m2", "silent"]);
    }

    #[test]
    fn test_non_numeric_value_is_ignored() {
        let ranked = rank(
            &[SoftConstraint::new("machine.mem.free", Goal::Max)],
            vec![
                candidate("bogus", &[("machine.mem.free", json!("a lot"))]),
                candidate("m2", &[("machine.mem.free", json!("6000"))]),
            ],
        );
        assert_eq!(ids(&ranked), vec!["m2", "bogus"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let ranked = rank(
            &[SoftConstraint::new("machine.mem.free", Goal::Max)],
            vec![
                candidate("first", &[("machine.mem.free", json!(4000))]),
                candidate("second", &[("machine.mem.free", json!(4000))]),
                candidate("third", &[("machine.mem.free", json!(4000))]),
            ],
        );
        assert_eq!(ids(&ranked), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_zero_extreme_does_not_blow_up() {
        let ranked = rank(
            &[SoftConstraint::new("machine.cpu.currentLoad", Goal::Min)],
            vec![
                candidate("idle", &[("machine.cpu.currentLoad", json!(0))]),
                candidate("busy", &[("machine.cpu.currentLoad", json!(50))]),
            ],
        );
        // 0/0 and 0/50 are not finite contributions for min-normalization;
        // neither candidate crashes the ranking.
        assert_eq!(ranked.len(), 2);
    }
}
