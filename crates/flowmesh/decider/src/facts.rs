//! Local machine-fact resolution.
//!
//! Bridges the dotted attribute names used by constraints and the
//! category-keyed nested objects returned by machine introspection. Only the
//! categories a constraint list actually references are fetched.

use flowmesh_constraints::hard;
use flowmesh_types::{AttributeMap, Constraint, MachineInformation};
use serde_json::Value;
use tracing::debug;

/// Top-level introspection categories referenced by a set of attribute names.
///
/// `machine.os.platform` references category `os`; names without the
/// `machine.` prefix reference their own first segment.
pub fn categories_for(names: &[String]) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();
    for name in names {
        let path = name.strip_prefix("machine.").unwrap_or(name);
        if let Some(category) = path.split('.').next() {
            if !category.is_empty() && !categories.iter().any(|c| c == category) {
                categories.push(category.to_string());
            }
        }
    }
    categories
}

/// Resolve each requested dotted name against introspection output into a
/// flat attribute map. Unresolvable names are simply absent.
pub fn resolve_attributes(names: &[String], info: &AttributeMap) -> AttributeMap {
    let mut attributes = AttributeMap::new();
    for name in names {
        let path = name.strip_prefix("machine.").unwrap_or(name);
        let segments: Vec<&str> = path.split('.').collect();
        let Some((category, rest)) = segments.split_first() else {
            continue;
        };
        if let Some(value) = info.get(*category).and_then(|v| resolve_path(v, rest)) {
            attributes.insert(name.clone(), value);
        }
    }
    attributes
}

/// Whether the local machine satisfies a full hard-constraint list.
///
/// Fetches only the referenced categories, resolves the exact attribute paths
/// the evaluator will look up (including the composite names of nested
/// constraints), then runs the tree evaluator.
pub async fn machine_satisfies_all_hard_constraints(
    introspection: &dyn MachineInformation,
    constraints: &[Constraint],
) -> bool {
    if constraints.is_empty() {
        return true;
    }

    let names = hard::hard_constraint_names(constraints);
    let categories = categories_for(&names);
    let info = introspection.machine_information(&categories).await;
    let attributes = resolve_attributes(&names, &info);

    let satisfied = hard::evaluate_all(constraints, &attributes);
    debug!(satisfied, resolved = attributes.len(), "local hard-constraint evaluation");
    satisfied
}

/// Local values for a set of attribute names, e.g. soft-constraint inputs.
pub async fn local_attribute_values(
    introspection: &dyn MachineInformation,
    names: &[String],
) -> AttributeMap {
    if names.is_empty() {
        return AttributeMap::new();
    }
    let categories = categories_for(names);
    let info = introspection.machine_information(&categories).await;
    resolve_attributes(names, &info)
}

/// Walk the remaining path segments into a nested value.
///
/// An array at any level fans out over its elements and collects the
/// resolved values, so `network[*].ip4` style lookups yield a flat list.
fn resolve_path(value: &Value, segments: &[&str]) -> Option<Value> {
    if let Value::Array(items) = value {
        let resolved: Vec<Value> = items
            .iter()
            .filter_map(|item| resolve_path(item, segments))
            .flat_map(|v| match v {
                Value::Array(inner) => inner,
                other => vec![other],
            })
            .collect();
        return if resolved.is_empty() {
            None
        } else {
            Some(Value::Array(resolved))
        };
    }

    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(map) => map.get(*head).and_then(|inner| resolve_path(inner, rest)),
        _ => None,
    }
}
