//! Inheritance resolution between named specs.
//!
//! Each spec is a JSON object with an `id` and an optional `parent`. A spec
//! resolves to the merge of its own fields over its resolved parent's
//! fields, according to a [`MergePolicy`]:
//! - fields in `inherit` are unioned by `id` (local entries win),
//! - fields in `local_only` are never taken from the parent,
//! - everything else is taken from the parent only when absent locally.
//!
//! Resolution is a work queue: a spec whose parent is not resolved yet goes
//! to the back of the queue. Unknown parents are rejected up front and a pass
//! over the queue without progress is reported as a cycle, so the loop always
//! terminates.

use crate::error::{FieldValidationError, Result, XpjsonError};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

pub type Spec = Map<String, Value>;

/// Resolved specs keyed by id, in input order.
pub type ResolvedSpecs = IndexMap<String, Spec>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePolicy {
    pub inherit: BTreeSet<String>,
    pub local_only: BTreeSet<String>,
}

impl MergePolicy {
    pub fn new<I, L>(inherit: I, local_only: L) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            inherit: inherit.into_iter().map(Into::into).collect(),
            local_only: local_only.into_iter().map(Into::into).collect(),
        }
    }

    /// Plain override semantics, used for named `ParamSpec`s.
    pub fn named_specs() -> Self {
        Self::new(Vec::<String>::new(), ["id"])
    }

    /// `params` is unioned by id; identity and abstractness stay local.
    pub fn command_specs() -> Self {
        Self::new(["params"], ["id", "name", "abstract"])
    }
}

pub fn resolve(specs: Vec<Spec>, policy: &MergePolicy) -> Result<ResolvedSpecs> {
    resolve_with_pool(specs, policy, &ResolvedSpecs::new())
}

/// Resolve `specs`, allowing parents to come from an already-resolved `pool`.
///
/// A parent id present in `specs` refers to that spec; only ids absent from
/// `specs` (or a spec naming its own id) are looked up in the pool. The pool
/// entries are not part of the output.
pub fn resolve_with_pool(
    specs: Vec<Spec>,
    policy: &MergePolicy,
    pool: &ResolvedSpecs,
) -> Result<ResolvedSpecs> {
    // Phase 1: ids must be present and unique.
    let mut order: Vec<String> = Vec::with_capacity(specs.len());
    let mut local_ids: HashSet<String> = HashSet::new();
    for spec in &specs {
        let id = spec_id(spec)?;
        if !local_ids.insert(id.to_string()) {
            return Err(XpjsonError::DuplicateId {
                collection: "specs".to_string(),
                id: id.to_string(),
            });
        }
        order.push(id.to_string());
    }

    // Phase 2: every parent must exist somewhere.
    for spec in &specs {
        let id = spec_id(spec)?;
        if let Some(parent) = spec_parent(spec)? {
            let local = parent != id && local_ids.contains(parent);
            if !local && !pool.contains_key(parent) {
                return Err(XpjsonError::UnknownParent {
                    id: id.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
    }

    // Phase 3: cooperative fixed-point iteration.
    let mut queue: VecDeque<(String, Spec)> = order.iter().cloned().zip(specs).collect();
    let mut resolved: HashMap<String, Spec> = HashMap::new();
    let mut stalled = 0usize;

    while let Some((id, spec)) = queue.pop_front() {
        let merged = match spec_parent(&spec)? {
            None => Some(spec.clone()),
            Some(parent) if parent != id && local_ids.contains(parent) => resolved
                .get(parent)
                .map(|p| merge(&spec, p, policy)),
            Some(parent) => pool.get(parent).map(|p| merge(&spec, p, policy)),
        };

        match merged {
            Some(merged) => {
                debug!(spec = %id, "resolved spec");
                resolved.insert(id, merged);
                stalled = 0;
            }
            None => {
                queue.push_back((id, spec));
                stalled += 1;
                if stalled > queue.len() {
                    return Err(XpjsonError::InheritanceCycle {
                        ids: cycle_members(&queue)?,
                    });
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|id| resolved.remove(&id).map(|spec| (id, spec)))
        .collect())
}

/// Ids on a parent cycle among the stalled specs, sorted. Specs that only
/// descend from a cycle are left out.
fn cycle_members(stalled: &VecDeque<(String, Spec)>) -> Result<Vec<String>> {
    let mut parents: HashMap<&str, &str> = HashMap::new();
    for (id, spec) in stalled {
        if let Some(parent) = spec_parent(spec)? {
            parents.insert(id.as_str(), parent);
        }
    }

    let mut ids: Vec<String> = stalled
        .iter()
        .map(|(id, _)| id.as_str())
        .filter(|&start| {
            let mut cur = parents.get(start).copied();
            for _ in 0..parents.len() {
                match cur {
                    Some(id) if id == start => return true,
                    Some(id) => cur = parents.get(id).copied(),
                    None => return false,
                }
            }
            false
        })
        .map(str::to_string)
        .collect();
    ids.sort();
    Ok(ids)
}

/// Merge `local` over its resolved `parent`. The result has no `parent` key.
pub fn merge(local: &Spec, parent: &Spec, policy: &MergePolicy) -> Spec {
    let mut out = Spec::new();

    for (key, value) in local {
        if key == "parent" {
            continue;
        }
        let merged = if policy.inherit.contains(key) {
            union_by_id(parent.get(key), value)
        } else {
            value.clone()
        };
        out.insert(key.clone(), merged);
    }

    for (key, value) in parent {
        if key == "parent" || policy.local_only.contains(key) || out.contains_key(key) {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }

    out
}

/// Union two lists of id-bearing records; local records replace parent
/// records with the same id in place, new local records are appended.
pub fn union_by_id(parent: Option<&Value>, local: &Value) -> Value {
    let (Some(parent_items), Some(local_items)) = (parent.and_then(Value::as_array), local.as_array())
    else {
        return local.clone();
    };

    let local_by_id: HashMap<&str, &Value> = local_items
        .iter()
        .filter_map(|item| item_id(item).map(|id| (id, item)))
        .collect();

    let mut used: HashSet<&str> = HashSet::new();
    let mut out: Vec<Value> = Vec::with_capacity(parent_items.len() + local_items.len());
    for item in parent_items {
        match item_id(item).and_then(|id| local_by_id.get(id).map(|l| (id, *l))) {
            Some((id, replacement)) => {
                used.insert(id);
                out.push(replacement.clone());
            }
            None => out.push(item.clone()),
        }
    }
    for item in local_items {
        match item_id(item) {
            Some(id) if used.contains(id) => {}
            _ => out.push(item.clone()),
        }
    }

    Value::Array(out)
}

fn item_id(item: &Value) -> Option<&str> {
    item.as_object()?.get("id")?.as_str()
}

fn spec_type(spec: &Spec) -> &str {
    spec.get("type").and_then(Value::as_str).unwrap_or("spec")
}

fn spec_id(spec: &Spec) -> Result<&str> {
    match spec.get("id") {
        Some(Value::String(id)) => Ok(id),
        Some(other) => Err(FieldValidationError::mismatch(
            spec_type(spec),
            None,
            "id",
            "string",
            other.clone(),
        )
        .into()),
        None => Err(FieldValidationError::missing(spec_type(spec), None, "id", "string").into()),
    }
}

fn spec_parent(spec: &Spec) -> Result<Option<&str>> {
    match spec.get("parent") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(p)) => Ok(Some(p)),
        Some(other) => Err(FieldValidationError::mismatch(
            spec_type(spec),
            spec.get("id").and_then(Value::as_str).map(str::to_string),
            "parent",
            "string",
            other.clone(),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn spec(v: Value) -> Spec {
        match v {
            Value::Object(m) => m,
            _ => panic!("spec must be an object"),
        }
    }

    fn param_ids(s: &Spec) -> Vec<&str> {
        s["params"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn params_union_by_id() {
        let specs = vec![
            spec(json!({"id": "A", "params": [{"id": "x"}]})),
            spec(json!({"id": "B", "parent": "A", "params": [{"id": "y"}]})),
        ];
        let out = resolve(specs, &MergePolicy::command_specs()).unwrap();
        assert_eq!(param_ids(&out["B"]), vec!["x", "y"]);
        assert!(!out["B"].contains_key("parent"));
    }

    #[test]
    fn local_param_wins_on_id_collision() {
        let specs = vec![
            spec(json!({"id": "A", "params": [{"id": "x", "default": 1}]})),
            spec(json!({"id": "B", "parent": "A", "params": [{"id": "x", "default": 5}, {"id": "y"}]})),
        ];
        let out = resolve(specs, &MergePolicy::command_specs()).unwrap();
        let params = out["B"]["params"].as_array().unwrap();
        assert_eq!(params[0], json!({"id": "x", "default": 5}));
        assert_eq!(param_ids(&out["B"]), vec!["x", "y"]);
    }

    #[test]
    fn order_independent() {
        let specs = vec![
            spec(json!({"id": "C", "parent": "B", "color": "#000000"})),
            spec(json!({"id": "B", "parent": "A"})),
            spec(json!({"id": "A", "blocking": false, "name": "Alpha"})),
        ];
        let out = resolve(specs, &MergePolicy::command_specs()).unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["C", "B", "A"]);
        assert_eq!(out["C"]["blocking"], json!(false));
        // name is local-only
        assert!(out["C"].get("name").is_none());
        assert_eq!(out["C"]["color"], json!("#000000"));
    }

    #[test]
    fn abstract_is_not_inherited() {
        let specs = vec![
            spec(json!({"id": "Base", "abstract": true, "blocking": false})),
            spec(json!({"id": "Drive", "parent": "Base"})),
        ];
        let out = resolve(specs, &MergePolicy::command_specs()).unwrap();
        assert!(out["Drive"].get("abstract").is_none());
        assert_eq!(out["Drive"]["blocking"], json!(false));
    }

    #[test]
    fn missing_parent_is_fatal() {
        let specs = vec![spec(json!({"id": "B", "parent": "DoesNotExist"}))];
        let err = resolve(specs, &MergePolicy::named_specs()).unwrap_err();
        assert!(matches!(
            err,
            XpjsonError::UnknownParent { ref id, ref parent } if id == "B" && parent == "DoesNotExist"
        ));
    }

    #[test]
    fn cycle_is_fatal() {
        let specs = vec![
            spec(json!({"id": "A", "parent": "B"})),
            spec(json!({"id": "B", "parent": "A"})),
            spec(json!({"id": "C"})),
        ];
        let err = resolve(specs, &MergePolicy::named_specs()).unwrap_err();
        match err {
            XpjsonError::InheritanceCycle { ids } => assert_eq!(ids, vec!["A", "B"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycle_error_names_only_the_loop() {
        let specs = vec![
            spec(json!({"id": "X", "parent": "A"})),
            spec(json!({"id": "A", "parent": "B"})),
            spec(json!({"id": "B", "parent": "A"})),
            spec(json!({"id": "Y", "parent": "X"})),
        ];
        let err = resolve(specs, &MergePolicy::named_specs()).unwrap_err();
        match err {
            XpjsonError::InheritanceCycle { ids } => assert_eq!(ids, vec!["A", "B"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let specs = vec![spec(json!({"id": "A"})), spec(json!({"id": "A"}))];
        assert!(matches!(
            resolve(specs, &MergePolicy::named_specs()),
            Err(XpjsonError::DuplicateId { .. })
        ));
    }

    #[test]
    fn pool_parents_and_self_reference() {
        let pool = resolve(
            vec![spec(json!({"id": "duration", "valueType": "number", "minimum": 0}))],
            &MergePolicy::named_specs(),
        )
        .unwrap();
        let params = vec![
            spec(json!({"id": "duration", "parent": "duration", "default": 60})),
            spec(json!({"id": "extra", "parent": "duration"})),
        ];
        let out = resolve_with_pool(params, &MergePolicy::named_specs(), &pool).unwrap();
        assert_eq!(out["duration"]["valueType"], json!("number"));
        assert_eq!(out["duration"]["default"], json!(60));
        // "extra" sees the local override, not the pool entry.
        assert_eq!(out["extra"]["default"], json!(60));
        assert_eq!(out["extra"]["id"], json!("extra"));
    }

    #[test]
    fn non_string_parent_is_a_field_error() {
        let specs = vec![spec(json!({"id": "A", "parent": 7}))];
        let err = resolve(specs, &MergePolicy::named_specs()).unwrap_err();
        assert_eq!(err.as_field_error().unwrap().field, "parent");
    }
}
