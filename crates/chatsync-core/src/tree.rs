//! Path operations over a JSON tree
//!
//! Backends keep all data in one `serde_json::Value`. Writing `null` removes a
//! node, and objects left empty by a mutation are pruned, so an empty subtree
//! and a missing one are indistinguishable.

use crate::path::Path;
use crate::RawValue;
use serde_json::Map;

/// Look up the subtree at `path`
pub fn get<'a>(root: &'a RawValue, path: &Path) -> Option<&'a RawValue> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Replace the subtree at `path`, creating intermediate objects as needed
pub fn set(root: &mut RawValue, path: &Path, value: RawValue) {
    let value = prune_value(value);
    if value.is_null() {
        remove(root, path);
        return;
    }

    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        current = object_mut(current)
            .entry(segment.to_string())
            .or_insert(RawValue::Null);
    }
    object_mut(current).insert(last.to_string(), value);
}

/// Merge `fields` under `path`; each field name is a path relative to `path`
pub fn update(root: &mut RawValue, path: &Path, fields: Map<String, RawValue>) -> crate::Result<()> {
    // Validate everything first so a bad field leaves the tree untouched
    let mut targets = Vec::with_capacity(fields.len());
    for (field, value) in fields {
        let relative = Path::new(&field)?;
        if relative.is_root() {
            return Err(crate::Error::InvalidPath("empty update field".into()));
        }
        targets.push((path.join(&relative), value));
    }

    for (target, value) in targets {
        set(root, &target, value);
    }
    Ok(())
}

/// Delete the subtree at `path`. Returns true if something was removed.
pub fn remove(root: &mut RawValue, path: &Path) -> bool {
    let segments: Vec<&str> = path.segments().collect();
    let removed = match segments.split_last() {
        None => {
            let existed = !root.is_null();
            *root = RawValue::Null;
            existed
        }
        Some((last, parents)) => remove_at(root, parents, last),
    };

    if is_empty_object(root) {
        *root = RawValue::Null;
    }
    removed
}

/// Count leaf values in the tree
pub fn leaf_count(root: &RawValue) -> usize {
    match root {
        RawValue::Null => 0,
        RawValue::Object(map) => map.values().map(leaf_count).sum(),
        _ => 1,
    }
}

fn remove_at(node: &mut RawValue, parents: &[&str], last: &str) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };

    match parents.split_first() {
        None => map.remove(last).is_some(),
        Some((head, rest)) => {
            let Some(child) = map.get_mut(*head) else {
                return false;
            };
            let removed = remove_at(child, rest, last);
            if is_empty_object(child) || child.is_null() {
                map.remove(*head);
            }
            removed
        }
    }
}

fn object_mut(node: &mut RawValue) -> &mut Map<String, RawValue> {
    if !node.is_object() {
        *node = RawValue::Object(Map::new());
    }
    match node {
        RawValue::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

fn is_empty_object(value: &RawValue) -> bool {
    value.as_object().is_some_and(|m| m.is_empty())
}

/// Strip nulls and empty objects from an incoming value
fn prune_value(value: RawValue) -> RawValue {
    match value {
        RawValue::Object(map) => {
            let pruned: Map<String, RawValue> = map
                .into_iter()
                .map(|(k, v)| (k, prune_value(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                RawValue::Null
            } else {
                RawValue::Object(pruned)
            }
        }
        other => other,
    }
}
