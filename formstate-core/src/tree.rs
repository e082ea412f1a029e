//! Path-addressed operations on the model tree.
//!
//! Only objects and arrays are traversed. Array segments must be canonical
//! indices (`"0"`, `"12"`, never `"01"`). Every operation checks the whole
//! path before it touches the tree, so a failure leaves the tree as it was.
//!
//! Writes are copy-on-write: each container on the way down is copied only
//! if another snapshot still shares it, and the copy is shallow. Subtrees
//! off the path stay shared.

use std::mem;
use std::sync::Arc;

use crate::error::{TreeAction, TreeError};
use crate::node::Node;
use crate::path::{self, parse_parent_scope};

/// Resolves `path`, failing when any segment is missing.
pub fn get<'a>(tree: &'a Node, path: &str) -> Result<&'a Node, TreeError> {
    try_get(tree, path).ok_or_else(|| TreeError::NotFound {
        path: path.to_owned(),
        model: tree.to_string(),
    })
}

/// Resolves `path`, returning `None` when any segment is missing.
#[must_use]
pub fn try_get<'a>(tree: &'a Node, path: &str) -> Option<&'a Node> {
    if path.is_empty() {
        return Some(tree);
    }
    path::segments(path).try_fold(tree, |node, key| node.get(key))
}

/// Replaces the node at an existing `path`.
pub fn assign(tree: &mut Node, path: &str, node: Node) -> Result<(), TreeError> {
    apply_at(tree, path, TreeAction::Update, node).map(|_| ())
}

/// Inserts `node` at a `path` whose last segment does not exist yet.
///
/// Arrays only grow at their end: the segment must equal the array length.
pub fn add(tree: &mut Node, path: &str, node: Node) -> Result<(), TreeError> {
    apply_at(tree, path, TreeAction::Add, node).map(|_| ())
}

/// Removes the node at `path` and returns it. Removing an array element
/// shifts later elements down by one.
pub fn delete(tree: &mut Node, path: &str) -> Result<Node, TreeError> {
    apply_at(tree, path, TreeAction::Delete, Node::Null)
}

fn apply_at(tree: &mut Node, path: &str, action: TreeAction, node: Node) -> Result<Node, TreeError> {
    let (parent, key) = parse_parent_scope(path);
    let applicable = try_get(tree, parent).is_some_and(|container| accepts(container, key, action));
    if !applicable {
        return Err(TreeError::Rejected {
            action,
            path: path.to_owned(),
            model: tree.to_string(),
        });
    }

    let mut container = tree;
    if !parent.is_empty() {
        for segment in path::segments(parent) {
            container = child_mut(container, segment).ok_or_else(|| TreeError::Rejected {
                action,
                path: path.to_owned(),
                model: String::new(),
            })?;
        }
    }
    Ok(apply_leaf(container, key, action, node))
}

fn accepts(container: &Node, key: &str, action: TreeAction) -> bool {
    match container {
        Node::Object(map) => match action {
            TreeAction::Update | TreeAction::Delete => map.contains_key(key),
            TreeAction::Add => !map.contains_key(key),
        },
        Node::Array(items) => parse_index(key).is_some_and(|index| match action {
            TreeAction::Update | TreeAction::Delete => index < items.len(),
            TreeAction::Add => index == items.len(),
        }),
        _ => false,
    }
}

/// Applies an action already checked by [`accepts`].
fn apply_leaf(container: &mut Node, key: &str, action: TreeAction, node: Node) -> Node {
    match container {
        Node::Object(map) => {
            let map = Arc::make_mut(map);
            match action {
                TreeAction::Update => map
                    .get_mut(key)
                    .map(|slot| mem::replace(slot, node))
                    .unwrap_or_default(),
                TreeAction::Add => {
                    map.insert(key.to_owned(), node);
                    Node::Null
                }
                TreeAction::Delete => map.remove(key).unwrap_or_default(),
            }
        }
        Node::Array(items) => {
            let items = Arc::make_mut(items);
            let index = parse_index(key).unwrap_or(items.len());
            match action {
                TreeAction::Update => items
                    .get_mut(index)
                    .map(|slot| mem::replace(slot, node))
                    .unwrap_or_default(),
                TreeAction::Add => {
                    items.push(node);
                    Node::Null
                }
                TreeAction::Delete if index < items.len() => items.remove(index),
                TreeAction::Delete => Node::Null,
            }
        }
        _ => Node::Null,
    }
}

fn child_mut<'a>(node: &'a mut Node, key: &str) -> Option<&'a mut Node> {
    match node {
        Node::Object(map) => Arc::make_mut(map).get_mut(key),
        Node::Array(items) => Arc::make_mut(items).get_mut(parse_index(key)?),
        _ => None,
    }
}

/// Parses a canonical array index.
#[must_use]
pub fn parse_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;

    fn node(value: Value) -> Node {
        Node::from(value)
    }

    #[test]
    fn test_get_and_try_get() {
        let model = node(json!({"a": [{"b": 1}], "c": null}));
        assert_eq!(get(&model, "a.0.b").unwrap(), &json!(1));
        assert_eq!(get(&model, "").unwrap(), &model);
        assert_eq!(get(&model, "c").unwrap(), &Value::Null);
        assert!(try_get(&model, "a.1").is_none());
        assert!(try_get(&model, "c.d").is_none());
        let err = get(&model, "a.01").unwrap_err();
        assert!(err.to_string().starts_with("Unable to get model key \"a.01\""));
    }

    #[test]
    fn test_assign_requires_existing_key() {
        let mut model = node(json!({"a": {"b": 1}}));
        assign(&mut model, "a.b", node(json!(2))).unwrap();
        assert_eq!(model, json!({"a": {"b": 2}}));
        let err = assign(&mut model, "a.c", node(json!(3))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to update model key \"a.c\" in model {\"a\":{\"b\":2}}."
        );
        assert_eq!(model, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_add_object_key_and_array_tail() {
        let mut model = node(json!({"list": [1]}));
        add(&mut model, "name", node(json!("x"))).unwrap();
        add(&mut model, "list.1", node(json!(2))).unwrap();
        assert_eq!(model, json!({"list": [1, 2], "name": "x"}));
        assert!(add(&mut model, "name", node(json!("y"))).is_err());
        assert!(add(&mut model, "list.5", node(json!(3))).is_err());
        assert!(add(&mut model, "missing.x", node(json!(3))).is_err());
    }

    #[test]
    fn test_delete_shifts_array() {
        let mut model = node(json!({"list": ["a", "b", "c"], "k": 1}));
        assert_eq!(delete(&mut model, "list.0").unwrap(), json!("a"));
        assert_eq!(delete(&mut model, "k").unwrap(), json!(1));
        assert_eq!(model, json!({"list": ["b", "c"]}));
        let err = delete(&mut model, "list.2").unwrap_err();
        assert!(err.to_string().starts_with("Unable to delete model key \"list.2\" from model"));
    }

    #[test]
    fn test_primitives_are_not_traversed() {
        let mut model = node(json!({"s": "text"}));
        assert!(try_get(&model, "s.length").is_none());
        assert!(add(&mut model, "s.x", node(json!(1))).is_err());
    }

    #[test]
    fn test_writes_copy_only_the_path() {
        let before = node(json!({"a": {"x": 1}, "b": {"big": [1, 2, 3]}}));
        let mut after = before.clone();
        assign(&mut after, "a.x", node(json!(2))).unwrap();

        assert_eq!(before, json!({"a": {"x": 1}, "b": {"big": [1, 2, 3]}}));
        assert!(!after.ptr_eq(&before));
        assert!(!after["a"].ptr_eq(&before["a"]));
        assert!(after["b"].ptr_eq(&before["b"]));
        assert!(after["b"]["big"].ptr_eq(&before["b"]["big"]));
    }

    #[test]
    fn test_failed_writes_leave_shared_tree_alone() {
        let before = node(json!({"a": {"x": 1}}));
        let mut after = before.clone();
        assert!(assign(&mut after, "a.y", node(json!(2))).is_err());
        assert!(after.ptr_eq(&before));
    }

    proptest! {
        #[test]
        fn delete_removes_exactly_one_element(
            items in proptest::collection::vec(any::<u8>(), 1..16),
            index in any::<prop::sample::Index>(),
        ) {
            let index = index.index(items.len());
            let mut model = node(json!({ "items": items, "other": {"kept": true} }));
            let other = model["other"].clone();

            let removed = delete(&mut model, &format!("items.{index}")).unwrap();
            let mut expected = items.clone();
            let gone = expected.remove(index);
            prop_assert_eq!(removed, json!(gone));
            prop_assert_eq!(&model["items"], &json!(expected));
            prop_assert!(model["other"].ptr_eq(&other));
        }
    }
}
