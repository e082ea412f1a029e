//! Adding and removing model keys after initialization.
//!
//! Surviving paths keep their ids, statuses and schemas. Removing an array
//! element renumbers the keys of later siblings so their ids follow the
//! elements they belong to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::form::Form;
use crate::formstate::Formstate;
use crate::lookup::Lookup;
use crate::node::Node;
use crate::path::{add_scope, in_scope, parse_parent_scope, parse_root_scope, within};
use crate::schema::{FormValidationSchema, NormalizedSchema};
use crate::tree::{self, parse_index};

impl Formstate {
    /// Adds `value` at `model_key`, which must name exactly one new key
    /// under an existing container (for arrays: the next index).
    ///
    /// `schema` is relative to the new key. The parent scope and its
    /// ancestors are cleared and marked changed.
    pub fn add_model_key(
        &self,
        model_key: &str,
        value: Value,
        schema: &FormValidationSchema,
    ) -> Result<Self> {
        let root_model_key = self.to_root_model_key(model_key)?;
        let node = Node::from(value);
        let mut next = self.clone();
        tree::add(&mut next.model, &root_model_key, node.clone())?;

        let mut normalized = NormalizedSchema::default();
        normalized.extend(schema, &root_model_key)?;
        Arc::make_mut(&mut next.lookup).build(&root_model_key, &node, &mut normalized)?;
        next.bake_schemas(&normalized)?;

        next.set_container_scopes_changed(&root_model_key)?;
        tracing::trace!(root_model_key, "model key added");
        Ok(next)
    }

    /// Removes `model_key` and everything below it.
    pub fn delete_model_key(&self, model_key: &str) -> Result<Self> {
        let root_model_key = self.to_root_model_key(model_key)?;
        let mut next = self.clone();
        tree::delete(&mut next.model, &root_model_key)?;

        let (parent, deleted) = parse_parent_scope(&root_model_key);
        let deleted_index = tree::try_get(&self.model, parent)
            .filter(|container| container.is_array())
            .and_then(|_| parse_index(deleted));

        let mut lookup = Lookup::default();
        let mut statuses = BTreeMap::new();
        let mut schemas = BTreeMap::new();
        for (id, key) in self.lookup.entries() {
            if within(key, &root_model_key) {
                continue;
            }
            let shifted = deleted_index.and_then(|index| shift_sibling(key, parent, index));
            lookup.insert(id, shifted.unwrap_or_else(|| key.to_owned()), self.lookup.is_scope(id));
            if let Some(status) = self.statuses.get(&id) {
                statuses.insert(id, status.clone());
            }
            if let Some(schema) = self.validation_schemas.get(&id) {
                schemas.insert(id, schema.clone());
            }
        }
        next.lookup = Arc::new(lookup);
        next.statuses = Arc::new(statuses);
        next.validation_schemas = Arc::new(schemas);

        next.set_container_scopes_changed(&root_model_key)?;
        tracing::trace!(root_model_key, "model key deleted");
        Ok(next)
    }

    /// Removes `model_key`, then syncly validates its parent scope.
    pub fn delete_model_key_and_validate_parent_scope(
        &self,
        model_key: &str,
        form: &Form,
    ) -> Result<Self> {
        let root_model_key = self.to_root_model_key(model_key)?;
        let (parent, _) = parse_parent_scope(&root_model_key);
        let mut formstate = self.nested(None).delete_model_key(&root_model_key)?;
        let parent_id = formstate.get_id(parent)?;
        formstate = formstate.syncly_validate_id(parent_id, form)?;
        formstate.nested_scope_id = self.nested_scope_id;
        Ok(formstate)
    }

    /// Clears every scope enclosing the parent of `root_model_key` and marks
    /// it changed.
    fn set_container_scopes_changed(&mut self, root_model_key: &str) -> Result<()> {
        let (parent, _) = parse_parent_scope(root_model_key);
        let scope_ids: Vec<_> = self
            .lookup
            .scope_ids()
            .filter(|scope_id| {
                self.lookup
                    .root_model_key(*scope_id)
                    .is_some_and(|scope_key| in_scope(parent, scope_key))
            })
            .collect();
        for scope_id in scope_ids {
            self.clear_status_by_id(scope_id);
            self.status_mut(scope_id).touched.changed = true;
        }
        Ok(())
    }
}

/// New key for `key` after element `index` of the array at `parent` was
/// removed, or `None` when `key` does not move.
fn shift_sibling(key: &str, parent: &str, index: usize) -> Option<String> {
    let rest = if parent.is_empty() {
        key
    } else {
        key.strip_prefix(parent)?.strip_prefix('.')?
    };
    let (position, remainder) = parse_root_scope(rest);
    let position = parse_index(position)?;
    if position <= index {
        return None;
    }
    let shifted = add_scope(&(position - 1).to_string(), remainder.unwrap_or_default());
    Some(add_scope(parent, &shifted))
}
