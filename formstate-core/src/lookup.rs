//! Stable identities for model paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use crate::error::SchemaError;
use crate::node::Node;
use crate::path::add_scope;
use crate::schema::NormalizedSchema;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one field or scope.
///
/// Ids are minted once per path when the path enters the model and survive
/// deletions of other paths, including array renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(u64);

impl Id {
    pub(crate) fn mint() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value of the id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bidirectional map between ids and root model keys, plus the set of ids
/// that are scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    root_model_keys_by_id: BTreeMap<Id, String>,
    ids_by_root_model_key: HashMap<String, Id>,
    scopes: BTreeSet<Id>,
}

impl Lookup {
    /// Root model key registered for `id`.
    #[must_use]
    pub fn root_model_key(&self, id: Id) -> Option<&str> {
        self.root_model_keys_by_id.get(&id).map(String::as_str)
    }

    /// Id registered for a root model key.
    #[must_use]
    pub fn id(&self, root_model_key: &str) -> Option<Id> {
        self.ids_by_root_model_key.get(root_model_key).copied()
    }

    /// Whether `id` is a scope. Unknown ids are not scopes.
    #[must_use]
    pub fn is_scope(&self, id: Id) -> bool {
        self.scopes.contains(&id)
    }

    /// All `(id, root model key)` pairs in minting order.
    pub fn entries(&self) -> impl Iterator<Item = (Id, &str)> {
        self.root_model_keys_by_id
            .iter()
            .map(|(id, key)| (*id, key.as_str()))
    }

    /// All scope ids.
    pub fn scope_ids(&self) -> impl Iterator<Item = Id> {
        self.scopes.iter().copied()
    }

    /// Number of registered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.root_model_keys_by_id.len()
    }

    /// Whether no path is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root_model_keys_by_id.is_empty()
    }

    pub(crate) fn insert(&mut self, id: Id, root_model_key: String, is_scope: bool) {
        self.ids_by_root_model_key.insert(root_model_key.clone(), id);
        self.root_model_keys_by_id.insert(id, root_model_key);
        if is_scope {
            self.scopes.insert(id);
        }
    }

    /// Mints ids for `value` and everything below it.
    ///
    /// A node is a scope when it is a container and the schema does not
    /// declare it a field. `schema_for_each` of an array scope is expanded
    /// into `schema` for every element present now.
    pub(crate) fn build(
        &mut self,
        root_model_key: &str,
        value: &Node,
        schema: &mut NormalizedSchema,
    ) -> Result<(), SchemaError> {
        let declared_field = schema.is_field(root_model_key);
        let is_scope = value.is_container() && !declared_field;
        self.insert(Id::mint(), root_model_key.to_owned(), is_scope);

        if root_model_key.is_empty() && declared_field {
            return Err(SchemaError::RootAsField);
        }
        if schema.is_scope(root_model_key) && !value.is_container() {
            return Err(SchemaError::ScopeNotContainer(root_model_key.to_owned()));
        }
        if !is_scope {
            return Ok(());
        }

        match value {
            Node::Object(map) => {
                for (key, child) in map.iter() {
                    self.build(&add_scope(root_model_key, key), child, schema)?;
                }
            }
            Node::Array(items) => {
                if let Some(for_each) = schema.for_each(root_model_key) {
                    for index in 0..items.len() {
                        let item_key = add_scope(root_model_key, &index.to_string());
                        schema.extend(&for_each, &item_key)?;
                    }
                }
                for (index, child) in items.iter().enumerate() {
                    self.build(&add_scope(root_model_key, &index.to_string()), child, schema)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
