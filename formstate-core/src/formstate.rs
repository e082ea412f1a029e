//! The formstate snapshot: construction, accessors and key resolution.
//!
//! Setters live next to the state they touch (`status`, `form_status`,
//! `mutation`, `validation`); this module owns the snapshot itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{FormstateError, Result};
use crate::form::Form;
use crate::form_status::FormStatus;
use crate::lookup::{Id, Lookup};
use crate::node::Node;
use crate::path::{add_scope, normalize};
use crate::schema::{FormValidationSchema, NormalizedSchema, ValidationSchema};
use crate::status::Status;

/// Immutable snapshot of a form: the model, the identity of every path,
/// per-path statuses, baked validation schemas, and form-wide status.
///
/// Every operation returns a new `Formstate` and leaves its receiver
/// untouched. Unchanged parts are shared between snapshots, so cloning is
/// cheap.
///
/// A formstate may be *framed* to a nested scope (see
/// [`Formstate::nested`]): path arguments are then relative to that scope.
///
/// # Example
///
/// ```rust
/// use formstate_core::{FieldRules, FormValidationSchema, Formstate};
/// use serde_json::json;
///
/// let schema = FormValidationSchema::new().field("name", FieldRules::new().required());
/// let formstate = Formstate::initialize(json!({"name": ""}), &schema)?;
/// let formstate = formstate.set_value_and_clear_status("name", json!("Ada"))?;
/// assert_eq!(formstate.get_value("name")?, &json!("Ada"));
/// # Ok::<(), formstate_core::FormstateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Formstate {
    pub(crate) model: Node,
    pub(crate) initial_model: Node,
    pub(crate) lookup: Arc<Lookup>,
    pub(crate) statuses: Arc<BTreeMap<Id, Arc<Status>>>,
    pub(crate) validation_schemas: Arc<BTreeMap<Id, ValidationSchema>>,
    pub(crate) form_status: FormStatus,
    pub(crate) nested_scope_id: Option<Id>,
}

impl Formstate {
    /// Builds a formstate for `initial_model`, which must be an object or an
    /// array, baking in `schema`.
    pub fn initialize(initial_model: Value, schema: &FormValidationSchema) -> Result<Self> {
        let initial_model = Node::from(initial_model);
        if !initial_model.is_container() {
            return Err(FormstateError::ModelNotContainer);
        }
        let mut normalized = NormalizedSchema::default();
        normalized.extend(schema, "")?;
        let mut lookup = Lookup::default();
        lookup.build("", &initial_model, &mut normalized)?;

        let mut formstate = Self {
            model: initial_model.clone(),
            initial_model,
            lookup: Arc::new(lookup),
            statuses: Arc::default(),
            validation_schemas: Arc::default(),
            form_status: FormStatus::default(),
            nested_scope_id: None,
        };
        formstate.bake_schemas(&normalized)?;
        tracing::trace!(paths = formstate.lookup.len(), "formstate initialized");
        Ok(formstate)
    }

    /// Builds a formstate without validation rules.
    pub fn new(initial_model: Value) -> Result<Self> {
        Self::initialize(initial_model, &FormValidationSchema::new())
    }

    /// Builds a formstate from any serializable model.
    pub fn from_serialize<T: Serialize>(model: &T, schema: &FormValidationSchema) -> Result<Self> {
        Self::initialize(serde_json::to_value(model)?, schema)
    }

    pub(crate) fn bake_schemas(&mut self, normalized: &NormalizedSchema) -> Result<()> {
        let compiled = normalized.compile(&self.lookup)?;
        if compiled.is_empty() {
            return Ok(());
        }
        let schemas = Arc::make_mut(&mut self.validation_schemas);
        for (id, schema) in compiled {
            schemas.insert(id, schema);
        }
        Ok(())
    }

    /// The current model.
    #[must_use]
    pub fn model(&self) -> &Node {
        &self.model
    }

    /// The model as it was at initialization.
    #[must_use]
    pub fn initial_model(&self) -> &Node {
        &self.initial_model
    }

    /// Deserializes the current model.
    pub fn model_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(self.model.to_value())?)
    }

    #[must_use]
    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Stored statuses. Paths without an entry have the default status.
    #[must_use]
    pub fn statuses(&self) -> &BTreeMap<Id, Arc<Status>> {
        &self.statuses
    }

    /// Schemas baked into this formstate.
    #[must_use]
    pub fn validation_schemas(&self) -> &BTreeMap<Id, ValidationSchema> {
        &self.validation_schemas
    }

    #[must_use]
    pub fn form_status(&self) -> &FormStatus {
        &self.form_status
    }

    /// The scope this view is framed to, if any.
    #[must_use]
    pub fn nested_scope_id(&self) -> Option<Id> {
        self.nested_scope_id
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.nested_scope_id.is_some()
    }

    /// Same formstate viewed from `scope_id` (`None` for the root).
    #[must_use]
    pub fn nested(&self, scope_id: Option<Id>) -> Self {
        let mut next = self.clone();
        next.nested_scope_id = scope_id;
        next
    }

    /// Id of the root path.
    #[must_use]
    pub fn root_id(&self) -> Option<Id> {
        self.lookup.id("")
    }

    /// Whether `other` descends from the same initialization as `self`.
    #[must_use]
    pub fn is_same_form(&self, other: &Self) -> bool {
        self.root_id() == other.root_id()
    }

    /// Resolves a (possibly relative, possibly bracketed) model key to a
    /// root model key.
    pub fn to_root_model_key(&self, model_key: &str) -> Result<String> {
        let nested_scope_key = match self.nested_scope_id {
            Some(scope_id) => self.get_root_model_key(scope_id)?,
            None => "",
        };
        Ok(add_scope(nested_scope_key, &normalize(model_key)))
    }

    pub fn get_id(&self, model_key: &str) -> Result<Id> {
        let root_model_key = self.to_root_model_key(model_key)?;
        self.lookup
            .id(&root_model_key)
            .ok_or(FormstateError::UnknownModelKey(root_model_key))
    }

    pub fn get_root_model_key(&self, id: Id) -> Result<&str> {
        self.lookup
            .root_model_key(id)
            .ok_or(FormstateError::UnknownId(id))
    }

    /// Model key of `id` relative to the view frame.
    pub fn get_model_key(&self, id: Id) -> Result<String> {
        let root_model_key = self.get_root_model_key(id)?;
        let Some(scope_id) = self.nested_scope_id else {
            return Ok(root_model_key.to_owned());
        };
        let nested_scope_key = self.get_root_model_key(scope_id)?;
        if nested_scope_key.is_empty() {
            return Ok(root_model_key.to_owned());
        }
        Ok(root_model_key
            .get(nested_scope_key.len() + 1..)
            .unwrap_or_default()
            .to_owned())
    }

    #[must_use]
    pub fn is_scope(&self, id: Id) -> bool {
        self.lookup.is_scope(id)
    }

    /// Effective schema for `id`: the baked one, else one registered on
    /// `form`.
    #[must_use]
    pub fn validation_schema(&self, id: Id, form: Option<&Form>) -> Option<ValidationSchema> {
        self.validation_schemas
            .get(&id)
            .cloned()
            .or_else(|| form.and_then(|form| form.schemas().get(id)))
    }

    #[must_use]
    pub fn is_required(&self, id: Id, form: Option<&Form>) -> bool {
        self.validation_schema(id, form)
            .is_some_and(|schema| schema.is_required())
    }

    pub(crate) fn value_by_id(&self, id: Id) -> Result<&Node> {
        let root_model_key = self.get_root_model_key(id)?;
        Ok(crate::tree::get(&self.model, root_model_key)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::schema::{FieldRules, ScopeRules};

    #[test]
    fn test_initialize_requires_container() {
        assert!(matches!(
            Formstate::new(json!("text")),
            Err(FormstateError::ModelNotContainer)
        ));
        assert!(Formstate::new(json!([])).is_ok());
    }

    #[test]
    fn test_schema_keys_must_exist() {
        let schema = FormValidationSchema::new().field("missing", FieldRules::new().required());
        let err = Formstate::initialize(json!({"name": ""}), &schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The model key \"missing\" from the validation schema is not in the model."
        );
    }

    #[test]
    fn test_schemas_without_rules_are_not_stored() {
        let schema = FormValidationSchema::new()
            .field("a", FieldRules::new())
            .field("b", FieldRules::new().required());
        let fs = Formstate::initialize(json!({"a": 1, "b": 2}), &schema).unwrap();
        assert_eq!(fs.validation_schemas().len(), 1);
        assert!(fs.is_required(fs.get_id("b").unwrap(), None));
        assert!(!fs.is_required(fs.get_id("a").unwrap(), None));
    }

    #[test]
    fn test_nested_schemas_record_their_scope() {
        let contact = FormValidationSchema::new().field("email", FieldRules::new().required());
        let schema =
            FormValidationSchema::new().scope("contacts", ScopeRules::new().schema_for_each(contact));
        let model = json!({"contacts": [{"email": ""}, {"email": ""}]});
        let fs = Formstate::initialize(model, &schema).unwrap();
        let email = fs.get_id("contacts[1][email]").unwrap();
        let item = fs.get_id("contacts.1").unwrap();
        let schema = fs.validation_schema(email, None).unwrap();
        assert_eq!(schema.nested_scope_id(), Some(item));
        assert_eq!(schema.required_message(), Some("Email is required."));
    }

    #[test]
    fn test_framed_keys() {
        let fs = Formstate::new(json!({"address": {"city": "Oslo"}})).unwrap();
        let scope = fs.get_id("address").unwrap();
        let city = fs.get_id("address.city").unwrap();
        let nested = fs.nested(Some(scope));
        assert_eq!(nested.get_id("city").unwrap(), city);
        assert_eq!(nested.get_model_key(city).unwrap(), "city");
        assert_eq!(nested.get_root_model_key(city).unwrap(), "address.city");
        assert_eq!(nested.get_value("city").unwrap(), &json!("Oslo"));
        assert!(nested.get_id("address").is_err());
        assert!(fs.is_same_form(&nested));
    }

    #[test]
    fn test_typed_models() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Signup {
            email: String,
            tags: Vec<String>,
        }
        let signup = Signup {
            email: "a@b.c".into(),
            tags: vec!["x".into()],
        };
        let fs = Formstate::from_serialize(&signup, &FormValidationSchema::new()).unwrap();
        assert!(fs.get_id("tags.0").is_ok());
        assert_eq!(fs.model_as::<Signup>().unwrap(), signup);
        assert_eq!(fs.get_initial_value("email").unwrap().unwrap(), &json!("a@b.c"));
    }
}
