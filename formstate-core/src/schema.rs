//! Validation schemas.
//!
//! A [`FormValidationSchema`] is the declarative, nested description a caller
//! hands to [`Formstate::initialize`] or [`Formstate::add_model_key`]. It is
//! normalized into a flat map of root model keys and compiled into one
//! [`ValidationSchema`] per id. Rules can also be registered on a [`Form`]
//! after the fact; those live in the form's [`SchemaRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::form::Form;
use crate::formstate::Formstate;
use crate::lookup::Id;
use crate::node::Node;
use crate::path::{add_scope, field_name, humanize_camel_case, normalize};
use crate::validation::{AsyncValidation, Validation};

/// Synchronous validator: `(value, formstate, form, id)`.
///
/// The formstate and form are framed to the scope the rule was declared in.
pub type ValidateFn =
    Arc<dyn Fn(&Node, &Formstate, &Form, Id) -> Result<Validation> + Send + Sync>;

/// Asynchronous validator. It starts the work and returns either a pending
/// result carrying the future, or an updated formstate.
pub type ValidateAsyncFn =
    Arc<dyn Fn(&Node, &Formstate, &Form, Id) -> Result<AsyncValidation> + Send + Sync>;

/// When an async validator is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum When {
    /// After every change.
    OnChange,
    /// Once the path is blurred or the form is submitting.
    OnBlur,
    /// Only while the form is submitting.
    #[default]
    OnSubmit,
}

#[derive(Debug, Clone)]
enum Required {
    Default,
    Message(String),
}

#[derive(Clone, Default)]
struct Rules {
    required: Option<Required>,
    validate: Option<ValidateFn>,
    validate_async: Option<(ValidateAsyncFn, When)>,
}

impl Rules {
    fn has_any(&self) -> bool {
        self.required.is_some() || self.validate.is_some() || self.validate_async.is_some()
    }

    fn compile(&self, root_model_key: &str, nested_scope_id: Option<Id>) -> ValidationSchema {
        let required_message = self.required.as_ref().map(|required| match required {
            Required::Message(message) if !message.trim().is_empty() => message.clone(),
            _ => format!("{} is required.", humanize_camel_case(field_name(root_model_key))),
        });
        ValidationSchema {
            required_message,
            validate: self.validate.clone(),
            validate_async: self.validate_async.clone(),
            nested_scope_id,
        }
    }
}

/// Rules for a single field.
///
/// # Example
///
/// ```rust
/// use formstate_core::{FieldRules, Validation, When};
///
/// let rules = FieldRules::new()
///     .required_message("Tell us who you are.")
///     .validate(|value, _, _, _| {
///         Ok(match value.as_str() {
///             Some(name) if name.len() < 2 => Validation::invalid("Too short."),
///             _ => Validation::Valid,
///         })
///     });
/// # let _ = rules;
/// ```
#[derive(Clone, Default)]
pub struct FieldRules(Rules);

impl FieldRules {
    /// Empty rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a non-blank value, with a message derived from the field name.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.0.required = Some(Required::Default);
        self
    }

    /// Requires a non-blank value, reporting `message` when it is missing.
    #[must_use]
    pub fn required_message(mut self, message: impl Into<String>) -> Self {
        self.0.required = Some(Required::Message(message.into()));
        self
    }

    /// Sets the synchronous validator.
    #[must_use]
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Node, &Formstate, &Form, Id) -> Result<Validation> + Send + Sync + 'static,
    {
        self.0.validate = Some(Arc::new(validate));
        self
    }

    /// Sets the asynchronous validator and when it runs.
    #[must_use]
    pub fn validate_async<F>(mut self, validate_async: F, when: When) -> Self
    where
        F: Fn(&Node, &Formstate, &Form, Id) -> Result<AsyncValidation> + Send + Sync + 'static,
    {
        self.0.validate_async = Some((Arc::new(validate_async), when));
        self
    }
}

/// Rules for a scope (an object or array node).
///
/// Scopes validate the whole container. Their async validator only runs
/// during submission. A scope can also carry a nested schema declared
/// relative to itself, and, for arrays, a schema applied to every element.
#[derive(Clone, Default)]
pub struct ScopeRules {
    rules: Rules,
    schema: Option<FormValidationSchema>,
    schema_for_each: Option<FormValidationSchema>,
}

impl ScopeRules {
    /// Empty rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a non-empty container.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.rules.required = Some(Required::Default);
        self
    }

    /// Requires a non-empty container, reporting `message` otherwise.
    #[must_use]
    pub fn required_message(mut self, message: impl Into<String>) -> Self {
        self.rules.required = Some(Required::Message(message.into()));
        self
    }

    /// Sets the synchronous validator.
    #[must_use]
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Node, &Formstate, &Form, Id) -> Result<Validation> + Send + Sync + 'static,
    {
        self.rules.validate = Some(Arc::new(validate));
        self
    }

    /// Sets the asynchronous validator. It runs on submit.
    #[must_use]
    pub fn validate_async<F>(mut self, validate_async: F) -> Self
    where
        F: Fn(&Node, &Formstate, &Form, Id) -> Result<AsyncValidation> + Send + Sync + 'static,
    {
        self.rules.validate_async = Some((Arc::new(validate_async), When::OnSubmit));
        self
    }

    /// Declares a schema whose keys are relative to this scope.
    #[must_use]
    pub fn schema(mut self, schema: FormValidationSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Declares a schema applied to every element of this array scope.
    #[must_use]
    pub fn schema_for_each(mut self, schema: FormValidationSchema) -> Self {
        self.schema_for_each = Some(schema);
        self
    }
}

/// Declarative validation schema.
///
/// Keys accept dot or bracket notation and are relative to wherever the
/// schema is applied.
///
/// # Example
///
/// ```rust
/// use formstate_core::{FieldRules, FormValidationSchema, ScopeRules};
///
/// let contact = FormValidationSchema::new()
///     .field("email", FieldRules::new().required());
/// let schema = FormValidationSchema::new()
///     .field("name", FieldRules::new().required())
///     .scope("contacts", ScopeRules::new().schema_for_each(contact));
/// # let _ = schema;
/// ```
#[derive(Clone, Default)]
pub struct FormValidationSchema {
    fields: Vec<(String, FieldRules)>,
    scopes: Vec<(String, ScopeRules)>,
}

impl FormValidationSchema {
    /// Empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares field rules for `model_key`.
    ///
    /// Declaring a container as a field stops the lookup from descending into
    /// it.
    #[must_use]
    pub fn field(mut self, model_key: impl Into<String>, rules: FieldRules) -> Self {
        self.fields.push((model_key.into(), rules));
        self
    }

    /// Declares scope rules for `model_key`.
    #[must_use]
    pub fn scope(mut self, model_key: impl Into<String>, rules: ScopeRules) -> Self {
        self.scopes.push((model_key.into(), rules));
        self
    }

    /// Whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.scopes.is_empty()
    }
}

impl fmt::Debug for FormValidationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormValidationSchema")
            .field("fields", &self.fields.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("scopes", &self.scopes.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone)]
struct Declared<R> {
    rules: R,
    declared_in: String,
}

/// Flattened schema keyed by root model key.
#[derive(Clone, Default)]
pub(crate) struct NormalizedSchema {
    fields: BTreeMap<String, Declared<FieldRules>>,
    scopes: BTreeMap<String, Declared<ScopeRules>>,
}

impl NormalizedSchema {
    /// Flattens `schema` relative to the root model key `scope`.
    pub(crate) fn extend(
        &mut self,
        schema: &FormValidationSchema,
        scope: &str,
    ) -> Result<(), SchemaError> {
        for (model_key, rules) in &schema.fields {
            let root_model_key = add_scope(scope, &normalize(model_key));
            self.claim(&root_model_key)?;
            self.fields.insert(
                root_model_key,
                Declared {
                    rules: rules.clone(),
                    declared_in: scope.to_owned(),
                },
            );
        }
        for (model_key, rules) in &schema.scopes {
            let root_model_key = add_scope(scope, &normalize(model_key));
            if let Some(nested) = &rules.schema {
                self.extend(nested, &root_model_key)?;
            }
            let own_entry = rules.schema.is_none()
                || rules.rules.has_any()
                || rules.schema_for_each.is_some();
            if own_entry {
                self.claim(&root_model_key)?;
                self.scopes.insert(
                    root_model_key,
                    Declared {
                        rules: rules.clone(),
                        declared_in: scope.to_owned(),
                    },
                );
            }
        }
        Ok(())
    }

    fn claim(&self, root_model_key: &str) -> Result<(), SchemaError> {
        if self.fields.contains_key(root_model_key) || self.scopes.contains_key(root_model_key) {
            return Err(SchemaError::Duplicate(root_model_key.to_owned()));
        }
        Ok(())
    }

    pub(crate) fn is_field(&self, root_model_key: &str) -> bool {
        self.fields.contains_key(root_model_key)
    }

    pub(crate) fn is_scope(&self, root_model_key: &str) -> bool {
        self.scopes.contains_key(root_model_key)
    }

    pub(crate) fn for_each(&self, root_model_key: &str) -> Option<FormValidationSchema> {
        self.scopes
            .get(root_model_key)
            .and_then(|declared| declared.rules.schema_for_each.clone())
    }

    /// Compiles every entry against `lookup`, in declaration kind order
    /// (fields, then scopes).
    pub(crate) fn compile(
        &self,
        lookup: &crate::lookup::Lookup,
    ) -> Result<Vec<(Id, ValidationSchema)>, SchemaError> {
        let fields = self
            .fields
            .iter()
            .map(|(key, declared)| (key, &declared.rules.0, &declared.declared_in));
        let scopes = self
            .scopes
            .iter()
            .map(|(key, declared)| (key, &declared.rules.rules, &declared.declared_in));

        let mut compiled = Vec::new();
        for (root_model_key, rules, declared_in) in fields.chain(scopes) {
            let id = lookup
                .id(root_model_key)
                .ok_or_else(|| SchemaError::NotInModel(root_model_key.clone()))?;
            let nested_scope_id = if declared_in.is_empty() {
                None
            } else {
                lookup.id(declared_in)
            };
            let schema = rules.compile(root_model_key, nested_scope_id);
            if !schema.is_empty() {
                compiled.push((id, schema));
            }
        }
        Ok(compiled)
    }
}

/// Compiled rules for one id.
#[derive(Clone)]
pub struct ValidationSchema {
    required_message: Option<String>,
    validate: Option<ValidateFn>,
    validate_async: Option<(ValidateAsyncFn, When)>,
    nested_scope_id: Option<Id>,
}

impl ValidationSchema {
    /// Whether the value must be present and non-blank.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required_message.is_some()
    }

    /// Message reported when the required check fails.
    #[must_use]
    pub fn required_message(&self) -> Option<&str> {
        self.required_message.as_deref()
    }

    /// The synchronous validator.
    #[must_use]
    pub fn validate(&self) -> Option<&ValidateFn> {
        self.validate.as_ref()
    }

    /// The asynchronous validator.
    #[must_use]
    pub fn validate_async(&self) -> Option<&ValidateAsyncFn> {
        self.validate_async.as_ref().map(|(validate, _)| validate)
    }

    /// When the asynchronous validator runs.
    #[must_use]
    pub fn when(&self) -> Option<When> {
        self.validate_async.as_ref().map(|(_, when)| *when)
    }

    /// Scope the rules were declared in; `None` at the top level.
    #[must_use]
    pub fn nested_scope_id(&self) -> Option<Id> {
        self.nested_scope_id
    }

    /// Whether the schema carries no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required_message.is_none() && self.validate.is_none() && self.validate_async.is_none()
    }
}

impl fmt::Debug for ValidationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationSchema")
            .field("required_message", &self.required_message)
            .field("validate", &self.validate.is_some())
            .field("when", &self.when())
            .field("nested_scope_id", &self.nested_scope_id)
            .finish()
    }
}

/// Rules registered on a form rather than baked into a formstate.
///
/// Cloning shares the underlying map, so every view of a form (including
/// nested scope views) sees the same registrations.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    inner: Arc<RwLock<BTreeMap<Id, ValidationSchema>>>,
}

impl SchemaRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled rules registered for `id`.
    #[must_use]
    pub fn get(&self, id: Id) -> Option<ValidationSchema> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&id).cloned()
    }

    /// Whether rules are registered for `id`.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(&id)
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the rules for `id`.
    pub fn unregister(&self, id: Id) -> Option<ValidationSchema> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(&id)
    }

    /// Keeps only the registrations `keep` accepts and returns how many were
    /// dropped.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(Id) -> bool,
    {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|id, _| keep(*id));
        before - map.len()
    }

    /// Stores `schema` for `id`. Re-registering from the same scope replaces
    /// the rules; registering from another scope is an error.
    pub(crate) fn register(
        &self,
        id: Id,
        root_model_key: &str,
        schema: ValidationSchema,
    ) -> Result<(), SchemaError> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(&id)
            && existing.nested_scope_id != schema.nested_scope_id
        {
            return Err(SchemaError::RegisteredTwice(root_model_key.to_owned()));
        }
        map.insert(id, schema);
        Ok(())
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("len", &self.len())
            .finish()
    }
}

pub(crate) fn compile_field(
    rules: &FieldRules,
    root_model_key: &str,
    nested_scope_id: Option<Id>,
) -> ValidationSchema {
    rules.0.compile(root_model_key, nested_scope_id)
}

pub(crate) fn compile_scope(
    rules: &ScopeRules,
    root_model_key: &str,
    nested_scope_id: Option<Id>,
) -> Result<ValidationSchema, SchemaError> {
    if rules.schema.is_some() || rules.schema_for_each.is_some() {
        return Err(SchemaError::NestedRegistration(root_model_key.to_owned()));
    }
    Ok(rules.rules.compile(root_model_key, nested_scope_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(schema: &FormValidationSchema) -> Result<NormalizedSchema, SchemaError> {
        let mut normalized = NormalizedSchema::default();
        normalized.extend(schema, "")?;
        Ok(normalized)
    }

    #[test]
    fn test_nested_schemas_flatten_relative_to_scope() {
        let address = FormValidationSchema::new().field("zip", FieldRules::new().required());
        let schema = FormValidationSchema::new()
            .field("name", FieldRules::new())
            .scope("profile[address]", ScopeRules::new().schema(address));
        let normalized = flatten(&schema).unwrap();
        assert!(normalized.is_field("name"));
        assert!(normalized.is_field("profile.address.zip"));
        assert_eq!(normalized.fields["profile.address.zip"].declared_in, "profile.address");
        assert!(!normalized.is_scope("profile.address"));
    }

    #[test]
    fn test_scope_with_schema_and_own_rules_keeps_both() {
        let inner = FormValidationSchema::new().field("a", FieldRules::new().required());
        let schema = FormValidationSchema::new()
            .scope("s", ScopeRules::new().required().schema(inner));
        let normalized = flatten(&schema).unwrap();
        assert!(normalized.is_scope("s"));
        assert!(normalized.is_field("s.a"));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let schema = FormValidationSchema::new()
            .field("a.b", FieldRules::new())
            .field("a[b]", FieldRules::new());
        assert_eq!(
            flatten(&schema).err(),
            Some(SchemaError::Duplicate("a.b".into()))
        );

        let nested = FormValidationSchema::new().field("b", FieldRules::new());
        let schema = FormValidationSchema::new()
            .field("a.b", FieldRules::new())
            .scope("a", ScopeRules::new().schema(nested));
        assert_eq!(
            flatten(&schema).err(),
            Some(SchemaError::Duplicate("a.b".into()))
        );
    }

    #[test]
    fn test_required_messages() {
        let schema = FieldRules::new().required();
        assert_eq!(
            compile_field(&schema, "contacts.0.firstName", None).required_message(),
            Some("First name is required.")
        );
        let custom = FieldRules::new().required_message("Need it.");
        assert_eq!(compile_field(&custom, "x", None).required_message(), Some("Need it."));
        let blank = FieldRules::new().required_message("  ");
        assert_eq!(compile_field(&blank, "age", None).required_message(), Some("Age is required."));
        assert!(compile_field(&FieldRules::new(), "x", None).is_empty());
    }

    #[test]
    fn test_scope_async_runs_on_submit() {
        let rules = ScopeRules::new().validate_async(|_, formstate, _, _| {
            Ok(AsyncValidation::Updated(formstate.clone()))
        });
        let compiled = compile_scope(&rules, "s", None).unwrap();
        assert_eq!(compiled.when(), Some(When::OnSubmit));
    }

    #[test]
    fn test_registry_rejects_second_scope() {
        let registry = SchemaRegistry::new();
        let id = Id::mint();
        let first = compile_field(&FieldRules::new().required(), "a", None);
        let second = compile_field(&FieldRules::new().required(), "a", Some(Id::mint()));
        registry.register(id, "a", first.clone()).unwrap();
        registry.register(id, "a", first).unwrap();
        assert_eq!(
            registry.register(id, "a", second).unwrap_err(),
            SchemaError::RegisteredTwice("a".into())
        );
        assert!(registry.contains(id));
        assert!(registry.unregister(id).is_some());
        assert!(registry.is_empty());
    }
}
