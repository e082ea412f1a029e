//! Validation orchestration.
//!
//! Synchronous validation runs a path's rules and then the rules of every
//! scope enclosing it, most nested first, so a scope validator can read the
//! fresh status of its fields. Asynchronous validation runs only when the
//! path is syncly valid and its `When` condition holds.

use std::cmp::Reverse;
use std::future::Future;

use serde_json::Value;

use crate::clock::AsyncToken;
use crate::error::{ContractViolation, FormstateError, Result};
use crate::form::{Form, create_nested_scope};
use crate::form_status::PendingValidation;
use crate::formstate::Formstate;
use crate::lookup::Id;
use crate::node::Node;
use crate::path::{in_scope, scope_length};
use crate::schema::When;

/// Outcome of a synchronous validator.
#[derive(Debug)]
pub enum Validation {
    /// The value passes.
    Valid,
    /// The value fails with a non-blank message.
    Invalid(String),
    /// The validator updated the formstate itself. It is used as-is; a
    /// scope left unvalidated is then marked valid.
    Updated(Formstate),
}

impl Validation {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Outcome of an asynchronous validator.
#[derive(Debug)]
pub enum AsyncValidation {
    /// The validator settled immediately with this formstate.
    Updated(Formstate),
    /// Work is in flight. `formstate` must already carry `token`, normally
    /// from [`Formstate::set_async_started`]; `promise` reports the result
    /// through [`Form::set_formstate`].
    Pending {
        formstate: Formstate,
        token: AsyncToken,
        promise: PendingValidation,
    },
}

impl AsyncValidation {
    /// Wraps `future` into a pending result.
    pub fn pending<F>(formstate: Formstate, token: AsyncToken, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::Pending {
            formstate,
            token,
            promise: PendingValidation::new(future),
        }
    }
}

/// Checks presence: fails on null, blank strings and empty arrays.
///
/// Returns the message to report when the check fails.
#[must_use]
pub fn validate_required<'a>(value: &Node, message: &'a str) -> Option<&'a str> {
    let missing = match value {
        Node::Null => true,
        Node::String(text) => text.trim().is_empty(),
        Node::Array(items) => items.is_empty(),
        _ => false,
    };
    missing.then_some(message)
}

impl Formstate {
    fn with_validity_by_id(&self, id: Id, valid: bool, message: Option<&str>) -> Self {
        let mut next = self.clone();
        next.set_validity_by_id(id, Some(valid), message);
        next
    }

    fn scoped(&self, nested_scope_id: Option<Id>, form: &Form) -> (Formstate, Form) {
        if self.nested_scope_id == nested_scope_id {
            (self.clone(), form.clone())
        } else {
            create_nested_scope(nested_scope_id, self, form)
        }
    }

    fn ensure_same_form(&self, other: &Formstate, root_model_key: &str) -> Result<()> {
        if self.is_same_form(other) {
            return Ok(());
        }
        Err(FormstateError::ValidatorContract {
            path: root_model_key.to_owned(),
            problem: ContractViolation::ForeignFormstate,
        })
    }

    fn ids_by_depth(&self, scopes_only: bool) -> Vec<Id> {
        let mut ids: Vec<(Id, isize)> = self
            .lookup
            .entries()
            .filter(|(id, _)| !scopes_only || self.lookup.is_scope(*id))
            .map(|(id, key)| (id, scope_length(key)))
            .collect();
        ids.sort_by_key(|(_, depth)| Reverse(*depth));
        ids.into_iter().map(|(id, _)| id).collect()
    }

    /// Runs the rules of one id, ignoring its current status.
    fn validate_one(&self, id: Id, form: &Form) -> Result<Self> {
        let root_model_key = self.get_root_model_key(id)?;
        tracing::trace!(%id, root_model_key, "syncly validating");

        let Some(schema) = self.validation_schema(id, Some(form)) else {
            return Ok(self.with_validity_by_id(id, true, None));
        };
        let value = self.value_by_id(id)?;

        if let Some(message) = schema.required_message()
            && let Some(message) = validate_required(value, message)
        {
            return Ok(self.with_validity_by_id(id, false, Some(message)));
        }

        let Some(validate) = schema.validate() else {
            return Ok(self.with_validity_by_id(id, true, None));
        };
        let (scoped_formstate, scoped_form) = self.scoped(schema.nested_scope_id(), form);
        match validate(value, &scoped_formstate, &scoped_form, id)? {
            Validation::Valid => Ok(self.with_validity_by_id(id, true, None)),
            Validation::Invalid(message) if message.trim().is_empty() => {
                Err(FormstateError::ValidatorContract {
                    path: root_model_key.to_owned(),
                    problem: ContractViolation::BlankMessage,
                })
            }
            Validation::Invalid(message) => Ok(self.with_validity_by_id(id, false, Some(&message))),
            Validation::Updated(updated) => {
                self.ensure_same_form(&updated, root_model_key)?;
                let mut next = updated.nested(self.nested_scope_id);
                if next.is_scope(id) && !next.status_by_id(id).is_syncly_validated() {
                    next.set_validity_by_id(id, Some(true), None);
                }
                Ok(next)
            }
        }
    }

    /// Syncly validates `model_key` unless it already is, then every
    /// enclosing scope that is not yet validated, most nested first.
    pub fn syncly_validate(&self, model_key: &str, form: &Form) -> Result<Self> {
        let id = self.get_id(model_key)?;
        self.syncly_validate_id(id, form)
    }

    pub(crate) fn syncly_validate_id(&self, id: Id, form: &Form) -> Result<Self> {
        let mut formstate = if self.status_by_id(id).is_syncly_validated() {
            self.clone()
        } else {
            self.validate_one(id, form)?
        };

        let root_model_key = formstate.get_root_model_key(id)?.to_owned();
        let frame = formstate.nested_scope_id.take();
        for scope_id in formstate.ids_by_depth(true) {
            let encloses = formstate
                .lookup
                .root_model_key(scope_id)
                .is_some_and(|scope_key| in_scope(&root_model_key, scope_key));
            if encloses && !formstate.status_by_id(scope_id).is_syncly_validated() {
                formstate = formstate.validate_one(scope_id, form)?;
            }
        }
        formstate.nested_scope_id = frame;
        Ok(formstate)
    }

    /// Syncly validates every path that is not yet validated, most nested
    /// first.
    pub fn syncly_validate_form(&self, form: &Form) -> Result<Self> {
        let mut formstate = self.clone();
        let frame = formstate.nested_scope_id.take();
        for id in formstate.ids_by_depth(false) {
            if !formstate.status_by_id(id).is_syncly_validated() {
                formstate = formstate.validate_one(id, form)?;
            }
        }
        formstate.nested_scope_id = frame;
        Ok(formstate)
    }

    /// Alias of [`Formstate::syncly_validate_form`].
    pub fn validate_form(&self, form: &Form) -> Result<Self> {
        self.syncly_validate_form(form)
    }

    /// Starts async validation of `model_key` when it is syncly valid (or
    /// has no sync result), has no async result, is not already waiting, and
    /// its `When` condition holds.
    pub fn asyncly_validate(&self, model_key: &str, form: &Form) -> Result<Self> {
        let id = self.get_id(model_key)?;
        self.asyncly_validate_id(id, form)
    }

    pub(crate) fn asyncly_validate_id(&self, id: Id, form: &Form) -> Result<Self> {
        let status = self.status_by_id(id);
        if status.is_syncly_invalid() || status.is_asyncly_validated() || status.is_waiting() {
            return Ok(self.clone());
        }
        let Some(schema) = self.validation_schema(id, Some(form)) else {
            return Ok(self.clone());
        };
        let (Some(validate_async), Some(when)) = (schema.validate_async(), schema.when()) else {
            return Ok(self.clone());
        };
        let ready = match when {
            When::OnChange => true,
            When::OnBlur => status.touched.blurred || status.is_submitting(),
            When::OnSubmit => status.is_submitting(),
        };
        if !ready {
            return Ok(self.clone());
        }

        let root_model_key = self.get_root_model_key(id)?;
        let value = self.value_by_id(id)?;
        let (scoped_formstate, scoped_form) = self.scoped(schema.nested_scope_id(), form);
        match validate_async(value, &scoped_formstate, &scoped_form, id)? {
            AsyncValidation::Updated(updated) => {
                self.ensure_same_form(&updated, root_model_key)?;
                Ok(updated.nested(self.nested_scope_id))
            }
            AsyncValidation::Pending {
                formstate,
                token,
                promise,
            } => {
                self.ensure_same_form(&formstate, root_model_key)?;
                let started = formstate
                    .statuses
                    .values()
                    .any(|status| status.async_status.token == Some(token));
                if !started {
                    return Err(FormstateError::ValidatorContract {
                        path: root_model_key.to_owned(),
                        problem: ContractViolation::UnknownToken,
                    });
                }
                tracing::debug!(%token, root_model_key, "async validation pending");
                let mut next = formstate.nested(self.nested_scope_id);
                next.insert_promise(token, promise);
                Ok(next)
            }
        }
    }

    /// Runs [`Formstate::asyncly_validate`] on every path.
    pub fn asyncly_validate_form(&self, form: &Form) -> Result<Self> {
        let mut formstate = self.clone();
        let frame = formstate.nested_scope_id.take();
        let ids: Vec<Id> = formstate.lookup.entries().map(|(id, _)| id).collect();
        for id in ids {
            formstate = formstate.asyncly_validate_id(id, form)?;
        }
        formstate.nested_scope_id = frame;
        Ok(formstate)
    }

    /// Writes a new value, marks it changed, then validates syncly and
    /// asyncly.
    pub fn change_and_validate(&self, model_key: &str, value: Value, form: &Form) -> Result<Self> {
        let id = self.get_id(model_key)?;
        self.set_value_and_clear_status(model_key, value)?
            .set_changed(model_key)?
            .syncly_validate_id(id, form)?
            .asyncly_validate_id(id, form)
    }

    /// Opens a submission and disables input.
    ///
    /// Fails from a nested view or while a submission is already running.
    pub fn start_form_submission(&self) -> Result<Self> {
        if self.is_nested() {
            return Err(FormstateError::NestedSubmission);
        }
        if self.is_form_submitting() {
            return Err(FormstateError::AlreadySubmitting);
        }
        tracing::debug!("form submission started");
        Ok(self.set_form_submitting().set_input_disabled())
    }

    /// Closes the submission and re-enables input.
    pub fn cancel_form_submission(&self) -> Result<Self> {
        tracing::debug!("form submission cancelled");
        Ok(self.set_form_submitted()?.set_input_enabled())
    }

    /// Closes the submission, leaving input disabled.
    pub fn cancel_form_submission_keep_input_disabled(&self) -> Result<Self> {
        self.set_form_submitted()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::schema::{FieldRules, FormValidationSchema, ScopeRules};

    fn form(model: Value, schema: &FormValidationSchema) -> (Formstate, Form) {
        let formstate = Formstate::initialize(model, schema).unwrap();
        let form = Form::new(formstate.clone());
        (formstate, form)
    }

    #[test]
    fn test_required() {
        let check = |value: Value| validate_required(&Node::from(value), "m");
        assert_eq!(check(Value::Null), Some("m"));
        assert_eq!(check(json!("  ")), Some("m"));
        assert_eq!(check(json!([])), Some("m"));
        assert_eq!(check(json!(0)), None);
        assert_eq!(check(json!(false)), None);
        assert_eq!(check(json!({})), None);
    }

    #[test]
    fn test_required_skips_validate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let schema = FormValidationSchema::new().field(
            "firstName",
            FieldRules::new().required().validate(move |_, _, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Validation::Valid)
            }),
        );
        let (fs, form) = form(json!({"firstName": ""}), &schema);
        let fs = fs.syncly_validate("firstName", &form).unwrap();
        assert!(fs.is_syncly_invalid("firstName").unwrap());
        assert_eq!(fs.get_message("firstName").unwrap(), "First name is required.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enclosing_scopes_validate_after_fields() {
        let schema = FormValidationSchema::new().scope(
            "address",
            ScopeRules::new().validate(|_, formstate, _, _| {
                Ok(if formstate.is_syncly_valid("address.city")? {
                    Validation::Valid
                } else {
                    Validation::invalid("Fix the city first.")
                })
            }),
        );
        let (fs, form) = form(json!({"address": {"city": "Rome", "zip": ""}}), &schema);
        let fs = fs.syncly_validate("address.city", &form).unwrap();
        assert!(fs.is_syncly_valid("address.city").unwrap());
        assert!(fs.is_syncly_valid("address").unwrap());
        assert!(fs.is_syncly_valid("").unwrap());
        assert!(!fs.is_syncly_validated("address.zip").unwrap());
    }

    #[test]
    fn test_sync_validation_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let schema = FormValidationSchema::new().field(
            "name",
            FieldRules::new().validate(move |_, _, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Validation::invalid("Never good enough."))
            }),
        );
        let (fs, form) = form(json!({"name": "x"}), &schema);
        let once = fs.syncly_validate("name", &form).unwrap();
        let twice = once.syncly_validate("name", &form).unwrap();
        assert_eq!(once.statuses(), twice.statuses());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validate_form_covers_every_path() {
        let schema = FormValidationSchema::new()
            .field("a", FieldRules::new().required())
            .field("b.c", FieldRules::new().required());
        let (fs, form) = form(json!({"a": "1", "b": {"c": ""}}), &schema);
        let fs = fs.validate_form(&form).unwrap();
        for key in ["", "a", "b", "b.c"] {
            assert!(fs.is_syncly_validated(key).unwrap(), "{key}");
        }
        assert!(fs.is_syncly_invalid("b.c").unwrap());
        assert!(!fs.is_model_valid());
        assert!(fs.is_model_invalid());
    }

    #[test]
    fn test_updated_formstate_is_used_verbatim() {
        let schema = FormValidationSchema::new().scope(
            "range",
            ScopeRules::new().validate(|_, formstate, _, _| {
                Ok(Validation::Updated(
                    formstate.set_syncly_invalid("range.min", Some("Min must be below max."))?,
                ))
            }),
        );
        let (fs, form) = form(json!({"range": {"min": 5, "max": 1}}), &schema);
        let fs = fs.syncly_validate("range.min", &form).unwrap();
        assert!(fs.is_syncly_invalid("range.min").unwrap());
        assert_eq!(fs.get_message("range.min").unwrap(), "Min must be below max.");
        assert!(fs.is_syncly_valid("range").unwrap());
    }

    #[test]
    fn test_nested_rules_see_their_scope() {
        let contact = FormValidationSchema::new().field(
            "email",
            FieldRules::new().validate(|_, formstate, form, _| {
                assert!(formstate.is_nested());
                assert_eq!(formstate.nested_scope_id(), form.nested_scope_id());
                formstate.get_value("name")?;
                Ok(Validation::Valid)
            }),
        );
        let schema = FormValidationSchema::new()
            .scope("contacts", ScopeRules::new().schema_for_each(contact));
        let (fs, form) = form(json!({"contacts": [{"name": "A", "email": "a@x"}]}), &schema);
        let fs = fs.syncly_validate("contacts.0.email", &form).unwrap();
        assert!(fs.is_syncly_valid("contacts.0.email").unwrap());
        assert!(!fs.is_nested());
    }

    #[test]
    fn test_validator_contract_violations() {
        let schema = FormValidationSchema::new().field(
            "name",
            FieldRules::new().validate(|_, _, _, _| Ok(Validation::invalid(" "))),
        );
        let (fs, form) = form(json!({"name": "x"}), &schema);
        assert!(matches!(
            fs.syncly_validate("name", &form),
            Err(FormstateError::ValidatorContract {
                problem: ContractViolation::BlankMessage,
                ..
            })
        ));

        let schema = FormValidationSchema::new().field(
            "name",
            FieldRules::new().validate(|_, _, _, _| {
                Ok(Validation::Updated(Formstate::new(json!({"name": "x"}))?))
            }),
        );
        let (fs, form) = self::form(json!({"name": "x"}), &schema);
        assert!(matches!(
            fs.syncly_validate("name", &form),
            Err(FormstateError::ValidatorContract {
                problem: ContractViolation::ForeignFormstate,
                ..
            })
        ));
    }

    #[test]
    fn test_async_when_conditions() {
        let schema = FormValidationSchema::new()
            .field(
                "onBlur",
                FieldRules::new().validate_async(
                    |_, formstate, _, _| Ok(AsyncValidation::Updated(formstate.set_message("onBlur", "ran")?)),
                    When::OnBlur,
                ),
            )
            .field(
                "onSubmit",
                FieldRules::new().validate_async(
                    |_, formstate, _, _| Ok(AsyncValidation::Updated(formstate.set_message("onSubmit", "ran")?)),
                    When::OnSubmit,
                ),
            );
        let (fs, form) = form(json!({"onBlur": "", "onSubmit": ""}), &schema);
        let fs = fs.asyncly_validate_form(&form).unwrap();
        assert_eq!(fs.get_message("onBlur").unwrap(), "");
        assert_eq!(fs.get_message("onSubmit").unwrap(), "");

        let blurred = fs.set_blurred("onBlur").unwrap().asyncly_validate_form(&form).unwrap();
        assert_eq!(blurred.get_message("onBlur").unwrap(), "ran");
        assert_eq!(blurred.get_message("onSubmit").unwrap(), "");

        let submitting = fs.start_form_submission().unwrap().asyncly_validate_form(&form).unwrap();
        assert_eq!(submitting.get_message("onBlur").unwrap(), "ran");
        assert_eq!(submitting.get_message("onSubmit").unwrap(), "ran");

        let invalid = fs
            .set_syncly_invalid("onBlur", None)
            .and_then(|fs| fs.set_blurred("onBlur"))
            .and_then(|fs| fs.asyncly_validate("onBlur", &form))
            .unwrap();
        assert_eq!(invalid.get_message("onBlur").unwrap(), "");
    }

    #[tokio::test]
    async fn test_pending_results_register_promises() {
        let schema = FormValidationSchema::new().field(
            "username",
            FieldRules::new().validate_async(
                |_, formstate, _, _| {
                    let formstate = formstate.set_async_started("username", Some("Checking..."))?;
                    let Some(token) = formstate.get_async_token("username")? else {
                        return Err(FormstateError::custom("token missing"));
                    };
                    Ok(AsyncValidation::pending(formstate, token, async {}))
                },
                When::OnChange,
            ),
        );
        let (fs, form) = form(json!({"username": ""}), &schema);
        let fs = fs.change_and_validate("username", json!("ada"), &form).unwrap();
        assert!(fs.is_waiting("username").unwrap());
        assert!(fs.is_changed("").unwrap());
        assert_eq!(fs.get_message("username").unwrap(), "Checking...");
        assert_eq!(fs.get_promises().len(), 1);
        assert!(!fs.is_valid("username").unwrap());
    }

    #[test]
    fn test_pending_token_must_be_started() {
        let schema = FormValidationSchema::new().field(
            "username",
            FieldRules::new().validate_async(
                |_, formstate, _, _| {
                    Ok(AsyncValidation::pending(formstate.clone(), AsyncToken::new(), async {}))
                },
                When::OnChange,
            ),
        );
        let (fs, form) = form(json!({"username": "a"}), &schema);
        assert!(matches!(
            fs.asyncly_validate("username", &form),
            Err(FormstateError::ValidatorContract {
                problem: ContractViolation::UnknownToken,
                ..
            })
        ));
    }

    #[test]
    fn test_submission_guards() {
        let fs = Formstate::new(json!({"a": {"b": 1}})).unwrap();
        let scope = fs.get_id("a").unwrap();
        assert!(matches!(
            fs.nested(Some(scope)).start_form_submission(),
            Err(FormstateError::NestedSubmission)
        ));
        let started = fs.start_form_submission().unwrap();
        assert!(started.is_input_disabled());
        assert!(matches!(
            started.start_form_submission(),
            Err(FormstateError::AlreadySubmitting)
        ));
        let cancelled = started.cancel_form_submission().unwrap();
        assert!(!cancelled.is_input_disabled());
        assert!(!cancelled.is_form_submitting());
        let kept = started.cancel_form_submission_keep_input_disabled().unwrap();
        assert!(kept.is_input_disabled());
    }
}
