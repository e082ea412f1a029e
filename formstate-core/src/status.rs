//! Per-field and per-scope status.
//!
//! Every path has a [`Status`]. Statuses are stored sparsely: a path without
//! an entry reads as the virgin status (nothing touched, nothing validated).
//! All setters return a new [`Formstate`]; path arguments are resolved
//! through the view frame.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::clock::{AsyncToken, Stamp};
use crate::error::{FormstateError, Result};
use crate::form_status::PendingValidation;
use crate::formstate::Formstate;
use crate::lookup::Id;
use crate::node::Node;
use crate::path::in_scope;
use crate::tree;

/// Submission touch state of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Submission {
    /// The form is submitting and this path takes part.
    Submitting,
    /// The path was part of a finished submission.
    Submitted,
}

/// How a path has been touched by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Touched {
    /// The value was written since the status was last cleared.
    pub changed: bool,
    /// The field lost focus at least once.
    pub blurred: bool,
    /// Part of a running or finished submission.
    pub submitted: Option<Submission>,
}

/// Error reported by an asynchronous validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ReportedError {
    message: String,
}

impl ReportedError {
    /// Wraps a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The placeholder used when a failure carries no error.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("Unknown error.")
    }

    /// Captures the display text of any error.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self::new(error.to_string())
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Asynchronous validation state of a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AsyncStatus {
    /// Token of the latest run. Only results carrying it are recorded.
    pub token: Option<AsyncToken>,
    /// When the latest run started.
    pub started: Option<Stamp>,
    /// `None` while waiting.
    pub finished: Option<Stamp>,
    /// Result of the latest finished run, if it passed or failed.
    pub asyncly_valid: Option<bool>,
    /// Error of the latest finished run.
    pub error: Option<ReportedError>,
}

/// Status of one field or scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    /// How the user has touched the path.
    pub touched: Touched,
    /// Result of sync validation; `None` until validated.
    pub syncly_valid: Option<bool>,
    /// State of the latest async run.
    #[serde(rename = "async")]
    pub async_status: AsyncStatus,
    /// Message shown next to the path. Empty when there is none.
    pub message: String,
    /// Caller-defined properties.
    pub custom: BTreeMap<String, Value>,
}

pub(crate) static VIRGIN: Status = Status {
    touched: Touched {
        changed: false,
        blurred: false,
        submitted: None,
    },
    syncly_valid: None,
    async_status: AsyncStatus {
        token: None,
        started: None,
        finished: None,
        asyncly_valid: None,
        error: None,
    },
    message: String::new(),
    custom: BTreeMap::new(),
};

impl Status {
    /// Sync validation passed.
    #[must_use]
    pub fn is_syncly_valid(&self) -> bool {
        self.syncly_valid == Some(true)
    }

    /// Sync validation failed.
    #[must_use]
    pub fn is_syncly_invalid(&self) -> bool {
        self.syncly_valid == Some(false)
    }

    /// Sync validation ran, whatever its result.
    #[must_use]
    pub fn is_syncly_validated(&self) -> bool {
        self.syncly_valid.is_some()
    }

    /// Async validation started and has not finished.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.async_status.started.is_some() && self.async_status.finished.is_none()
    }

    /// The latest async run passed.
    #[must_use]
    pub fn is_asyncly_valid(&self) -> bool {
        self.async_status.asyncly_valid == Some(true)
    }

    /// The latest async run failed.
    #[must_use]
    pub fn is_asyncly_invalid(&self) -> bool {
        self.async_status.asyncly_valid == Some(false)
    }

    /// The latest async run passed or failed. Errors do not count.
    #[must_use]
    pub fn is_asyncly_validated(&self) -> bool {
        self.async_status.asyncly_valid.is_some()
    }

    /// Composite validity.
    ///
    /// Any negative signal (sync invalid, async invalid, async error) wins.
    /// An async pass is valid. A sync pass is valid unless async work is
    /// still outstanding. Anything else is not yet valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.is_syncly_invalid()
            || self.is_asyncly_invalid()
            || self.async_status.error.is_some()
        {
            return false;
        }
        if self.is_asyncly_valid() {
            return true;
        }
        self.is_syncly_valid() && !self.is_waiting()
    }

    /// Sync or async invalid. Async errors do not count.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.is_syncly_invalid() || self.is_asyncly_invalid()
    }

    /// Either [`Status::is_valid`] or [`Status::is_invalid`].
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.is_valid() || self.is_invalid()
    }

    /// Taking part in the running submission.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.touched.submitted == Some(Submission::Submitting)
    }

    /// Part of a finished submission.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.touched.submitted == Some(Submission::Submitted)
    }
}

pub(crate) fn clean_message(message: &str) -> String {
    if message.trim().is_empty() {
        String::new()
    } else {
        message.to_owned()
    }
}

/// Outcome merged into the async status when a validator finishes.
enum AsyncOutcome {
    Valid,
    Invalid,
    Error(ReportedError),
}

// Reading.
impl Formstate {
    pub(crate) fn status_by_id(&self, id: Id) -> &Status {
        self.statuses.get(&id).map_or(&VIRGIN, |status| &**status)
    }

    /// Status of `model_key`.
    pub fn status(&self, model_key: &str) -> Result<&Status> {
        Ok(self.status_by_id(self.get_id(model_key)?))
    }

    /// Current value at `model_key`.
    pub fn get_value(&self, model_key: &str) -> Result<&Node> {
        let root_model_key = self.to_root_model_key(model_key)?;
        Ok(tree::get(&self.model, &root_model_key)?)
    }

    /// Value at `model_key` in the initial model, if it existed there.
    pub fn get_initial_value(&self, model_key: &str) -> Result<Option<&Node>> {
        let root_model_key = self.to_root_model_key(model_key)?;
        Ok(tree::try_get(&self.initial_model, &root_model_key))
    }

    /// See [`Status::is_syncly_valid`].
    pub fn is_syncly_valid(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_syncly_valid())
    }

    /// See [`Status::is_syncly_invalid`].
    pub fn is_syncly_invalid(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_syncly_invalid())
    }

    /// See [`Status::is_syncly_validated`].
    pub fn is_syncly_validated(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_syncly_validated())
    }

    /// See [`Status::is_waiting`].
    pub fn is_waiting(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_waiting())
    }

    /// See [`Status::is_asyncly_valid`].
    pub fn is_asyncly_valid(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_asyncly_valid())
    }

    /// See [`Status::is_asyncly_invalid`].
    pub fn is_asyncly_invalid(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_asyncly_invalid())
    }

    /// See [`Status::is_asyncly_validated`].
    pub fn is_asyncly_validated(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_asyncly_validated())
    }

    /// Error of the latest finished async run.
    pub fn get_async_error(&self, model_key: &str) -> Result<Option<&ReportedError>> {
        Ok(self.status(model_key)?.async_status.error.as_ref())
    }

    /// Token of the latest async run, minted by [`Formstate::set_async_started`].
    pub fn get_async_token(&self, model_key: &str) -> Result<Option<AsyncToken>> {
        Ok(self.status(model_key)?.async_status.token)
    }

    /// Start stamp of the latest async run.
    pub fn get_async_start_time(&self, model_key: &str) -> Result<Option<Stamp>> {
        Ok(self.status(model_key)?.async_status.started)
    }

    /// `None` while waiting.
    pub fn get_async_end_time(&self, model_key: &str) -> Result<Option<Stamp>> {
        Ok(self.status(model_key)?.async_status.finished)
    }

    /// See [`Status::is_valid`].
    pub fn is_valid(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_valid())
    }

    /// See [`Status::is_invalid`].
    pub fn is_invalid(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_invalid())
    }

    /// See [`Status::is_validated`].
    pub fn is_validated(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_validated())
    }

    /// Message of the path, empty when there is none.
    pub fn get_message(&self, model_key: &str) -> Result<&str> {
        Ok(&self.status(model_key)?.message)
    }

    /// See [`Touched::changed`].
    pub fn is_changed(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.touched.changed)
    }

    /// See [`Touched::blurred`].
    pub fn is_blurred(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.touched.blurred)
    }

    /// See [`Status::is_submitting`].
    pub fn is_submitting(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_submitting())
    }

    /// See [`Status::is_submitted`].
    pub fn is_submitted(&self, model_key: &str) -> Result<bool> {
        Ok(self.status(model_key)?.is_submitted())
    }

    /// Caller-defined property `name` of the path.
    pub fn get_custom_property(&self, model_key: &str, name: &str) -> Result<Option<&Value>> {
        Ok(self.status(model_key)?.custom.get(name))
    }
}

// Writing, by id. These operate on root model keys and ignore the frame.
impl Formstate {
    pub(crate) fn status_mut(&mut self, id: Id) -> &mut Status {
        Arc::make_mut(Arc::make_mut(&mut self.statuses).entry(id).or_default())
    }

    pub(crate) fn clear_status_by_id(&mut self, id: Id) {
        if self.statuses.contains_key(&id) {
            Arc::make_mut(&mut self.statuses).remove(&id);
        }
    }

    pub(crate) fn set_validity_by_id(&mut self, id: Id, valid: Option<bool>, message: Option<&str>) {
        let status = self.status_mut(id);
        status.syncly_valid = valid;
        if let Some(message) = message {
            status.message = clean_message(message);
        }
    }

    /// Scope ids whose root model key is a prefix of `root_model_key`.
    pub(crate) fn enclosing_scope_ids(&self, root_model_key: &str) -> Vec<Id> {
        self.lookup
            .scope_ids()
            .filter(|scope_id| {
                self.lookup
                    .root_model_key(*scope_id)
                    .is_some_and(|scope_key| in_scope(root_model_key, scope_key))
            })
            .collect()
    }

    pub(crate) fn set_changed_by_id(&mut self, id: Id) -> Result<()> {
        self.status_mut(id).touched.changed = true;
        let root_model_key = self.get_root_model_key(id)?.to_owned();
        for scope_id in self.enclosing_scope_ids(&root_model_key) {
            self.status_mut(scope_id).touched.changed = true;
        }
        Ok(())
    }

    pub(crate) fn set_submitting_by_id(&mut self, id: Id) {
        let status = self.status_by_id(id);
        if status.is_submitted() && status.async_status.error.is_none() {
            return;
        }
        self.status_mut(id).touched.submitted = Some(Submission::Submitting);
    }

    pub(crate) fn set_submitted_by_id(&mut self, id: Id) {
        self.status_mut(id).touched.submitted = Some(Submission::Submitted);
    }

    pub(crate) fn insert_promise(&mut self, token: AsyncToken, promise: PendingValidation) {
        Arc::make_mut(&mut self.form_status.promises).insert(token, promise);
    }

    pub(crate) fn remove_promise(&mut self, token: AsyncToken) {
        if self.form_status.promises.contains_key(&token) {
            Arc::make_mut(&mut self.form_status.promises).remove(&token);
        }
    }

    fn set_async_finished(
        &self,
        token: AsyncToken,
        model_key: &str,
        message: Option<&str>,
        outcome: AsyncOutcome,
    ) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.remove_promise(token);
        if next.status_by_id(id).async_status.token != Some(token) {
            tracing::debug!(%token, model_key, "dropping superseded async result");
            return Ok(next);
        }
        let status = next.status_mut(id);
        status.async_status.finished = Some(Stamp::now());
        match outcome {
            AsyncOutcome::Valid => status.async_status.asyncly_valid = Some(true),
            AsyncOutcome::Invalid => status.async_status.asyncly_valid = Some(false),
            AsyncOutcome::Error(error) => status.async_status.error = Some(error),
        }
        if let Some(message) = message {
            status.message = clean_message(message);
        }
        Ok(next)
    }
}

// Writing, by path.
impl Formstate {
    /// Writes `value` to a field and clears the status of the field and of
    /// every scope enclosing it.
    pub fn set_value_and_clear_status(&self, model_key: &str, value: Value) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let root_model_key = self.get_root_model_key(id)?.to_owned();
        if self.lookup.is_scope(id) {
            return Err(FormstateError::ScopeValue(root_model_key));
        }
        let mut next = self.clone();
        next.clear_status_by_id(id);
        for scope_id in next.enclosing_scope_ids(&root_model_key) {
            next.clear_status_by_id(scope_id);
        }
        tree::assign(&mut next.model, &root_model_key, Node::from(value))?;
        Ok(next)
    }

    /// Resets the status of `model_key` to virgin.
    pub fn clear_status(&self, model_key: &str) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.clear_status_by_id(id);
        Ok(next)
    }

    fn with_validity(&self, model_key: &str, valid: Option<bool>, message: Option<&str>) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.set_validity_by_id(id, valid, message);
        Ok(next)
    }

    /// Marks the path syncly valid. A `Some` message replaces the current one.
    pub fn set_syncly_valid(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.with_validity(model_key, Some(true), message)
    }

    /// Marks the path syncly invalid.
    pub fn set_syncly_invalid(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.with_validity(model_key, Some(false), message)
    }

    /// Forgets the sync validation result.
    pub fn set_not_syncly_validated(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.with_validity(model_key, None, message)
    }

    /// Alias of [`Formstate::set_syncly_valid`].
    pub fn set_valid(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.set_syncly_valid(model_key, message)
    }

    /// Alias of [`Formstate::set_syncly_invalid`].
    pub fn set_invalid(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.set_syncly_invalid(model_key, message)
    }

    /// Alias of [`Formstate::set_not_syncly_validated`].
    pub fn set_not_validated(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.set_not_syncly_validated(model_key, message)
    }

    /// Starts async validation: mints a fresh token and start stamp and
    /// resets any previous async result.
    ///
    /// Read the token back with [`Formstate::get_async_token`] and pass it to
    /// the finishing setter once the work completes.
    pub fn set_async_started(&self, model_key: &str, message: Option<&str>) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        let status = next.status_mut(id);
        status.async_status = AsyncStatus {
            token: Some(AsyncToken::new()),
            started: Some(Stamp::now()),
            ..AsyncStatus::default()
        };
        if let Some(message) = message {
            status.message = clean_message(message);
        }
        Ok(next)
    }

    /// Records an async pass. Ignored unless `token` is the path's current
    /// token; the pending future for `token` is cleared either way.
    pub fn set_asyncly_valid(&self, token: AsyncToken, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.set_async_finished(token, model_key, message, AsyncOutcome::Valid)
    }

    /// Records an async failure. Same token rules as
    /// [`Formstate::set_asyncly_valid`].
    pub fn set_asyncly_invalid(&self, token: AsyncToken, model_key: &str, message: Option<&str>) -> Result<Self> {
        self.set_async_finished(token, model_key, message, AsyncOutcome::Invalid)
    }

    /// Records an async error. `None` records [`ReportedError::unknown`].
    pub fn set_async_error(
        &self,
        token: AsyncToken,
        model_key: &str,
        error: Option<ReportedError>,
        message: Option<&str>,
    ) -> Result<Self> {
        let error = error.unwrap_or_else(ReportedError::unknown);
        self.set_async_finished(token, model_key, message, AsyncOutcome::Error(error))
    }

    /// Replaces the message. Blank messages are stored as empty.
    pub fn set_message(&self, model_key: &str, message: &str) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.status_mut(id).message = clean_message(message);
        Ok(next)
    }

    /// Marks the path and every enclosing scope changed.
    pub fn set_changed(&self, model_key: &str) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.set_changed_by_id(id)?;
        Ok(next)
    }

    /// Marks only this path blurred.
    pub fn set_blurred(&self, model_key: &str) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.status_mut(id).touched.blurred = true;
        Ok(next)
    }

    /// Marks the path as taking part in a submission. A path already
    /// submitted without an async error keeps its state.
    pub fn set_submitting(&self, model_key: &str) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.set_submitting_by_id(id);
        Ok(next)
    }

    /// Marks the path as part of a finished submission.
    pub fn set_submitted(&self, model_key: &str) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.set_submitted_by_id(id);
        Ok(next)
    }

    /// Stores a caller-defined property on the path.
    pub fn set_custom_property(&self, model_key: &str, name: &str, value: Value) -> Result<Self> {
        let id = self.get_id(model_key)?;
        let mut next = self.clone();
        next.status_mut(id).custom.insert(name.to_owned(), value);
        Ok(next)
    }

    /// Registers the future doing async work for `token`.
    #[must_use]
    pub fn set_promise(&self, token: AsyncToken, promise: PendingValidation) -> Self {
        let mut next = self.clone();
        next.insert_promise(token, promise);
        next
    }

    /// Drops the future registered for `token`.
    #[must_use]
    pub fn clear_promise(&self, token: AsyncToken) -> Self {
        let mut next = self.clone();
        next.remove_promise(token);
        next
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn formstate() -> Formstate {
        Formstate::new(json!({"name": "", "address": {"line1": "", "city": ""}})).unwrap()
    }

    #[test]
    fn test_virgin_status() {
        let fs = formstate();
        let status = fs.status("name").unwrap();
        assert_eq!(status, &Status::default());
        assert!(!status.is_valid());
        assert!(!status.is_invalid());
        assert!(!status.is_validated());
    }

    #[test]
    fn test_validity_lattice_corners() {
        let mut status = Status {
            syncly_valid: Some(true),
            ..Status::default()
        };
        assert!(status.is_valid());
        status.async_status.started = Some(Stamp::now());
        assert!(!status.is_valid());
        assert!(!status.is_validated());
        status.async_status.finished = Some(Stamp::now());
        assert!(status.is_valid());
        status.async_status.error = Some(ReportedError::unknown());
        assert!(!status.is_valid());
        assert!(!status.is_invalid());
        status.async_status.error = None;
        status.syncly_valid = None;
        status.async_status.asyncly_valid = Some(true);
        assert!(status.is_valid());
        status.syncly_valid = Some(false);
        assert!(!status.is_valid());
        assert!(status.is_invalid());
    }

    #[test]
    fn test_set_value_clears_enclosing_scopes() {
        let fs = formstate()
            .set_syncly_valid("address", None)
            .unwrap()
            .set_syncly_valid("", None)
            .unwrap()
            .set_syncly_valid("name", None)
            .unwrap()
            .set_syncly_valid("address.city", Some("ok"))
            .unwrap();
        let fs = fs.set_value_and_clear_status("address.city", json!("Paris")).unwrap();
        assert_eq!(fs.get_value("address.city").unwrap(), &json!("Paris"));
        assert!(!fs.is_syncly_validated("address.city").unwrap());
        assert!(!fs.is_syncly_validated("address").unwrap());
        assert!(!fs.is_syncly_validated("").unwrap());
        assert!(fs.is_syncly_valid("name").unwrap());
    }

    #[test]
    fn test_edits_share_untouched_state() {
        let fs = Formstate::new(json!({"a": 1, "b": {"big": [1, 2, 3]}}))
            .unwrap()
            .set_syncly_valid("b", Some("ok"))
            .unwrap();
        let b = fs.get_id("b").unwrap();

        let edited = fs.set_value_and_clear_status("a", json!(2)).unwrap();
        assert_eq!(edited.get_value("a").unwrap(), &json!(2));
        assert_eq!(fs.get_value("a").unwrap(), &json!(1));
        assert!(edited.get_value("b").unwrap().ptr_eq(fs.get_value("b").unwrap()));
        assert!(edited.initial_model().ptr_eq(fs.initial_model()));

        let messaged = edited.set_message("a", "Too small.").unwrap();
        assert!(Arc::ptr_eq(&messaged.statuses()[&b], &edited.statuses()[&b]));
    }

    #[test]
    fn test_scopes_do_not_accept_values() {
        let err = formstate()
            .set_value_and_clear_status("address", json!({}))
            .unwrap_err();
        assert!(matches!(err, FormstateError::ScopeValue(key) if key == "address"));
    }

    #[test]
    fn test_changed_propagates_but_blurred_does_not() {
        let fs = formstate().set_changed("address.line1").unwrap();
        assert!(fs.is_changed("address.line1").unwrap());
        assert!(fs.is_changed("address").unwrap());
        assert!(fs.is_changed("").unwrap());
        assert!(!fs.is_changed("name").unwrap());

        let fs = formstate().set_blurred("address.line1").unwrap();
        assert!(fs.is_blurred("address.line1").unwrap());
        assert!(!fs.is_blurred("address").unwrap());
    }

    #[test]
    fn test_messages_are_cleaned() {
        let fs = formstate().set_syncly_invalid("name", Some("   ")).unwrap();
        assert_eq!(fs.get_message("name").unwrap(), "");
        let fs = fs.set_message("name", "Nope.").unwrap();
        assert_eq!(fs.get_message("name").unwrap(), "Nope.");
        let fs = fs.set_syncly_valid("name", None).unwrap();
        assert_eq!(fs.get_message("name").unwrap(), "Nope.");
    }

    #[test]
    fn test_stale_token_is_ignored() {
        let fs = formstate().set_async_started("name", Some("Checking...")).unwrap();
        let first = fs.get_async_token("name").unwrap().unwrap();
        assert!(fs.is_waiting("name").unwrap());
        let fs = fs.set_async_started("name", None).unwrap();
        let second = fs.get_async_token("name").unwrap().unwrap();
        assert_ne!(first, second);

        let stale = fs.set_asyncly_invalid(first, "name", Some("Taken.")).unwrap();
        assert!(stale.is_waiting("name").unwrap());
        assert_eq!(stale.get_message("name").unwrap(), "Checking...");

        let fresh = stale.set_asyncly_valid(second, "name", Some("Available.")).unwrap();
        assert!(!fresh.is_waiting("name").unwrap());
        assert!(fresh.is_asyncly_valid("name").unwrap());
        assert_eq!(fresh.get_message("name").unwrap(), "Available.");
        assert!(fresh.get_async_end_time("name").unwrap() > fresh.get_async_start_time("name").unwrap());
    }

    #[test]
    fn test_async_error_defaults_to_unknown() {
        let fs = formstate().set_async_started("name", None).unwrap();
        let token = fs.get_async_token("name").unwrap().unwrap();
        let fs = fs.set_async_error(token, "name", None, None).unwrap();
        assert_eq!(fs.get_async_error("name").unwrap().map(ReportedError::message), Some("Unknown error."));
        assert!(!fs.is_valid("name").unwrap());
        assert!(!fs.is_invalid("name").unwrap());
    }

    #[test]
    fn test_submitted_without_error_stays_submitted() {
        let fs = formstate().set_submitted("name").unwrap();
        let fs = fs.set_submitting("name").unwrap();
        assert!(fs.is_submitted("name").unwrap());
        let fs = fs.set_submitting("address").unwrap();
        assert!(fs.is_submitting("address").unwrap());
    }

    #[test]
    fn test_custom_properties() {
        let fs = formstate()
            .set_custom_property("name", "hint", json!("Your legal name"))
            .unwrap();
        assert_eq!(
            fs.get_custom_property("name", "hint").unwrap(),
            Some(&json!("Your legal name"))
        );
        assert_eq!(fs.get_custom_property("name", "other").unwrap(), None);
    }
}
