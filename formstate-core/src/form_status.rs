//! Form-wide status: the submission lifecycle, input locking, outstanding
//! async work, and validity aggregated over the whole model.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{AsyncToken, Stamp};
use crate::error::Result;
use crate::formstate::Formstate;
use crate::lookup::Id;
use crate::status::ReportedError;

/// Handle to the future running an async validation.
///
/// Clones share the same underlying work, so the form can hold one copy
/// while [`drive_form_submission`](../../formstate/fn.drive_form_submission.html)
/// awaits another. Nothing runs until the handle is started or awaited: a
/// [`Form`](crate::Form) starts the handles of every formstate it stores,
/// so work from an update that was discarded never begins.
#[derive(Clone)]
pub struct PendingValidation {
    job: Shared<BoxFuture<'static, ()>>,
    started: Arc<AtomicBool>,
}

impl PendingValidation {
    /// Wraps `future` without polling it.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = AssertUnwindSafe(future).catch_unwind().map(|outcome| {
            if outcome.is_err() {
                tracing::warn!("async validation panicked");
            }
        });
        Self {
            job: job.boxed().shared(),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the work on the current Tokio runtime, once across all
    /// clones. Outside a runtime the work runs when a handle is awaited.
    pub fn start(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if !self.started.swap(true, Ordering::AcqRel) {
            handle.spawn(self.job.clone());
        }
    }

    /// Whether [`PendingValidation::start`] spawned the work.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl Future for PendingValidation {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.job.poll_unpin(cx)
    }
}

impl fmt::Debug for PendingValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValidation")
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

/// Record of the current (or latest) submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submit {
    pub started: Option<Stamp>,
    pub finished: Option<Stamp>,
    /// `Some(false)` if the model was invalid when the submission finished,
    /// `Some(true)` if it was valid, `None` if neither could be decided.
    pub valid: Option<bool>,
    /// Paths whose async validation errored during the submission.
    pub async_error_model_keys: Option<Vec<String>>,
    pub submission_error: Option<ReportedError>,
}

/// Form-level state carried by every [`Formstate`].
#[derive(Debug, Clone, Default)]
pub struct FormStatus {
    pub(crate) submit: Submit,
    pub(crate) submit_history: Arc<Vec<Formstate>>,
    pub(crate) input_disabled: bool,
    pub(crate) custom: Arc<BTreeMap<String, Value>>,
    pub(crate) promises: Arc<BTreeMap<AsyncToken, PendingValidation>>,
}

impl FormStatus {
    #[must_use]
    pub fn submit(&self) -> &Submit {
        &self.submit
    }
}

impl Formstate {
    /// Some path is waiting on async validation.
    #[must_use]
    pub fn is_form_waiting(&self) -> bool {
        self.statuses.values().any(|status| status.is_waiting())
    }

    fn async_error_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.statuses
            .iter()
            .filter(|(_, status)| status.async_status.error.is_some())
            .map(|(id, _)| *id)
    }

    /// Some path has an async error.
    #[must_use]
    pub fn is_form_async_error(&self) -> bool {
        self.async_error_ids().next().is_some()
    }

    /// Root model keys of every path with an async error.
    pub fn get_form_async_error_model_keys(&self) -> Result<Vec<String>> {
        self.async_error_ids()
            .map(|id| self.get_root_model_key(id).map(str::to_owned))
            .collect()
    }

    fn async_finished_during_submit(&self, id: Id) -> bool {
        let Some(async_end) = self.status_by_id(id).async_status.finished else {
            return false;
        };
        let submit = &self.form_status.submit;
        submit.started.is_some_and(|start| start < async_end)
            && submit.finished.is_none_or(|end| async_end <= end)
    }

    /// Async validation of `model_key` finished inside the current
    /// submission window.
    pub fn was_async_error_during_submit(&self, model_key: &str) -> Result<bool> {
        Ok(self.async_finished_during_submit(self.get_id(model_key)?))
    }

    #[must_use]
    pub fn is_input_disabled(&self) -> bool {
        self.form_status.input_disabled
    }

    #[must_use]
    pub fn is_form_submitting(&self) -> bool {
        self.form_status.submit.started.is_some() && self.form_status.submit.finished.is_none()
    }

    /// The root was submitted and nothing changed since.
    #[must_use]
    pub fn is_form_submitted_and_unchanged(&self) -> bool {
        self.root_id()
            .is_some_and(|root| self.status_by_id(root).is_submitted())
    }

    #[must_use]
    pub fn get_form_submission_start_time(&self) -> Option<Stamp> {
        self.form_status.submit.started
    }

    #[must_use]
    pub fn get_form_submission_end_time(&self) -> Option<Stamp> {
        self.form_status.submit.finished
    }

    #[must_use]
    pub fn get_form_submission_validity(&self) -> Option<bool> {
        self.form_status.submit.valid
    }

    #[must_use]
    pub fn get_form_submission_async_error_model_keys(&self) -> Option<&[String]> {
        self.form_status.submit.async_error_model_keys.as_deref()
    }

    #[must_use]
    pub fn get_form_submission_error(&self) -> Option<&ReportedError> {
        self.form_status.submit.submission_error.as_ref()
    }

    /// Snapshots taken at the end of every submission, newest first.
    #[must_use]
    pub fn get_form_submission_history(&self) -> &[Formstate] {
        &self.form_status.submit_history
    }

    /// The last submission finished valid and without a submission error.
    #[must_use]
    pub fn was_successful_submit(&self) -> bool {
        !self.is_form_submitting()
            && self.form_status.submit.valid == Some(true)
            && self.form_status.submit.submission_error.is_none()
    }

    #[must_use]
    pub fn get_form_custom_property(&self, name: &str) -> Option<&Value> {
        self.form_status.custom.get(name)
    }

    /// Every path in the model is valid. Evaluated at the root frame.
    #[must_use]
    pub fn is_model_valid(&self) -> bool {
        self.lookup
            .entries()
            .all(|(id, _)| self.status_by_id(id).is_valid())
    }

    /// Some path is invalid.
    #[must_use]
    pub fn is_model_invalid(&self) -> bool {
        self.statuses.values().any(|status| status.is_invalid())
    }

    /// Some path is invalid and primed, i.e. ready to show its error.
    ///
    /// `is_primed` receives the root-framed formstate and a root model key.
    pub fn is_primed_model_invalid<F>(&self, is_primed: F) -> Result<bool>
    where
        F: Fn(&Formstate, &str) -> Result<bool>,
    {
        let root = self.nested(None);
        for (id, status) in root.statuses.iter() {
            if !status.is_invalid() {
                continue;
            }
            let root_model_key = root.get_root_model_key(*id)?;
            if is_primed(&root, root_model_key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Futures of every outstanding async validation.
    #[must_use]
    pub fn get_promises(&self) -> Vec<PendingValidation> {
        self.form_status.promises.values().cloned().collect()
    }

    /// Starts a submission record and marks every path submitting.
    #[must_use]
    pub fn set_form_submitting(&self) -> Self {
        let mut next = self.clone();
        next.form_status.submit = Submit {
            started: Some(Stamp::now()),
            ..Submit::default()
        };
        next.mark_unsubmitted(|formstate, id| formstate.set_submitting_by_id(id));
        next
    }

    /// Marks every path submitting, except those already submitted without
    /// an async error.
    #[must_use]
    pub fn mark_unsubmitted_statuses_submitting(&self) -> Self {
        let mut next = self.clone();
        next.mark_unsubmitted(|formstate, id| formstate.set_submitting_by_id(id));
        next
    }

    fn mark_unsubmitted(&mut self, mut mark: impl FnMut(&mut Self, Id)) {
        let ids: Vec<Id> = self.lookup.entries().map(|(id, _)| id).collect();
        for id in ids {
            mark(self, id);
        }
    }

    /// Closes the submission record, captures a snapshot in the history and
    /// marks every path submitted.
    pub fn set_form_submitted(&self) -> Result<Self> {
        let mut next = self.clone();
        next.form_status.submit.finished = Some(Stamp::now());
        next.form_status.submit.valid = if next.is_model_invalid() {
            Some(false)
        } else if next.is_model_valid() {
            Some(true)
        } else {
            None
        };

        let async_error_model_keys = next
            .async_error_ids()
            .filter(|id| next.async_finished_during_submit(*id))
            .map(|id| next.get_root_model_key(id).map(str::to_owned))
            .collect::<Result<Vec<_>>>()?;
        if !async_error_model_keys.is_empty() {
            next.form_status.submit.async_error_model_keys = Some(async_error_model_keys);
        }

        let snapshot = next.clone();
        Arc::make_mut(&mut next.form_status.submit_history).insert(0, snapshot);
        Ok(next.mark_all_statuses_submitted())
    }

    /// Marks every path submitted.
    #[must_use]
    pub fn mark_all_statuses_submitted(&self) -> Self {
        let mut next = self.clone();
        next.mark_unsubmitted(|formstate, id| formstate.set_submitted_by_id(id));
        next
    }

    /// Records a failure of the caller's submit action. `None` records
    /// [`ReportedError::unknown`].
    #[must_use]
    pub fn set_form_submission_error(&self, error: Option<ReportedError>) -> Self {
        let mut next = self.clone();
        next.form_status.submit.submission_error = Some(error.unwrap_or_else(ReportedError::unknown));
        next
    }

    #[must_use]
    pub fn set_input_disabled(&self) -> Self {
        let mut next = self.clone();
        next.form_status.input_disabled = true;
        next
    }

    #[must_use]
    pub fn set_input_enabled(&self) -> Self {
        let mut next = self.clone();
        next.form_status.input_disabled = false;
        next
    }

    #[must_use]
    pub fn set_form_custom_property(&self, name: &str, value: Value) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.form_status.custom).insert(name.to_owned(), value);
        next
    }
}

/// Primed once submitted, once async validation has produced anything, or
/// while submitting after all async work settled.
pub fn prime_on_submit(formstate: &Formstate, model_key: &str) -> Result<bool> {
    let status = formstate.status(model_key)?;
    if status.is_submitted() {
        return Ok(true);
    }
    if status.is_waiting() || status.is_asyncly_validated() || status.async_status.error.is_some() {
        return Ok(true);
    }
    Ok(status.is_submitting() && !formstate.is_form_waiting())
}

pub fn prime_on_change(formstate: &Formstate, model_key: &str) -> Result<bool> {
    Ok(prime_on_submit(formstate, model_key)? || formstate.is_changed(model_key)?)
}

pub fn prime_on_blur(formstate: &Formstate, model_key: &str) -> Result<bool> {
    Ok(prime_on_submit(formstate, model_key)? || formstate.is_blurred(model_key)?)
}

pub fn prime_on_change_then_blur(formstate: &Formstate, model_key: &str) -> Result<bool> {
    Ok(prime_on_submit(formstate, model_key)?
        || (formstate.is_changed(model_key)? && formstate.is_blurred(model_key)?))
}

/// Built-in priming strategies, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priming {
    #[default]
    OnChange,
    OnBlur,
    OnChangeThenBlur,
    OnSubmit,
}

impl Priming {
    /// Whether `model_key` is primed under this strategy.
    pub fn is_primed(self, formstate: &Formstate, model_key: &str) -> Result<bool> {
        match self {
            Self::OnChange => prime_on_change(formstate, model_key),
            Self::OnBlur => prime_on_blur(formstate, model_key),
            Self::OnChangeThenBlur => prime_on_change_then_blur(formstate, model_key),
            Self::OnSubmit => prime_on_submit(formstate, model_key),
        }
    }
}
