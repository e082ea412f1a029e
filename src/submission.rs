//! The submission driver.

use std::future::Future;

use formstate_core::{Form, Result};
use futures::future::join_all;
use serde_json::Value;

/// How a call to [`drive_form_submission`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome<T> {
    /// A submission was already running, or the form is closed. Nothing
    /// was done.
    Skipped,
    /// The model was not valid once validation settled. The submission was
    /// closed and input re-enabled.
    Cancelled,
    /// The model was valid and handed to the submit action, which returned
    /// this value. The submission is left open.
    Submitted(T),
}

/// Validates the whole form and, if the model is valid, submits it.
///
/// Starts a submission (input disabled, every path submitting), validates
/// syncly and asyncly, then waits for every outstanding async validation.
/// An invalid model cancels the submission. A valid one is passed to
/// `submit_valid_model` after yielding once to the runtime. The submit
/// action owns the rest of the lifecycle: close it with
/// [`Formstate::set_form_submitted`](formstate_core::Formstate::set_form_submitted)
/// and friends through the form it is given.
///
/// Fails when `form` is a nested view.
pub async fn drive_form_submission<F, Fut, T>(
    form: &Form,
    submit_valid_model: F,
) -> Result<SubmissionOutcome<T>>
where
    F: FnOnce(Value, Form) -> Fut,
    Fut: Future<Output = T>,
{
    let mut started = false;
    form.set_formstate(|formstate| {
        started = false;
        if formstate.is_form_submitting() {
            return Ok(formstate);
        }
        started = true;
        formstate
            .start_form_submission()?
            .syncly_validate_form(form)?
            .asyncly_validate_form(form)
    })?;
    if !started || form.is_closed() {
        tracing::debug!("form submission skipped");
        return Ok(SubmissionOutcome::Skipped);
    }

    let promises = form.get_formstate().get_promises();
    tracing::debug!(pending = promises.len(), "awaiting async validation");
    join_all(promises).await;

    let mut model = None;
    form.set_formstate(|formstate| {
        if !formstate.is_model_valid() {
            model = None;
            return formstate.cancel_form_submission();
        }
        model = Some(formstate.model().to_value());
        Ok(formstate)
    })?;
    if form.is_closed() {
        return Ok(SubmissionOutcome::Skipped);
    }
    let Some(model) = model else {
        return Ok(SubmissionOutcome::Cancelled);
    };

    tokio::task::yield_now().await;
    tracing::debug!("submitting valid model");
    Ok(SubmissionOutcome::Submitted(
        submit_valid_model(model, form.clone()).await,
    ))
}
