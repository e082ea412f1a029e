//! # formstate
//!
//! Immutable form state with per-path validation status, asynchronous
//! validation that tolerates out-of-order results, and a submission
//! lifecycle.
//!
//! ## Example
//!
//! ```rust
//! use formstate::{
//!     FieldRules, Form, FormValidationSchema, Formstate, SubmissionOutcome,
//!     drive_form_submission, handle_change,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> formstate::Result<()> {
//! let schema = FormValidationSchema::new().field("email", FieldRules::new().required());
//! let form = Form::new(Formstate::initialize(json!({"email": ""}), &schema)?);
//!
//! let email = form.get_formstate().get_id("email")?;
//! handle_change(&form, json!("ada@example.com"), email)?;
//!
//! let outcome = drive_form_submission(&form, |model, _form| async move {
//!     model["email"].clone()
//! })
//! .await?;
//! assert_eq!(outcome, SubmissionOutcome::Submitted(json!("ada@example.com")));
//! # Ok(())
//! # }
//! ```

mod handlers;
mod submission;

#[doc(inline)]
pub use crate::handlers::{handle_blur, handle_change};
#[doc(inline)]
pub use crate::submission::{SubmissionOutcome, drive_form_submission};
#[doc(inline)]
pub use formstate_core::*;
