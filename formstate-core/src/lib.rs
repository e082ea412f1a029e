//! Core types for formstate.
//!
//! A [`Formstate`] is an immutable snapshot of a form: the model (a
//! persistent [`Node`] tree), its initial copy, a per-path [`Status`] keyed
//! by stable [`Id`], compiled validation rules and form-level submission
//! state. Every setter returns a new formstate sharing whatever it did not
//! change. A [`Form`] owns the current snapshot and is where
//! asynchronous validation reports back.

mod clock;
mod config;
mod error;
mod form;
mod form_status;
mod formstate;
mod lookup;
mod mutation;
mod node;
pub mod path;
mod schema;
#[deny(missing_docs)]
mod status;
pub mod tree;
mod validation;

pub use crate::clock::{AsyncToken, Stamp};
pub use crate::config::FormConfig;
pub use crate::error::{
    ContractViolation, FormstateError, Result, SchemaError, TreeAction, TreeError,
};
pub use crate::form::{Form, create_nested_scope};
pub use crate::form_status::{
    FormStatus, PendingValidation, Priming, Submit, prime_on_blur, prime_on_change,
    prime_on_change_then_blur, prime_on_submit,
};
pub use crate::formstate::Formstate;
pub use crate::lookup::{Id, Lookup};
pub use crate::node::Node;
pub use crate::schema::{
    FieldRules, FormValidationSchema, SchemaRegistry, ScopeRules, ValidateAsyncFn, ValidateFn,
    ValidationSchema, When,
};
pub use crate::status::{AsyncStatus, ReportedError, Status, Submission, Touched};
pub use crate::validation::{AsyncValidation, Validation, validate_required};
