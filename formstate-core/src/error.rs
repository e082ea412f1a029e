//! Error types shared by every formstate operation.

use std::fmt;

use crate::lookup::Id;

/// Result alias used throughout the crate.
pub type Result<T, E = FormstateError> = std::result::Result<T, E>;

/// Error returned by formstate transformations and queries.
///
/// Errors always surface to the immediate caller; no operation swallows them.
#[derive(Debug, thiserror::Error)]
pub enum FormstateError {
    /// The validation schema is malformed or conflicts with another schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A tree operation could not be applied to the model.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// No id is registered for the root model key.
    #[error("Could not find id for root model key \"{0}\".")]
    UnknownModelKey(String),
    /// The id is not registered in the lookup.
    #[error("Could not find root model key for id {0}.")]
    UnknownId(Id),
    /// The initial model is neither an object nor an array.
    #[error("The initial model must be an object or an array.")]
    ModelNotContainer,
    /// Values of scopes are derived from their fields and cannot be set.
    #[error("Cannot set the value of scope \"{0}\". Only fields accept values.")]
    ScopeValue(String),
    /// A validator broke the contract of the orchestrator.
    #[error("Validator for model key \"{path}\" {problem}.")]
    ValidatorContract {
        /// Root model key being validated.
        path: String,
        /// Description of the violation.
        problem: ContractViolation,
    },
    /// A submission was started from a nested scope view.
    #[error("A nested scope cannot start a form submission.")]
    NestedSubmission,
    /// A submission was started while another one is in flight.
    #[error("The form is already submitting.")]
    AlreadySubmitting,
    /// The model could not be converted to or from a typed value.
    #[error("Model conversion failed: {0}")]
    Model(#[from] serde_json::Error),
    /// Error raised by caller-supplied validator code.
    #[error("{0}")]
    Custom(String),
}

impl FormstateError {
    /// Builds an error for caller-defined failures inside validators.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Kinds of validator contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// `Validation::Invalid` carried a blank message.
    BlankMessage,
    /// The updated formstate does not belong to the validated form.
    ForeignFormstate,
    /// A pending result named a token not present on any status.
    UnknownToken,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlankMessage => write!(f, "returned an invalid result without a message"),
            Self::ForeignFormstate => write!(f, "returned a formstate from a different form"),
            Self::UnknownToken => {
                write!(f, "returned a pending result whose token was never started")
            }
        }
    }
}

/// Errors raised while normalizing, building or registering schemas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The same normalized model key was declared more than once.
    #[error("The model key \"{0}\" may only have one validation schema defined.")]
    Duplicate(String),
    /// A declared model key does not exist in the model.
    #[error("The model key \"{0}\" from the validation schema is not in the model.")]
    NotInModel(String),
    /// The empty path was declared as a field.
    #[error("The root scope cannot be overridden as a field.")]
    RootAsField,
    /// A scope was declared on a value that is not an object or an array.
    #[error("Root model key \"{0}\" cannot be defined as a scope. Only objects and arrays are scopes.")]
    ScopeNotContainer(String),
    /// Field rules were registered for a scope or the reverse.
    #[error("Model key \"{path}\" is a {actual}, not a {expected}.")]
    KindMismatch {
        /// Root model key of the registration.
        path: String,
        /// Kind the registration asked for.
        expected: &'static str,
        /// Kind found in the lookup.
        actual: &'static str,
    },
    /// Rules were registered on the form for a key that already has a schema
    /// baked into the formstate.
    #[error("Model key \"{0}\" already has a validation schema in the formstate.")]
    AlreadyInFormstate(String),
    /// Rules were registered for the same key from two different scopes.
    #[error("Model key \"{0}\" has validation rules registered from more than one scope.")]
    RegisteredTwice(String),
    /// Nested schemas can only be declared when building a formstate.
    #[error("Scope \"{0}\" declares a nested schema, which can only be baked into a formstate.")]
    NestedRegistration(String),
}

/// The tree operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeAction {
    /// Replace an existing value.
    Update,
    /// Insert a new key.
    Add,
    /// Remove a key.
    Delete,
}

impl fmt::Display for TreeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update model key"),
            Self::Add => write!(f, "add model key"),
            Self::Delete => write!(f, "delete model key"),
        }
    }
}

impl TreeAction {
    fn preposition(self) -> &'static str {
        match self {
            Self::Update => "in",
            Self::Add => "to",
            Self::Delete => "from",
        }
    }
}

/// Errors raised by the tree-mutation engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The path does not resolve in the model.
    #[error("Unable to get model key \"{path}\" from model {model}.")]
    NotFound {
        /// Path that was requested.
        path: String,
        /// JSON rendering of the model.
        model: String,
    },
    /// The path could not be updated, added or deleted.
    #[error("Unable to {action} \"{path}\" {} model {model}.", .action.preposition())]
    Rejected {
        /// The failed operation.
        action: TreeAction,
        /// Path that was requested.
        path: String,
        /// JSON rendering of the model.
        model: String,
    },
}
