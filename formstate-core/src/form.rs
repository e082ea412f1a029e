//! The shared form handle.
//!
//! A [`Form`] owns the current [`Formstate`] of one form and the rules
//! registered on it. Event handlers and async validators update the form
//! through [`Form::set_formstate`]; UI glue re-renders from
//! [`Form::subscribe`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::config::FormConfig;
use crate::error::{Result, SchemaError};
use crate::form_status::PendingValidation;
use crate::formstate::Formstate;
use crate::lookup::Id;
use crate::schema::{FieldRules, ScopeRules, SchemaRegistry, ValidationSchema, compile_field, compile_scope};

struct Shared {
    store: watch::Sender<Formstate>,
    revision: AtomicU64,
    closed: AtomicBool,
    schemas: SchemaRegistry,
    config: FormConfig,
}

/// Handle to the live state of a form.
///
/// Clones are cheap and share the same state. A handle can be a view of a
/// nested scope (see [`create_nested_scope`]): formstates it hands out are
/// framed to that scope, and formstates it stores are re-rooted.
///
/// # Example
///
/// ```rust
/// use formstate_core::{Form, Formstate};
/// use serde_json::json;
///
/// let form = Form::new(Formstate::new(json!({"name": ""}))?);
/// form.set_formstate(|formstate| formstate.set_value_and_clear_status("name", json!("Ada")))?;
/// assert_eq!(form.get_formstate().get_value("name")?, &json!("Ada"));
/// # Ok::<(), formstate_core::FormstateError>(())
/// ```
#[derive(Clone)]
pub struct Form {
    shared: Arc<Shared>,
    nested_scope_id: Option<Id>,
}

impl Form {
    /// Creates a form holding `formstate` with the default configuration.
    #[must_use]
    pub fn new(formstate: Formstate) -> Self {
        Self::with_config(formstate, FormConfig::default())
    }

    #[must_use]
    pub fn with_config(formstate: Formstate, config: FormConfig) -> Self {
        start_promises(&formstate);
        let (store, _) = watch::channel(formstate.nested(None));
        Self {
            shared: Arc::new(Shared {
                store,
                revision: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                schemas: SchemaRegistry::new(),
                config,
            }),
            nested_scope_id: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.shared.config
    }

    /// Rules registered on this form, shared by all of its views.
    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.shared.schemas
    }

    /// The scope this view is framed to, if any.
    #[must_use]
    pub fn nested_scope_id(&self) -> Option<Id> {
        self.nested_scope_id
    }

    /// View of the same form framed to `scope_id`.
    #[must_use]
    pub fn nested(&self, scope_id: Option<Id>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            nested_scope_id: scope_id,
        }
    }

    /// The current formstate, framed to this view.
    #[must_use]
    pub fn get_formstate(&self) -> Formstate {
        self.shared.store.borrow().nested(self.nested_scope_id)
    }

    /// Receiver notified after every stored update. Values are root-framed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Formstate> {
        self.shared.store.subscribe()
    }

    /// Waits until `predicate` holds for the current formstate (framed to
    /// this view) and returns it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<Formstate, watch::error::RecvError>
    where
        F: FnMut(&Formstate) -> bool,
    {
        let mut rx = self.subscribe();
        loop {
            let current = rx.borrow_and_update().nested(self.nested_scope_id);
            if predicate(&current) {
                return Ok(current);
            }
            rx.changed().await?;
        }
    }

    /// Applies `update` to the current formstate and stores the result.
    ///
    /// The updater runs without holding the store. If another update lands
    /// in the meantime, the result is discarded and `update` runs again on
    /// the newer formstate. An error from `update` leaves the store as it
    /// was. Closed forms ignore updates.
    ///
    /// Async validations registered by the stored formstate are started
    /// once it is stored; those of a discarded result never run.
    pub fn set_formstate<F>(&self, mut update: F) -> Result<()>
    where
        F: FnMut(Formstate) -> Result<Formstate>,
    {
        loop {
            if self.is_closed() {
                return Ok(());
            }
            let (revision, current) = {
                let current = self.shared.store.borrow();
                let revision = self.shared.revision.load(Ordering::Acquire);
                (revision, current.nested(self.nested_scope_id))
            };
            let next = update(current)?.nested(None);
            let promises = next.get_promises();

            let mut applied = false;
            self.shared.store.send_if_modified(|slot| {
                if self.shared.revision.load(Ordering::Acquire) != revision {
                    return false;
                }
                self.shared.revision.store(revision + 1, Ordering::Release);
                *slot = next;
                applied = true;
                true
            });
            if applied {
                promises.iter().for_each(PendingValidation::start);
                return Ok(());
            }
            tracing::debug!(revision, "formstate changed during update, retrying");
        }
    }

    /// Stores `formstate` as is (re-rooted).
    pub fn replace_formstate(&self, formstate: Formstate) {
        if self.is_closed() {
            return;
        }
        start_promises(&formstate);
        self.shared.store.send_modify(|slot| {
            self.shared.revision.fetch_add(1, Ordering::AcqRel);
            *slot = formstate.nested(None);
        });
    }

    /// Stops accepting updates, for example once the UI owning the form is
    /// gone and late async results should be dropped.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether some path is invalid and primed under the configured
    /// [`Priming`](crate::Priming).
    pub fn is_primed_model_invalid(&self) -> Result<bool> {
        let priming = self.shared.config.priming;
        self.get_formstate()
            .is_primed_model_invalid(|formstate, model_key| priming.is_primed(formstate, model_key))
    }

    /// Registers field rules for `model_key`, resolved through the frame of
    /// `formstate`.
    ///
    /// Fails when the path is a scope, when the formstate already has rules
    /// baked in for it, or when rules were registered for it from another
    /// scope. Rules with nothing to check are ignored.
    pub fn register_field_rules(
        &self,
        formstate: &Formstate,
        model_key: &str,
        rules: &FieldRules,
    ) -> Result<()> {
        self.register(formstate, model_key, false, |root_model_key, nested_scope_id| {
            Ok(compile_field(rules, root_model_key, nested_scope_id))
        })
    }

    /// Registers scope rules for `model_key`. Nested schemas cannot be
    /// registered this way.
    pub fn register_scope_rules(
        &self,
        formstate: &Formstate,
        model_key: &str,
        rules: &ScopeRules,
    ) -> Result<()> {
        self.register(formstate, model_key, true, |root_model_key, nested_scope_id| {
            compile_scope(rules, root_model_key, nested_scope_id)
        })
    }

    /// Removes `model_key` from the stored formstate and forgets the rules
    /// registered on this form for every path removed with it.
    pub fn delete_model_key(&self, model_key: &str) -> Result<()> {
        self.set_formstate(|formstate| formstate.delete_model_key(model_key))?;
        self.prune_schemas();
        Ok(())
    }

    /// [`Form::delete_model_key`], then syncly validates the parent scope.
    pub fn delete_model_key_and_validate_parent_scope(&self, model_key: &str) -> Result<()> {
        self.set_formstate(|formstate| {
            formstate.delete_model_key_and_validate_parent_scope(model_key, self)
        })?;
        self.prune_schemas();
        Ok(())
    }

    fn prune_schemas(&self) {
        let formstate = self.get_formstate();
        let dropped = self
            .shared
            .schemas
            .retain(|id| formstate.get_root_model_key(id).is_ok());
        if dropped > 0 {
            tracing::trace!(dropped, "unregistered rules of deleted paths");
        }
    }

    fn register<F>(&self, formstate: &Formstate, model_key: &str, as_scope: bool, compile: F) -> Result<()>
    where
        F: FnOnce(&str, Option<Id>) -> Result<ValidationSchema, SchemaError>,
    {
        let id = formstate.get_id(model_key)?;
        let root_model_key = formstate.get_root_model_key(id)?;
        let is_scope = formstate.is_scope(id);
        if is_scope != as_scope {
            return Err(SchemaError::KindMismatch {
                path: root_model_key.to_owned(),
                expected: kind(as_scope),
                actual: kind(is_scope),
            }
            .into());
        }

        let schema = compile(root_model_key, formstate.nested_scope_id())?;
        if schema.is_empty() {
            return Ok(());
        }
        if formstate.validation_schemas().contains_key(&id) {
            return Err(SchemaError::AlreadyInFormstate(root_model_key.to_owned()).into());
        }
        self.shared.schemas.register(id, root_model_key, schema)?;
        tracing::trace!(%id, root_model_key, "registered form rules");
        Ok(())
    }
}

fn start_promises(formstate: &Formstate) {
    formstate.get_promises().iter().for_each(PendingValidation::start);
}

fn kind(is_scope: bool) -> &'static str {
    if is_scope { "scope" } else { "field" }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("nested_scope_id", &self.nested_scope_id)
            .field("config", &self.shared.config)
            .field("schemas", &self.shared.schemas)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Frames both a formstate and its form to `scope_id` (`None` for the root).
///
/// Keys passed to the returned formstate are relative to the scope. The
/// returned form hands out framed formstates and re-roots what it stores,
/// so updates made through it land in the root form.
#[must_use]
pub fn create_nested_scope(
    scope_id: Option<Id>,
    formstate: &Formstate,
    form: &Form,
) -> (Formstate, Form) {
    (formstate.nested(scope_id), form.nested(scope_id))
}
