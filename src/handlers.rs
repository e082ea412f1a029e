//! Input event handlers.
//!
//! Both handlers address the path by [`Id`] and are no-ops while input is
//! disabled, e.g. during a submission.

use formstate_core::{Form, Id, Result};
use serde_json::Value;

/// Writes `value` to the path `id`, marks it changed and validates it syncly
/// then asyncly.
pub fn handle_change(form: &Form, value: Value, id: Id) -> Result<()> {
    form.set_formstate(|formstate| {
        if formstate.is_input_disabled() {
            return Ok(formstate);
        }
        let model_key = formstate.get_model_key(id)?;
        formstate.change_and_validate(&model_key, value.clone(), form)
    })
}

/// Marks the path `id` blurred.
///
/// Outside a submission the path is then validated: syncly and asyncly when
/// the form validates on blur, otherwise only asyncly and only if the path
/// was changed. A field tabbed through untouched is left alone.
pub fn handle_blur(form: &Form, id: Id) -> Result<()> {
    let validate_on_blur = form.config().validate_on_blur;
    form.set_formstate(|formstate| {
        if formstate.is_input_disabled() {
            return Ok(formstate);
        }
        let model_key = formstate.get_model_key(id)?;
        let formstate = formstate.set_blurred(&model_key)?;
        if formstate.is_form_submitting() {
            return Ok(formstate);
        }
        if validate_on_blur {
            formstate
                .syncly_validate(&model_key, form)?
                .asyncly_validate(&model_key, form)
        } else if formstate.is_changed(&model_key)? {
            formstate.asyncly_validate(&model_key, form)
        } else {
            Ok(formstate)
        }
    })
}

#[cfg(test)]
mod tests {
    use formstate_core::{FieldRules, FormConfig, FormValidationSchema, Formstate, Validation};
    use serde_json::json;

    use super::*;

    fn form(config: FormConfig) -> Form {
        let schema = FormValidationSchema::new().field(
            "age",
            FieldRules::new().required().validate(|value, _, _, _| {
                Ok(match value.as_i64() {
                    Some(age) if age >= 18 => Validation::Valid,
                    _ => Validation::invalid("Must be an adult."),
                })
            }),
        );
        let formstate = Formstate::initialize(json!({"age": null}), &schema).unwrap();
        Form::with_config(formstate, config)
    }

    fn age_id(form: &Form) -> Id {
        form.get_formstate().get_id("age").unwrap()
    }

    #[test]
    fn test_change_validates() {
        let form = form(FormConfig::default());
        let id = age_id(&form);
        handle_change(&form, json!(12), id).unwrap();
        let formstate = form.get_formstate();
        assert_eq!(formstate.get_value("age").unwrap(), &json!(12));
        assert!(formstate.is_changed("age").unwrap());
        assert_eq!(formstate.get_message("age").unwrap(), "Must be an adult.");
    }

    #[test]
    fn test_change_ignored_while_input_disabled() {
        let form = form(FormConfig::default());
        let id = age_id(&form);
        form.set_formstate(|formstate| Ok(formstate.set_input_disabled()))
            .unwrap();
        handle_change(&form, json!(30), id).unwrap();
        assert_eq!(form.get_formstate().get_value("age").unwrap(), &json!(null));
    }

    #[test]
    fn test_blur_without_change_skips_validation() {
        let form = form(FormConfig::default());
        let id = age_id(&form);
        handle_blur(&form, id).unwrap();
        let formstate = form.get_formstate();
        assert!(formstate.is_blurred("age").unwrap());
        assert!(!formstate.is_syncly_validated("age").unwrap());
    }

    #[test]
    fn test_blur_validates_when_configured() {
        let form = form(FormConfig::default().validate_on_blur(true));
        let id = age_id(&form);
        handle_blur(&form, id).unwrap();
        let formstate = form.get_formstate();
        assert!(formstate.is_syncly_invalid("age").unwrap());
        assert_eq!(formstate.get_message("age").unwrap(), "Age is required.");
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let form = form(FormConfig::default());
        let other = Formstate::new(json!({"x": 1})).unwrap();
        let foreign = other.get_id("x").unwrap();
        assert!(handle_change(&form, json!(1), foreign).is_err());
    }
}
