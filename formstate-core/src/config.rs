//! Form configuration.

use serde::{Deserialize, Serialize};

use crate::form_status::Priming;

fn default_validate_on_blur() -> bool {
    false
}

fn default_priming() -> Priming {
    Priming::OnChange
}

/// Options shared by every view of a [`Form`](crate::Form).
///
/// Deserializes from camelCase keys; missing keys take their defaults.
///
/// ```
/// use formstate_core::{FormConfig, Priming};
///
/// let config: FormConfig = serde_json::from_str(r#"{"validateOnBlur": true}"#).unwrap();
/// assert!(config.validate_on_blur);
/// assert_eq!(config.priming, Priming::OnChange);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    /// Validate a field syncly and asyncly when it is blurred, even if it
    /// was not changed.
    #[serde(default = "default_validate_on_blur")]
    pub validate_on_blur: bool,
    /// When an invalid path is ready to show its message.
    #[serde(default = "default_priming")]
    pub priming: Priming,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on_blur: default_validate_on_blur(),
            priming: default_priming(),
        }
    }
}

impl FormConfig {
    #[must_use]
    pub fn validate_on_blur(mut self, validate_on_blur: bool) -> Self {
        self.validate_on_blur = validate_on_blur;
        self
    }

    #[must_use]
    pub fn priming(mut self, priming: Priming) -> Self {
        self.priming = priming;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config: FormConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FormConfig::default());
        let config: FormConfig = serde_json::from_str(r#"{"priming": "onChangeThenBlur"}"#).unwrap();
        assert_eq!(config.priming, Priming::OnChangeThenBlur);
        assert!(!config.validate_on_blur);
    }

    #[test]
    fn test_builder() {
        let config = FormConfig::default()
            .validate_on_blur(true)
            .priming(Priming::OnSubmit);
        assert!(config.validate_on_blur);
        assert_eq!(config.priming, Priming::OnSubmit);
    }
}
