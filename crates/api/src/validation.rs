//! Request field validation.
//!
//! Handlers collect every problem with a request body before answering, so
//! clients can show all field errors at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Field name to error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// An empty set of errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error against `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Record an error when `failed` is true.
    pub fn check(&mut self, failed: bool, field: &str, message: &str) {
        if failed {
            self.add(field, message);
        }
    }

    /// Whether no errors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when empty, otherwise the errors.
    ///
    /// # Errors
    ///
    /// Returns `self` if any error was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Trim a required text field, recording an error when it is blank.
pub fn required_text(errors: &mut FieldErrors, field: &str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, format!("{field} is required"));
    }
    value.to_owned()
}

/// Trim an optional text field, mapping blank to `None`.
#[must_use]
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Whether `phone` is 7-20 characters of digits, `+`, `-` and spaces with at
/// least 7 digits.
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    let phone = phone.trim();
    (7..=20).contains(&phone.len())
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '))
        && phone.chars().filter(char::is_ascii_digit).count() >= 7
}

/// Deserialize a field that distinguishes "absent" from `null`.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent is `None`, `null` is `Some(None)`.
///
/// # Errors
///
/// Returns the inner deserializer's error.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_collects_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("name", "name is required");
        errors.add("name", "name is too long");
        errors.check(true, "price", "price must be positive");
        errors.check(false, "stock", "unused");

        assert_eq!(errors.get("name").unwrap().len(), 2);
        assert!(errors.get("stock").is_none());
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({
                "name": ["name is required", "name is too long"],
                "price": ["price must be positive"],
            })
        );
    }

    #[test]
    fn test_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());
        let mut errors = FieldErrors::new();
        errors.add("email", "bad");
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_required_text_trims() {
        let mut errors = FieldErrors::new();
        assert_eq!(required_text(&mut errors, "name", "  Mug "), "Mug");
        assert!(errors.is_empty());
        required_text(&mut errors, "name", "   ");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_nullable_distinguishes_null_from_absent() {
        #[derive(Deserialize)]
        struct Patch {
            #[serde(default, deserialize_with = "nullable")]
            parent_id: Option<Option<i32>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.parent_id, None);
        let null: Patch = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(null.parent_id, Some(None));
        let set: Patch = serde_json::from_str(r#"{"parent_id": 4}"#).unwrap();
        assert_eq!(set.parent_id, Some(Some(4)));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+880 1711-000000"));
        assert!(is_valid_phone("01711000000"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("0171100000x"));
        assert!(!is_valid_phone("+ - - - - - - -"));
        assert!(!is_valid_phone(&"1".repeat(21)));
    }
}
