//! Stock-keeping unit codes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Sku`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SkuError {
    /// The input is empty after trimming.
    #[error("sku cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("sku must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside `[A-Za-z0-9_-]`.
    #[error("sku contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// A per-product inventory code, stored uppercase.
///
/// ```
/// use bazaar_core::Sku;
///
/// assert_eq!(Sku::parse(" tee-blk-m ").unwrap().as_str(), "TEE-BLK-M");
/// assert!(Sku::parse("tee blk").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Maximum length of a SKU.
    pub const MAX_LENGTH: usize = 64;

    /// Parse and normalize a SKU.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, too long, or contains
    /// anything other than ASCII letters, digits, `-` and `_`.
    pub fn parse(s: &str) -> Result<Self, SkuError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SkuError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SkuError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SkuError::InvalidCharacter(bad));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// Returns the SKU as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Sku {
    type Err = SkuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uppercases() {
        assert_eq!(Sku::parse("abc-123_x").unwrap().as_str(), "ABC-123_X");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Sku::parse("   "), Err(SkuError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        assert!(matches!(
            Sku::parse(&"A".repeat(65)),
            Err(SkuError::TooLong { max: 64 })
        ));
    }

    #[test]
    fn test_parse_rejects_spaces_and_symbols() {
        assert_eq!(Sku::parse("AB CD"), Err(SkuError::InvalidCharacter(' ')));
        assert_eq!(Sku::parse("AB#1"), Err(SkuError::InvalidCharacter('#')));
    }
}
