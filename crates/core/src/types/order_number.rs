//! Human-facing order numbers.
//!
//! Format: `ORD-YYMMDD-XXXXXXXX`, where the date is the UTC placement date and
//! the suffix is eight characters from an alphabet without look-alikes
//! (no `0`/`O`, `1`/`I`). The database keeps a unique index on the column and
//! checkout retries on the rare collision.

use core::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const PREFIX: &str = "ORD";
const SUFFIX_LEN: usize = 8;
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Errors from [`OrderNumber::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderNumberError {
    #[error("order number must look like ORD-YYMMDD-XXXXXXXX")]
    Malformed,
    #[error("order number contains an invalid date")]
    InvalidDate,
}

/// An order number such as `ORD-250315-K7M2QX9A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a fresh order number for an order placed at `now`.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| {
                let idx = rng.random_range(0..ALPHABET.len());
                char::from(ALPHABET.get(idx).copied().unwrap_or(b'X'))
            })
            .collect();
        Self(format!("{PREFIX}-{}-{suffix}", now.format("%y%m%d")))
    }

    /// Validate a client-supplied order number.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when the shape is wrong and `InvalidDate` when the
    /// date segment is not a calendar date.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let s = s.trim().to_ascii_uppercase();
        let mut parts = s.split('-');
        let (Some(prefix), Some(date), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(OrderNumberError::Malformed);
        };

        if prefix != PREFIX
            || date.len() != 6
            || !date.bytes().all(|b| b.is_ascii_digit())
            || suffix.len() != SUFFIX_LEN
            || !suffix.bytes().all(|b| ALPHABET.contains(&b))
        {
            return Err(OrderNumberError::Malformed);
        }

        NaiveDate::parse_from_str(date, "%y%m%d").map_err(|_| OrderNumberError::InvalidDate)?;

        Ok(Self(s))
    }

    /// Returns the order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the order number and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_generate_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 8, 30, 0).unwrap();
        let number = OrderNumber::generate(now);
        assert!(number.as_str().starts_with("ORD-250315-"));
        assert_eq!(number.as_str().len(), "ORD-250315-".len() + SUFFIX_LEN);
        assert_eq!(OrderNumber::parse(number.as_str()).unwrap(), number);
    }

    #[test]
    fn test_generate_is_random() {
        let now = Utc::now();
        let a = OrderNumber::generate(now);
        let b = OrderNumber::generate(now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_normalizes_case() {
        let number = OrderNumber::parse(" ord-240101-abcdefgh ").unwrap();
        assert_eq!(number.as_str(), "ORD-240101-ABCDEFGH");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            OrderNumber::parse("INV-240101-ABCDEFGH"),
            Err(OrderNumberError::Malformed)
        );
        assert_eq!(
            OrderNumber::parse("ORD-240101-ABC"),
            Err(OrderNumberError::Malformed)
        );
        // 0 and O are excluded from the alphabet
        assert_eq!(
            OrderNumber::parse("ORD-240101-ABCDEFG0"),
            Err(OrderNumberError::Malformed)
        );
        assert_eq!(
            OrderNumber::parse("ORD-241301-ABCDEFGH"),
            Err(OrderNumberError::InvalidDate)
        );
    }
}
