//! Account and contact email addresses.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string is not an acceptable [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must contain exactly one @ symbol")]
    AtSymbolCount,
    #[error("email needs text before and after the @ symbol")]
    MissingPart,
}

/// A trimmed, lowercased email address.
///
/// Registration, login and checkout contact details all go through
/// [`Email::parse`], so `" Ann@Shop.COM "` and `"ann@shop.com"` name the same
/// account.
///
/// ```
/// use bazaar_core::Email;
///
/// assert_eq!(Email::parse(" Ann@Shop.COM ").unwrap().as_str(), "ann@shop.com");
/// assert!(Email::parse("ann@").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Normalize and check an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than
    /// [`Email::MAX_LENGTH`], does not hold exactly one `@`, or has nothing on
    /// one side of it.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let normalized = s.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EmailError::Empty);
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        match normalized.split_once('@') {
            Some((_, domain)) if domain.contains('@') => Err(EmailError::AtSymbolCount),
            Some((local, domain)) if local.is_empty() || domain.is_empty() => {
                Err(EmailError::MissingPart)
            }
            Some(_) => Ok(Self(normalized)),
            None => Err(EmailError::AtSymbolCount),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // Stored values were normalized on insert.
        Ok(Self(<String as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_shapes() {
        for ok in [
            "user@example.com",
            "first.last+promo@shop.com.bd",
            "a@b.c",
        ] {
            assert!(Email::parse(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let email = Email::parse("  Ann.Lee@Shop.COM ").unwrap();
        assert_eq!(email.as_str(), "ann.lee@shop.com");
        assert_eq!(email, "ann.lee@shop.com".parse().unwrap());
    }

    #[test]
    fn test_rejects_with_reason() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("no-at-symbol"), Err(EmailError::AtSymbolCount));
        assert_eq!(Email::parse("a@b@c.com"), Err(EmailError::AtSymbolCount));
        assert_eq!(Email::parse("@shop.com"), Err(EmailError::MissingPart));
        assert_eq!(Email::parse("ann@"), Err(EmailError::MissingPart));

        let long = format!("{}@example.com", "a".repeat(250));
        assert_eq!(
            Email::parse(&long),
            Err(EmailError::TooLong {
                max: Email::MAX_LENGTH
            })
        );
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let email = Email::parse("user@example.com").unwrap();
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"user@example.com\"");
        assert_eq!(email.to_string(), "user@example.com");
    }
}
