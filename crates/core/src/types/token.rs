//! Random tokens: guest tracking tokens and personal access tokens.
//!
//! Personal access tokens are handed to clients as `"{id}|{secret}"`. Only the
//! SHA-256 hex digest of the secret is stored, so a leaked database does not
//! leak usable tokens. The id lets the server fetch the row directly instead
//! of searching by digest.

use core::fmt;

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::id::TokenId;

/// Length of the random part of every token.
pub const TOKEN_SECRET_LEN: usize = 40;

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_SECRET_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of a token secret.
#[must_use]
pub fn hash_token_secret(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Errors from parsing tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token must have the form <id>|<secret>")]
    Malformed,
    #[error("token secret has the wrong length")]
    BadSecret,
}

/// Token that lets a guest look up their order without an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestToken(String);

impl GuestToken {
    /// Generate a new random guest token.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_secret())
    }

    /// Validate the shape of a client-supplied guest token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::BadSecret` if the input is not 40 ASCII
    /// alphanumerics.
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        let s = s.trim();
        if s.len() != TOKEN_SECRET_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(TokenError::BadSecret);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A personal access token in plaintext form.
///
/// Only exists at issuance (returned to the client once) and while a request
/// is being authenticated.
#[derive(Clone, PartialEq, Eq)]
pub struct PlainToken {
    id: TokenId,
    secret: String,
}

impl PlainToken {
    /// Generate a fresh secret for a token row that will get `id`.
    ///
    /// Use [`PlainToken::new_secret`] before the row exists, then
    /// [`PlainToken::from_parts`] once the id is known.
    #[must_use]
    pub fn new_secret() -> String {
        random_secret()
    }

    /// Assemble a token from its database id and secret.
    #[must_use]
    pub const fn from_parts(id: TokenId, secret: String) -> Self {
        Self { id, secret }
    }

    /// Parse a bearer value such as `"12|Xk3..."`.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if there is no `|` or the id is not a number, and
    /// `BadSecret` if the secret has the wrong shape.
    pub fn parse(s: &str) -> Result<Self, TokenError> {
        let (id, secret) = s.trim().split_once('|').ok_or(TokenError::Malformed)?;
        let id: i32 = id.parse().map_err(|_| TokenError::Malformed)?;
        if secret.len() != TOKEN_SECRET_LEN || !secret.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(TokenError::BadSecret);
        }
        Ok(Self {
            id: TokenId::new(id),
            secret: secret.to_owned(),
        })
    }

    /// Database id of the token row.
    #[must_use]
    pub const fn id(&self) -> TokenId {
        self.id
    }

    /// Digest to store or compare against.
    #[must_use]
    pub fn hash(&self) -> String {
        hash_token_secret(&self.secret)
    }

    /// Compare this token's digest with a stored digest in constant time.
    #[must_use]
    pub fn matches_hash(&self, stored: &str) -> bool {
        let computed = self.hash();
        if computed.len() != stored.len() {
            return false;
        }
        computed
            .bytes()
            .zip(stored.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// The `"{id}|{secret}"` form given to clients.
    #[must_use]
    pub fn expose(&self) -> String {
        format!("{}|{}", self.id, self.secret)
    }
}

impl fmt::Debug for PlainToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainToken")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_tokens_are_unique_and_valid() {
        let a = GuestToken::generate();
        let b = GuestToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), TOKEN_SECRET_LEN);
        assert_eq!(GuestToken::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_guest_token_rejects_bad_shape() {
        assert_eq!(GuestToken::parse("short"), Err(TokenError::BadSecret));
        let bad = format!("{}!", "a".repeat(TOKEN_SECRET_LEN - 1));
        assert_eq!(GuestToken::parse(&bad), Err(TokenError::BadSecret));
    }

    #[test]
    fn test_plain_token_round_trip() {
        let token = PlainToken::from_parts(TokenId::new(12), PlainToken::new_secret());
        let parsed = PlainToken::parse(&token.expose()).unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.id(), TokenId::new(12));
    }

    #[test]
    fn test_plain_token_parse_errors() {
        assert_eq!(PlainToken::parse("no-separator"), Err(TokenError::Malformed));
        assert_eq!(
            PlainToken::parse(&format!("abc|{}", "a".repeat(TOKEN_SECRET_LEN))),
            Err(TokenError::Malformed)
        );
        assert_eq!(PlainToken::parse("3|short"), Err(TokenError::BadSecret));
    }

    #[test]
    fn test_hash_matches_stored_digest() {
        let token = PlainToken::from_parts(TokenId::new(1), PlainToken::new_secret());
        let stored = token.hash();
        assert_eq!(stored.len(), 64);
        assert!(token.matches_hash(&stored));

        let other = PlainToken::from_parts(TokenId::new(1), PlainToken::new_secret());
        assert!(!other.matches_hash(&stored));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_token_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let secret = PlainToken::new_secret();
        let token = PlainToken::from_parts(TokenId::new(5), secret.clone());
        let debug = format!("{token:?}");
        assert!(!debug.contains(&secret));
        assert!(debug.contains("[REDACTED]"));
    }
}
