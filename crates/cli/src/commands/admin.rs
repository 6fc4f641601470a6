//! Staff account commands.
//!
//! # Usage
//!
//! ```bash
//! BAZAAR_ADMIN_PASSWORD=... bazaar-cli admin create -e admin@example.com -n "Admin Name"
//! ```

use bazaar_api::config::DEFAULT_TOKEN_TTL_DAYS;
use bazaar_api::services::auth::{AuthError, AuthService};
use bazaar_core::UserId;

/// Create a new admin account.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns an error for an invalid email or weak password, if the email is
/// already registered, or if the database is unreachable.
pub async fn create_user(
    email: &str,
    name: &str,
    password: &str,
) -> Result<UserId, Box<dyn std::error::Error>> {
    if name.trim().is_empty() {
        return Err("Admin name cannot be empty".into());
    }

    let pool = super::connect().await?;

    tracing::info!("Creating admin user: {}", email);
    let user = AuthService::new(&pool, DEFAULT_TOKEN_TTL_DAYS)
        .create_admin(name, email, password)
        .await
        .map_err(|e| match e {
            AuthError::UserAlreadyExists => format!("User already exists with email: {email}").into(),
            other => Box::<dyn std::error::Error>::from(other),
        })?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(user.id)
}
