//! Bearer token maintenance.

use bazaar_api::db::TokenRepository;
use chrono::Utc;

/// Delete every token past its expiry.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn prune() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    let deleted = TokenRepository::new(&pool).delete_expired(Utc::now()).await?;

    tracing::info!(deleted, "Expired tokens pruned");
    Ok(())
}
