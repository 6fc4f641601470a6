//! CLI subcommands.

pub mod admin;
pub mod migrate;
pub mod seed;
pub mod tokens;

use bazaar_api::db;
use secrecy::SecretString;
use sqlx::PgPool;

/// Connect using `BAZAAR_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// # Errors
///
/// Returns an error if neither variable is set or the connection fails.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    let database_url = std::env::var("BAZAAR_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "BAZAAR_DATABASE_URL not set")?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
