//! Database migration commands.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Storefront migrations live in `crates/storefront/migrations/` and are
//! embedded into the binary at compile time.

use std::collections::HashSet;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::migrate::{Migrate, Migrator};

static MIGRATOR: Migrator = sqlx::migrate!("../storefront/migrations");

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

fn database_url() -> Result<SecretString, MigrationError> {
    let _ = dotenvy::dotenv();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}

async fn connect() -> Result<PgPool, MigrationError> {
    let url = database_url()?;
    tracing::info!("Connecting to storefront database...");
    Ok(PgPool::connect(url.expose_secret()).await?)
}

/// Apply all pending storefront migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails,
/// or a migration fails to apply.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running storefront migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}

/// Log each known migration and whether it has been applied.
///
/// # Errors
///
/// Returns an error if the database cannot be reached or the migrations
/// table cannot be read.
pub async fn status() -> Result<(), MigrationError> {
    let pool = connect().await?;
    let mut conn = pool.acquire().await?;

    conn.ensure_migrations_table().await?;
    let applied: HashSet<i64> = conn
        .list_applied_migrations()
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    let mut pending = 0usize;
    for migration in MIGRATOR.iter() {
        if migration.migration_type.is_down_migration() {
            continue;
        }
        let is_applied = applied.contains(&migration.version);
        if !is_applied {
            pending += 1;
        }
        tracing::info!(
            version = migration.version,
            description = %migration.description,
            applied = is_applied,
            "migration"
        );
    }

    tracing::info!(pending, "Migration status complete");
    Ok(())
}
