use crate::error::DbError;
use configuration::DatabaseSettings;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;

/// Establishes a connection pool to the PostgreSQL database.
///
/// The URL comes from `database.url` when it is configured, otherwise from the
/// `DATABASE_URL` environment variable (a `.env` file is loaded if present).
/// Pool sizing and timeouts come from `settings`.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, DbError> {
    let database_url = database_url(settings)?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect(&database_url)
        .await?;

    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "Database connection pool established"
    );
    Ok(pool)
}

fn database_url(settings: &DatabaseSettings) -> Result<String, DbError> {
    if let Some(url) = settings.url.as_deref().filter(|url| !url.trim().is_empty()) {
        return Ok(url.to_string());
    }

    // A missing .env file is fine; the variable may already be in the environment.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(DbError::ConnectionConfigError(e.to_string()));
        }
    }

    env::var("DATABASE_URL").map_err(|_e| {
        DbError::ConnectionConfigError(
            "database.url is not configured and DATABASE_URL is not set.".to_string(),
        )
    })
}

/// A utility function to run database migrations automatically.
///
/// Applies the embedded migrations under `migrations/` that have not run yet.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_url_wins_over_the_environment() {
        let settings = DatabaseSettings {
            url: Some("postgres://configured/db".to_string()),
            ..DatabaseSettings::default()
        };
        assert_eq!(database_url(&settings).unwrap(), "postgres://configured/db");
    }
}
