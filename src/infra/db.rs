use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::security::config::{env_parse, env_string};

pub type Db = sqlx::SqlitePool;

const DEFAULT_DATABASE_URL: &str = "sqlite://company.db";

pub async fn connect() -> anyhow::Result<Db> {
    let url = env_string("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
    let max_connections = env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(5);

    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid DATABASE_URL {url}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database at {url}"))?;
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(db: &Db) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("failed to run database migrations")
}

/// One private in-memory database per call.
#[cfg(test)]
pub(crate) async fn memory() -> Db {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
