use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::AuthzConfig;

pub mod row_parsers;
pub mod workflow_store;

/// Connects to the configured database and applies pending migrations.
pub async fn init(config: &AuthzConfig) -> anyhow::Result<SqlitePool> {
	let pool = connect(database_url(config)?).await?;
	migrate(&pool).await?;
	Ok(pool)
}

pub fn database_url(config: &AuthzConfig) -> anyhow::Result<&str> {
	config.database_url.as_deref().context("DATABASE_URL not set")
}

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect(database_url)
		.await
		.context("failed to connect to database")?;

	Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
	sqlx::migrate!()
		.run(pool)
		.await
		.context("failed to run migrations")
}
