// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::str::FromStr;
use std::time::Duration;

use rowkit_config::DatabaseConfig;
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::DbError;
use crate::schema::Schema;

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid, `DbError::Sqlx` if the
/// connection fails.
#[tracing::instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(&config.url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(config.max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Create the tables for `schemas` if they do not exist yet.
#[tracing::instrument(skip(pool, schemas), fields(count = schemas.len()))]
pub async fn ensure_tables(pool: &SqlitePool, schemas: &[&Schema]) -> Result<(), DbError> {
	let mut tx = pool.begin().await?;
	for schema in schemas {
		sqlx::query(&schema.create_table_sql())
			.execute(&mut *tx)
			.await?;
		tracing::debug!(record = schema.name, table = schema.table, "table ensured");
	}
	tx.commit().await?;
	Ok(())
}
