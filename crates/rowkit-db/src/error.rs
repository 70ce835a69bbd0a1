// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::schema::Schema;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Row with '{field}: {value}' in '{record}' already exists")]
	RowAlreadyExists {
		record: &'static str,
		field: String,
		value: String,
	},

	#[error("Row with '{filter}' in '{record}' does not exist")]
	RowDoesNotExist { record: &'static str, filter: String },

	#[error("More than one row with '{filter}' in '{record}'")]
	MultipleRowsFound { record: &'static str, filter: String },

	#[error("Field '{field}' does not exist on '{record}'")]
	FieldDoesNotExist { record: &'static str, field: String },

	#[error("Field '{field}' on '{record}' does not accept null")]
	NonNullable { record: &'static str, field: String },

	#[error("Field '{field}' on '{record}' cannot be written")]
	ImmutableField { record: &'static str, field: String },

	#[error("Invalid join mode '{0}', expected 'and' or 'or'")]
	InvalidJoinMode(String),

	#[error("Internal: {0}")]
	Internal(String),
}

impl DbError {
	pub(crate) fn missing_id(schema: &Schema, id: i64) -> Self {
		DbError::RowDoesNotExist {
			record: schema.name,
			filter: format!("{}: {id}", schema.primary_key),
		}
	}

	/// True for failures caused by the caller's input rather than the store.
	pub fn is_validation(&self) -> bool {
		!matches!(self, DbError::Sqlx(_) | DbError::Internal(_))
	}

	/// Translate a store-level unique violation into `RowAlreadyExists`.
	///
	/// SQLite reports `UNIQUE constraint failed: <table>.<column>`; the value is
	/// looked up by the caller-supplied closure since the driver does not echo it.
	pub(crate) fn from_write(
		schema: &Schema,
		err: sqlx::Error,
		value_of: impl Fn(&str) -> Option<String>,
	) -> Self {
		let field = match &err {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() => db_err
				.message()
				.rsplit_once('.')
				.map(|(_, column)| column.trim().to_string()),
			_ => None,
		};

		match field {
			Some(field) => {
				tracing::debug!(record = schema.name, field = %field, "store rejected duplicate value");
				let value = value_of(&field).unwrap_or_default();
				DbError::RowAlreadyExists {
					record: schema.name,
					field,
					value,
				}
			}
			None => DbError::Sqlx(err),
		}
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
