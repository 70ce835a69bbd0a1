// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial updates.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::condition::Condition;
use crate::error::{DbError, Result};
use crate::nullability::validate_payload;
use crate::payload::{Patch, Payload};
use crate::schema::{quote_ident, Generated, Schema};
use crate::validator::{ensure_unique, CaseMode};
use crate::value::Value;

/// Apply `payload` to the row with primary key `id`.
///
/// Excluded and unset fields are left untouched. A cleared field must be
/// nullable. New values of unique fields are checked against every other
/// row before anything is written. Returns `false` when there was nothing to
/// write.
pub async fn merge_update(
	conn: &mut SqliteConnection,
	schema: &'static Schema,
	id: i64,
	payload: &Payload,
	exclude: &[&str],
) -> Result<bool> {
	let payload = payload.clone().without(exclude);
	validate_payload(schema, &payload)?;

	if payload.is_empty() {
		return Ok(false);
	}

	ensure_unique(conn, schema, &payload, Some(id), CaseMode::Sensitive).await?;

	let mut assignments: Vec<(&'static str, Value)> = Vec::with_capacity(payload.len() + 1);
	for (name, patch) in payload.iter() {
		let field = schema.field(name)?;
		let value = match patch {
			Patch::Value(v) => v.clone(),
			Patch::Null => Value::Null,
			Patch::Unset => continue,
		};
		assignments.push((field.name, value));
	}

	let now = Utc::now();
	for field in schema.fields() {
		if field.generated == Some(Generated::UpdatedAt) && !payload.contains(field.name) {
			assignments.push((field.name, Value::Timestamp(now)));
		}
	}

	let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
	qb.push(schema.quoted_table());
	qb.push(" SET ");
	for (i, (field, value)) in assignments.iter().enumerate() {
		if i > 0 {
			qb.push(", ");
		}
		qb.push(quote_ident(field));
		qb.push(" = ");
		value.push_bind(&mut qb);
	}
	qb.push(" WHERE ");
	Condition::id_eq(schema, id).push_sql(&mut qb);

	let result = qb
		.build()
		.execute(&mut *conn)
		.await
		.map_err(|e| {
			DbError::from_write(schema, e, |f| {
				payload.get(f).as_value().map(ToString::to_string)
			})
		})?;

	if result.rows_affected() == 0 {
		return Err(DbError::missing_id(schema, id));
	}

	tracing::debug!(record = schema.name, id, fields = assignments.len(), "record updated");
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::Record;
	use crate::testing::{create_record_test_pool, insert_language, Language};

	async fn fetch(pool: &sqlx::SqlitePool, id: i64) -> (String, Option<String>) {
		sqlx::query_as("SELECT title, description FROM languages WHERE id = ?")
			.bind(id)
			.fetch_one(pool)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_unset_fields_are_untouched() {
		let pool = create_record_test_pool().await;
		let id = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();

		let payload = Payload::new().set("description", "Lingua franca");
		assert!(merge_update(&mut conn, Language::schema(), id, &payload, &[])
			.await
			.unwrap());
		drop(conn);

		assert_eq!(
			fetch(&pool, id).await,
			("English".to_string(), Some("Lingua franca".to_string()))
		);
	}

	#[tokio::test]
	async fn test_clear_nullable_field() {
		let pool = create_record_test_pool().await;
		let id = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		merge_update(&mut conn, schema, id, &Payload::new().set("description", "x"), &[])
			.await
			.unwrap();
		merge_update(&mut conn, schema, id, &Payload::new().clear("description"), &[])
			.await
			.unwrap();
		drop(conn);

		assert_eq!(fetch(&pool, id).await, ("English".to_string(), None));
	}

	#[tokio::test]
	async fn test_clear_non_nullable_field_fails() {
		let pool = create_record_test_pool().await;
		let id = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();

		let result =
			merge_update(&mut conn, Language::schema(), id, &Payload::new().clear("title"), &[])
				.await;
		assert!(matches!(result, Err(DbError::NonNullable { .. })));
		drop(conn);

		assert_eq!(fetch(&pool, id).await.0, "English");
	}

	#[tokio::test]
	async fn test_excluded_fields_are_skipped() {
		let pool = create_record_test_pool().await;
		let id = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();

		let payload = Payload::new().clear("title").set("description", "kept");
		merge_update(&mut conn, Language::schema(), id, &payload, &["title"])
			.await
			.unwrap();

		let nothing = Payload::new().set("title", "French");
		assert!(!merge_update(&mut conn, Language::schema(), id, &nothing, &["title"])
			.await
			.unwrap());
		drop(conn);

		assert_eq!(
			fetch(&pool, id).await,
			("English".to_string(), Some("kept".to_string()))
		);
	}

	#[tokio::test]
	async fn test_missing_row() {
		let pool = create_record_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		let result = merge_update(
			&mut conn,
			Language::schema(),
			42,
			&Payload::new().set("title", "Esperanto"),
			&[],
		)
		.await;
		match result {
			Err(DbError::RowDoesNotExist { filter, .. }) => assert_eq!(filter, "id: 42"),
			other => panic!("expected RowDoesNotExist, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_unique_conflict_with_other_row() {
		let pool = create_record_test_pool().await;
		insert_language(&pool, "English").await;
		let id = insert_language(&pool, "Uzbek").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		let rename = Payload::new().set("title", "English");
		assert!(matches!(
			merge_update(&mut conn, schema, id, &rename, &[]).await,
			Err(DbError::RowAlreadyExists { .. })
		));

		// Rewriting its own value is not a conflict.
		let same = Payload::new().set("title", "Uzbek");
		assert!(merge_update(&mut conn, schema, id, &same, &[]).await.unwrap());
	}
}
