// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Existence and uniqueness checks.
//!
//! All checks are read-only and run on the caller's connection, so inside a
//! transaction they see the same snapshot the following write will use.

use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::condition::{Condition, Filter};
use crate::error::{DbError, Result};
use crate::payload::{Patch, Payload};
use crate::schema::{quote_ident, Field, FieldKind, Schema};
use crate::value::Value;

/// How text values are compared by [`ensure_unique`].
///
/// `Insensitive` folds full Unicode case, not just ASCII.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseMode {
	#[default]
	Sensitive,
	Insensitive,
}

pub async fn exists(
	conn: &mut SqliteConnection,
	schema: &Schema,
	condition: &Condition,
) -> Result<bool> {
	let mut qb = QueryBuilder::<Sqlite>::new("SELECT EXISTS (SELECT 1 FROM ");
	qb.push(schema.quoted_table());
	qb.push(" WHERE ");
	condition.push_sql(&mut qb);
	qb.push(")");

	let found: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
	Ok(found != 0)
}

pub async fn exists_matching(
	conn: &mut SqliteConnection,
	schema: &Schema,
	filter: &Filter,
) -> Result<bool> {
	let condition = Condition::from_filter(schema, filter)?;
	exists(conn, schema, &condition).await
}

pub async fn ensure_exists(
	conn: &mut SqliteConnection,
	schema: &Schema,
	filter: &Filter,
) -> Result<()> {
	if exists_matching(conn, schema, filter).await? {
		return Ok(());
	}
	tracing::debug!(record = schema.name, filter = %filter, "no matching row");
	Err(DbError::RowDoesNotExist {
		record: schema.name,
		filter: filter.to_string(),
	})
}

/// Fails on the first id, in input order, that has no row.
pub async fn ensure_exists_by_id(
	conn: &mut SqliteConnection,
	schema: &Schema,
	ids: &[i64],
) -> Result<()> {
	if ids.is_empty() {
		return Ok(());
	}

	let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
	qb.push(quote_ident(schema.primary_key));
	qb.push(" FROM ");
	qb.push(schema.quoted_table());
	qb.push(" WHERE ");
	Condition::id_in(schema, ids).push_sql(&mut qb);

	let found: HashSet<i64> = qb
		.build_query_scalar::<i64>()
		.fetch_all(&mut *conn)
		.await?
		.into_iter()
		.collect();

	match ids.iter().find(|id| !found.contains(*id)) {
		Some(&missing) => {
			tracing::debug!(record = schema.name, id = missing, "id does not exist");
			Err(DbError::missing_id(schema, missing))
		}
		None => Ok(()),
	}
}

/// Check every unique field the candidate sets against all other rows.
///
/// `exclude_id` skips the row being updated. Cleared and unset fields are
/// not checked.
pub async fn ensure_unique(
	conn: &mut SqliteConnection,
	schema: &Schema,
	candidate: &Payload,
	exclude_id: Option<i64>,
	case: CaseMode,
) -> Result<()> {
	for field in schema.unique_fields() {
		let Patch::Value(value) = candidate.get(field.name) else {
			continue;
		};

		let taken = match (case, value) {
			(CaseMode::Insensitive, Value::Text(text)) if field.kind == FieldKind::Text => {
				text_taken_ignoring_case(conn, schema, field, text, exclude_id).await?
			}
			_ => {
				let mut condition = Condition::Eq {
					field: field.name,
					value: value.clone(),
				};
				if let Some(id) = exclude_id {
					condition = condition.and(Condition::id_eq(schema, id).negate());
				}
				exists(conn, schema, &condition).await?
			}
		};

		if taken {
			tracing::debug!(record = schema.name, field = field.name, "unique value already taken");
			return Err(DbError::RowAlreadyExists {
				record: schema.name,
				field: field.name.to_string(),
				value: value.to_string(),
			});
		}
	}
	Ok(())
}

/// Unicode case-folded comparison against every stored value of `field`.
///
/// SQLite's `lower()` only folds ASCII, so the folding happens here.
async fn text_taken_ignoring_case(
	conn: &mut SqliteConnection,
	schema: &Schema,
	field: &Field,
	text: &str,
	exclude_id: Option<i64>,
) -> Result<bool> {
	let mut condition = Condition::Eq {
		field: field.name,
		value: Value::Null,
	}
	.negate();
	if let Some(id) = exclude_id {
		condition = condition.and(Condition::id_eq(schema, id).negate());
	}

	let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
	qb.push(quote_ident(field.name));
	qb.push(" FROM ");
	qb.push(schema.quoted_table());
	qb.push(" WHERE ");
	condition.push_sql(&mut qb);

	let stored: Vec<String> = qb.build_query_scalar().fetch_all(&mut *conn).await?;
	let folded = text.to_lowercase();
	Ok(stored.iter().any(|s| s.to_lowercase() == folded))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::Record;
	use crate::testing::{create_record_test_pool, insert_language, Language, Tag};

	#[tokio::test]
	async fn test_exists() {
		let pool = create_record_test_pool().await;
		insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		assert!(exists_matching(&mut conn, schema, &Filter::all().eq("title", "English"))
			.await
			.unwrap());
		assert!(!exists_matching(&mut conn, schema, &Filter::all().eq("title", "Klingon"))
			.await
			.unwrap());
		assert!(exists_matching(&mut conn, schema, &Filter::all()).await.unwrap());
		assert!(!exists_matching(&mut conn, schema, &Filter::any()).await.unwrap());
	}

	#[tokio::test]
	async fn test_ensure_exists_reports_filter() {
		let pool = create_record_test_pool().await;
		let mut conn = pool.acquire().await.unwrap();

		let filter = Filter::all().eq("title", "Uzbek");
		match ensure_exists(&mut conn, Language::schema(), &filter).await {
			Err(DbError::RowDoesNotExist { record, filter }) => {
				assert_eq!(record, "Language");
				assert_eq!(filter, "title: Uzbek");
			}
			other => panic!("expected RowDoesNotExist, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_ensure_exists_by_id_reports_first_missing() {
		let pool = create_record_test_pool().await;
		let first = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		assert!(ensure_exists_by_id(&mut conn, schema, &[first]).await.is_ok());
		assert!(ensure_exists_by_id(&mut conn, schema, &[]).await.is_ok());

		match ensure_exists_by_id(&mut conn, schema, &[first, 999, 500]).await {
			Err(DbError::RowDoesNotExist { filter, .. }) => assert_eq!(filter, "id: 999"),
			other => panic!("expected RowDoesNotExist, got {other:?}"),
		}
		match ensure_exists_by_id(&mut conn, schema, &[500, 999]).await {
			Err(DbError::RowDoesNotExist { filter, .. }) => assert_eq!(filter, "id: 500"),
			other => panic!("expected RowDoesNotExist, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_ensure_unique() {
		let pool = create_record_test_pool().await;
		let id = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		let duplicate = Payload::new().set("title", "English");
		match ensure_unique(&mut conn, schema, &duplicate, None, CaseMode::Sensitive).await {
			Err(DbError::RowAlreadyExists { field, value, .. }) => {
				assert_eq!(field, "title");
				assert_eq!(value, "English");
			}
			other => panic!("expected RowAlreadyExists, got {other:?}"),
		}

		// The row itself does not conflict with its own value.
		assert!(
			ensure_unique(&mut conn, schema, &duplicate, Some(id), CaseMode::Sensitive)
				.await
				.is_ok()
		);

		// Non-unique fields are ignored.
		let description = Payload::new().set("description", "English");
		assert!(
			ensure_unique(&mut conn, schema, &description, None, CaseMode::Sensitive)
				.await
				.is_ok()
		);
	}

	#[tokio::test]
	async fn test_ensure_unique_case_modes() {
		let pool = create_record_test_pool().await;
		insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		let shouted = Payload::new().set("title", "ENGLISH");
		assert!(
			ensure_unique(&mut conn, schema, &shouted, None, CaseMode::Sensitive)
				.await
				.is_ok()
		);
		assert!(matches!(
			ensure_unique(&mut conn, schema, &shouted, None, CaseMode::Insensitive).await,
			Err(DbError::RowAlreadyExists { .. })
		));
	}

	#[tokio::test]
	async fn test_ensure_unique_folds_non_ascii_case() {
		let pool = create_record_test_pool().await;
		let russian = insert_language(&pool, "Русский").await;
		insert_language(&pool, "Éire").await;
		insert_language(&pool, "Oʻzbekcha").await;
		let mut conn = pool.acquire().await.unwrap();
		let schema = Language::schema();

		for title in ["РУССКИЙ", "éire", "OʻZBEKCHA"] {
			let candidate = Payload::new().set("title", title);
			match ensure_unique(&mut conn, schema, &candidate, None, CaseMode::Insensitive).await {
				Err(DbError::RowAlreadyExists { field, value, .. }) => {
					assert_eq!(field, "title");
					assert_eq!(value, title);
				}
				other => panic!("expected RowAlreadyExists for {title}, got {other:?}"),
			}
			assert!(
				ensure_unique(&mut conn, schema, &candidate, None, CaseMode::Sensitive)
					.await
					.is_ok()
			);
		}

		// The row being updated does not collide with itself.
		let own = Payload::new().set("title", "русский");
		assert!(
			ensure_unique(&mut conn, schema, &own, Some(russian), CaseMode::Insensitive)
				.await
				.is_ok()
		);
	}

	#[tokio::test]
	async fn test_ensure_exists_by_id_beyond_bind_parameter_limit() {
		let pool = create_record_test_pool().await;
		let first = insert_language(&pool, "English").await;
		let mut conn = pool.acquire().await.unwrap();

		let ids: Vec<i64> = std::iter::once(first).chain(100_000..140_000).collect();
		match ensure_exists_by_id(&mut conn, Language::schema(), &ids).await {
			Err(DbError::RowDoesNotExist { filter, .. }) => assert_eq!(filter, "id: 100000"),
			other => panic!("expected RowDoesNotExist, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_ensure_unique_reports_first_conflicting_field() {
		let pool = create_record_test_pool().await;
		sqlx::query("INSERT INTO tags (name, slug, weight) VALUES ('Rust', 'rust', 1.0)")
			.execute(&pool)
			.await
			.unwrap();
		let mut conn = pool.acquire().await.unwrap();

		let candidate = Payload::new().set("name", "Go").set("slug", "rust");
		match ensure_unique(&mut conn, Tag::schema(), &candidate, None, CaseMode::Sensitive).await {
			Err(DbError::RowAlreadyExists { record, field, value }) => {
				assert_eq!(record, "Tag");
				assert_eq!(field, "slug");
				assert_eq!(value, "rust");
			}
			other => panic!("expected RowAlreadyExists, got {other:?}"),
		}
	}
}
