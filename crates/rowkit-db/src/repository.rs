// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generic repository over any [`Record`] type.
//!
//! Every write runs in its own transaction: validation, the statement and the
//! refresh all happen on the transaction's connection, and the transaction is
//! committed once at the end. Any error (or dropping the future) rolls it
//! back. Reads go straight to the pool.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, QueryBuilder, Sqlite, SqliteConnection};

use crate::condition::{Condition, Filter, JoinMode};
use crate::error::{DbError, Result};
use crate::merger::merge_update;
use crate::nullability::validate_payload;
use crate::payload::{Patch, Payload};
use crate::query::{self, OrderBy, Page};
use crate::schema::{quote_ident, Generated, Record, Schema};
use crate::validator::{self, CaseMode};
use crate::value::Value;

/// Field toggled by [`Repository::deactivate_all_then_activate`].
pub const ACTIVE_FIELD: &str = "is_active";

pub struct Repository<R> {
	pool: SqlitePool,
	_record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
	fn clone(&self) -> Self {
		Self {
			pool: self.pool.clone(),
			_record: PhantomData,
		}
	}
}

impl<R: Record> Repository<R> {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			_record: PhantomData,
		}
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	pub fn schema(&self) -> &'static Schema {
		R::schema()
	}

	/// Names of the fields carrying a uniqueness constraint.
	pub fn unique_fields(&self) -> Vec<&'static str> {
		R::schema().unique_fields().map(|f| f.name).collect()
	}

	/// Insert a new record and return it as stored.
	///
	/// `extras` is overlaid on `payload`, then `exclude` is removed. Fields
	/// the payload leaves out must be nullable, generated or defaulted.
	#[tracing::instrument(skip_all, fields(record = R::schema().name))]
	pub async fn create(
		&self,
		payload: &Payload,
		extras: Option<&Payload>,
		exclude: &[&str],
	) -> Result<R> {
		let mut payload = payload.clone();
		if let Some(extras) = extras {
			payload = payload.merged(extras);
		}
		let payload = payload.without(exclude);

		let mut tx = self.pool.begin().await?;
		let instance = insert_in::<R>(&mut tx, &payload).await?;
		tx.commit().await?;

		tracing::debug!(id = instance.id(), "record created");
		Ok(instance)
	}

	/// All records, ordered. `page` applies only with both limit and offset.
	#[tracing::instrument(skip_all, fields(record = R::schema().name))]
	pub async fn list(&self, order: &OrderBy, page: Page) -> Result<Vec<R>> {
		self.select(&Condition::True, order, page).await
	}

	#[tracing::instrument(skip_all, fields(record = R::schema().name, filter = %filter, join = filter.join().as_str()))]
	pub async fn filter(&self, filter: &Filter, order: &OrderBy, page: Page) -> Result<Vec<R>> {
		let condition = Condition::from_filter(R::schema(), filter)?;
		self.select(&condition, order, page).await
	}

	/// The single record matching `filter`.
	///
	/// Fails with `RowDoesNotExist` on no match and `MultipleRowsFound` when
	/// the filter is ambiguous.
	#[tracing::instrument(skip_all, fields(record = R::schema().name, filter = %filter))]
	pub async fn get_one(&self, filter: &Filter) -> Result<R> {
		let schema = R::schema();
		let condition = Condition::from_filter(schema, filter)?;
		let mut rows = self
			.select(&condition, &OrderBy::default(), Page::new(2, 0))
			.await?;

		match rows.len() {
			0 => Err(DbError::RowDoesNotExist {
				record: schema.name,
				filter: filter.to_string(),
			}),
			1 => Ok(rows.remove(0)),
			_ => Err(DbError::MultipleRowsFound {
				record: schema.name,
				filter: filter.to_string(),
			}),
		}
	}

	/// The first record matching `filter` in `order`, if any.
	#[tracing::instrument(skip_all, fields(record = R::schema().name, filter = %filter))]
	pub async fn get_first(&self, filter: &Filter, order: &OrderBy) -> Result<Option<R>> {
		let condition = Condition::from_filter(R::schema(), filter)?;
		let mut rows = self.select(&condition, order, Page::new(1, 0)).await?;
		Ok(rows.pop())
	}

	#[tracing::instrument(skip(self), fields(record = R::schema().name))]
	pub async fn get_one_by_id(&self, id: i64) -> Result<R> {
		let schema = R::schema();
		let mut rows = self
			.select(&Condition::id_eq(schema, id), &OrderBy::default(), Page::default())
			.await?;
		rows.pop().ok_or_else(|| DbError::missing_id(schema, id))
	}

	/// Apply a partial update to `instance` and return the refreshed record.
	#[tracing::instrument(skip_all, fields(record = R::schema().name, id = instance.id()))]
	pub async fn update(&self, instance: &R, payload: &Payload, exclude: &[&str]) -> Result<R> {
		self.update_by_id(instance.id(), payload, exclude).await
	}

	#[tracing::instrument(skip(self, payload, exclude), fields(record = R::schema().name))]
	pub async fn update_by_id(&self, id: i64, payload: &Payload, exclude: &[&str]) -> Result<R> {
		let schema = R::schema();
		let mut tx = self.pool.begin().await?;
		merge_update(&mut tx, schema, id, payload, exclude).await?;
		let refreshed = fetch_by_id::<R>(&mut tx, id)
			.await?
			.ok_or_else(|| DbError::missing_id(schema, id))?;
		tx.commit().await?;
		Ok(refreshed)
	}

	/// Delete every id, or none of them if any is missing.
	#[tracing::instrument(skip_all, fields(record = R::schema().name))]
	pub async fn delete(&self, ids: impl IntoIterator<Item = i64>) -> Result<u64> {
		let schema = R::schema();
		let ids: Vec<i64> = ids.into_iter().collect();
		if ids.is_empty() {
			return Ok(0);
		}

		let mut tx = self.pool.begin().await?;
		validator::ensure_exists_by_id(&mut tx, schema, &ids).await?;

		let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
		qb.push(schema.quoted_table());
		qb.push(" WHERE ");
		Condition::id_in(schema, &ids).push_sql(&mut qb);
		let result = qb.build().execute(&mut *tx).await?;
		tx.commit().await?;

		tracing::debug!(count = result.rows_affected(), "records deleted");
		Ok(result.rows_affected())
	}

	/// If `payload` activates a record, mark every existing record inactive.
	///
	/// Keeps at most one active record per type, provided the caller then
	/// writes the activated record. Returns whether anything was deactivated.
	#[tracing::instrument(skip_all, fields(record = R::schema().name))]
	pub async fn deactivate_all_then_activate(&self, payload: &Payload) -> Result<bool> {
		let schema = R::schema();
		let field = schema.field(ACTIVE_FIELD)?;
		let activating = payload
			.get(field.name)
			.as_value()
			.is_some_and(Value::is_truthy);
		if !activating {
			return Ok(false);
		}

		let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
		qb.push(schema.quoted_table());
		qb.push(" SET ");
		qb.push(quote_ident(field.name));
		qb.push(" = ");
		qb.push_bind(false);
		for stamp in schema
			.fields()
			.iter()
			.filter(|f| f.generated == Some(Generated::UpdatedAt))
		{
			qb.push(", ");
			qb.push(quote_ident(stamp.name));
			qb.push(" = ");
			qb.push_bind(Utc::now());
		}

		let mut tx = self.pool.begin().await?;
		let result = qb.build().execute(&mut *tx).await?;
		tx.commit().await?;

		tracing::debug!(count = result.rows_affected(), "records deactivated");
		Ok(true)
	}

	/// Return the record matching `payload`, creating it when there is none.
	///
	/// With `ignore_non_unique`, only the payload's unique fields are matched
	/// and any one of them is enough; otherwise every field must match.
	/// The boolean is `true` when a record was created.
	#[tracing::instrument(skip(self, payload), fields(record = R::schema().name))]
	pub async fn get_or_create(&self, payload: &Payload, ignore_non_unique: bool) -> Result<(R, bool)> {
		let schema = R::schema();
		let mut filter = Filter::new(if ignore_non_unique {
			JoinMode::Or
		} else {
			JoinMode::And
		});
		for (name, patch) in payload.iter() {
			if ignore_non_unique && !schema.is_unique(name)? {
				continue;
			}
			let value = match patch {
				Patch::Value(v) => v.clone(),
				_ => Value::Null,
			};
			filter.insert(name, value);
		}

		let mut tx = self.pool.begin().await?;
		if !filter.is_empty() {
			let condition = Condition::from_filter(schema, &filter)?;
			let mut qb = query::select(schema, &condition, &OrderBy::default(), Page::new(1, 0))?;
			let found = qb.build_query_as::<R>().fetch_optional(&mut *tx).await?;
			if let Some(found) = found {
				tracing::debug!(id = found.id(), "existing record found");
				return Ok((found, false));
			}
		}

		let created = insert_in::<R>(&mut tx, payload).await?;
		tx.commit().await?;

		tracing::debug!(id = created.id(), "record created");
		Ok((created, true))
	}

	#[tracing::instrument(skip_all, fields(record = R::schema().name, filter = %filter))]
	pub async fn exists(&self, filter: &Filter) -> Result<bool> {
		let mut conn = self.pool.acquire().await?;
		validator::exists_matching(&mut conn, R::schema(), filter).await
	}

	#[tracing::instrument(skip_all, fields(record = R::schema().name, filter = %filter))]
	pub async fn ensure_exists(&self, filter: &Filter) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		validator::ensure_exists(&mut conn, R::schema(), filter).await
	}

	#[tracing::instrument(skip_all, fields(record = R::schema().name))]
	pub async fn ensure_exists_by_id(&self, ids: impl IntoIterator<Item = i64>) -> Result<()> {
		let ids: Vec<i64> = ids.into_iter().collect();
		let mut conn = self.pool.acquire().await?;
		validator::ensure_exists_by_id(&mut conn, R::schema(), &ids).await
	}

	#[tracing::instrument(skip(self, candidate), fields(record = R::schema().name))]
	pub async fn ensure_unique(
		&self,
		candidate: &Payload,
		exclude_id: Option<i64>,
		case: CaseMode,
	) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		validator::ensure_unique(&mut conn, R::schema(), candidate, exclude_id, case).await
	}

	async fn select(&self, condition: &Condition, order: &OrderBy, page: Page) -> Result<Vec<R>> {
		let mut qb = query::select(R::schema(), condition, order, page)?;
		let rows = qb.build_query_as::<R>().fetch_all(&self.pool).await?;
		tracing::debug!(count = rows.len(), "records fetched");
		Ok(rows)
	}
}

async fn fetch_by_id<R: Record>(conn: &mut SqliteConnection, id: i64) -> Result<Option<R>> {
	let schema = R::schema();
	let mut qb = query::select(
		schema,
		&Condition::id_eq(schema, id),
		&OrderBy::default(),
		Page::default(),
	)?;
	Ok(qb.build_query_as::<R>().fetch_optional(&mut *conn).await?)
}

/// Validate and insert `payload`, then read the row back on the same
/// connection.
async fn insert_in<R: Record>(conn: &mut SqliteConnection, payload: &Payload) -> Result<R> {
	let schema = R::schema();
	validate_payload(schema, payload)?;

	for field in schema.fields() {
		if !schema.is_primary_key(field.name)
			&& !field.may_be_omitted()
			&& !payload.contains(field.name)
		{
			return Err(DbError::NonNullable {
				record: schema.name,
				field: field.name.to_string(),
			});
		}
	}

	validator::ensure_unique(conn, schema, payload, None, CaseMode::Sensitive).await?;

	let mut columns: Vec<(&'static str, Value)> = Vec::with_capacity(schema.fields().len());
	for (name, patch) in payload.iter() {
		let field = schema.field(name)?;
		let value = match patch {
			Patch::Value(v) => v.clone(),
			Patch::Null => Value::Null,
			Patch::Unset => continue,
		};
		columns.push((field.name, value));
	}

	let now = Utc::now();
	for field in schema.fields() {
		if field.generated.is_some() && !payload.contains(field.name) {
			columns.push((field.name, Value::Timestamp(now)));
		}
	}

	let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
	qb.push(schema.quoted_table());
	if columns.is_empty() {
		qb.push(" DEFAULT VALUES");
	} else {
		qb.push(" (");
		for (i, (field, _)) in columns.iter().enumerate() {
			if i > 0 {
				qb.push(", ");
			}
			qb.push(quote_ident(field));
		}
		qb.push(") VALUES (");
		for (i, (_, value)) in columns.iter().enumerate() {
			if i > 0 {
				qb.push(", ");
			}
			value.push_bind(&mut qb);
		}
		qb.push(")");
	}

	let result = qb
		.build()
		.execute(&mut *conn)
		.await
		.map_err(|e| {
			DbError::from_write(schema, e, |f| {
				payload.get(f).as_value().map(ToString::to_string)
			})
		})?;

	let id = result.last_insert_rowid();
	fetch_by_id::<R>(conn, id)
		.await?
		.ok_or_else(|| DbError::Internal(format!("{} {id} vanished after insert", schema.name)))
}

/// Object-safe view of a [`Repository`] for callers that want to swap in a
/// fake.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
	async fn create(&self, payload: &Payload) -> Result<R>;
	async fn filter(&self, filter: &Filter, order: &OrderBy, page: Page) -> Result<Vec<R>>;
	async fn get_one_by_id(&self, id: i64) -> Result<R>;
	async fn update_by_id(&self, id: i64, payload: &Payload) -> Result<R>;
	async fn delete(&self, ids: &[i64]) -> Result<u64>;
}

#[async_trait]
impl<R: Record> RecordStore<R> for Repository<R> {
	async fn create(&self, payload: &Payload) -> Result<R> {
		Repository::create(self, payload, None, &[]).await
	}

	async fn filter(&self, filter: &Filter, order: &OrderBy, page: Page) -> Result<Vec<R>> {
		Repository::filter(self, filter, order, page).await
	}

	async fn get_one_by_id(&self, id: i64) -> Result<R> {
		Repository::get_one_by_id(self, id).await
	}

	async fn update_by_id(&self, id: i64, payload: &Payload) -> Result<R> {
		Repository::update_by_id(self, id, payload, &[]).await
	}

	async fn delete(&self, ids: &[i64]) -> Result<u64> {
		Repository::delete(self, ids.iter().copied()).await
	}
}
