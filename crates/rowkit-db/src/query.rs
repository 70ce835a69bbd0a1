// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ordering, pagination and SELECT construction.

use sqlx::{QueryBuilder, Sqlite};

use crate::condition::Condition;
use crate::error::Result;
use crate::schema::{quote_ident, Schema};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
	#[default]
	Asc,
	Desc,
}

/// Sort keys, applied in order. Defaults to the primary key ascending.
///
/// A leading `-` on a field name (`"-created_at"`) sorts descending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
	keys: Vec<(String, Direction)>,
}

impl OrderBy {
	pub fn asc(field: impl Into<String>) -> Self {
		Self::default().then(field, Direction::Asc)
	}

	pub fn desc(field: impl Into<String>) -> Self {
		Self::default().then(field, Direction::Desc)
	}

	pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
		self.keys.push((field.into(), direction));
		self
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	fn push_sql(&self, schema: &Schema, qb: &mut QueryBuilder<'_, Sqlite>) -> Result<()> {
		qb.push(" ORDER BY ");
		if self.keys.is_empty() {
			qb.push(quote_ident(schema.primary_key));
			qb.push(" ASC");
			return Ok(());
		}

		for (i, (name, direction)) in self.keys.iter().enumerate() {
			let field = schema.field(name)?;
			if i > 0 {
				qb.push(", ");
			}
			qb.push(quote_ident(field.name));
			qb.push(match direction {
				Direction::Asc => " ASC",
				Direction::Desc => " DESC",
			});
		}
		Ok(())
	}
}

impl From<&str> for OrderBy {
	fn from(spec: &str) -> Self {
		spec.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.fold(OrderBy::default(), |order, key| match key.strip_prefix('-') {
				Some(field) => order.then(field, Direction::Desc),
				None => order.then(key, Direction::Asc),
			})
	}
}

impl<const N: usize> From<[&str; N]> for OrderBy {
	fn from(fields: [&str; N]) -> Self {
		OrderBy::from(fields.join(",").as_str())
	}
}

/// Limit/offset window. Only applied when both halves are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
	pub limit: Option<i64>,
	pub offset: Option<i64>,
}

impl Page {
	pub fn new(limit: i64, offset: i64) -> Self {
		Self {
			limit: Some(limit),
			offset: Some(offset),
		}
	}

	pub fn window(&self) -> Option<(i64, i64)> {
		self.limit.zip(self.offset)
	}
}

/// `SELECT <columns> FROM <table> WHERE <condition> ORDER BY ... [LIMIT .. OFFSET ..]`.
pub(crate) fn select<'args>(
	schema: &Schema,
	condition: &Condition,
	order: &OrderBy,
	page: Page,
) -> Result<QueryBuilder<'args, Sqlite>> {
	let mut qb = QueryBuilder::new("SELECT ");
	qb.push(schema.column_list());
	qb.push(" FROM ");
	qb.push(schema.quoted_table());
	qb.push(" WHERE ");
	condition.push_sql(&mut qb);
	order.push_sql(schema, &mut qb)?;

	if let Some((limit, offset)) = page.window() {
		qb.push(" LIMIT ");
		qb.push_bind(limit);
		qb.push(" OFFSET ");
		qb.push_bind(offset);
	}

	Ok(qb)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::DbError;
	use crate::schema::{Field, FieldKind};

	static NOTES: Schema = Schema {
		name: "Note",
		table: "notes",
		primary_key: "id",
		fields: &[
			Field::new("id", FieldKind::Integer),
			Field::new("body", FieldKind::Text),
			Field::new("created_at", FieldKind::Timestamp),
		],
	};

	#[test]
	fn test_default_order_is_primary_key() {
		let qb = select(&NOTES, &Condition::True, &OrderBy::default(), Page::default()).unwrap();
		assert_eq!(
			qb.sql(),
			"SELECT \"id\", \"body\", \"created_at\" FROM \"notes\" WHERE 1 = 1 ORDER BY \"id\" ASC"
		);
	}

	#[test]
	fn test_order_spec_parsing() {
		let order = OrderBy::from("-created_at, id");
		assert_eq!(
			order,
			OrderBy::desc("created_at").then("id", Direction::Asc)
		);
		assert_eq!(OrderBy::from(["body", "-id"]), OrderBy::asc("body").then("id", Direction::Desc));
	}

	#[test]
	fn test_pagination_needs_both_halves() {
		let half = Page {
			limit: Some(10),
			offset: None,
		};
		assert_eq!(half.window(), None);
		let qb = select(&NOTES, &Condition::True, &OrderBy::default(), half).unwrap();
		assert!(!qb.sql().contains("LIMIT"));

		let qb = select(&NOTES, &Condition::True, &OrderBy::default(), Page::new(10, 20)).unwrap();
		assert!(qb.sql().ends_with("LIMIT ? OFFSET ?"));
	}

	#[test]
	fn test_unknown_order_field() {
		let result = select(&NOTES, &Condition::True, &OrderBy::asc("title"), Page::default());
		assert!(matches!(result, Err(DbError::FieldDoesNotExist { .. })));
	}
}
