// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema descriptors for record types.
//!
//! A record type describes itself through a static [`Schema`]; nothing in
//! this crate inspects rows or structs at runtime. Every field name that
//! reaches generated SQL has been resolved against the schema first, so
//! identifiers are never taken from caller input verbatim.

use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
	Integer,
	Real,
	Text,
	Bool,
	Timestamp,
}

impl FieldKind {
	fn sql_type(&self) -> &'static str {
		match self {
			FieldKind::Integer | FieldKind::Bool => "INTEGER",
			FieldKind::Real => "REAL",
			FieldKind::Text | FieldKind::Timestamp => "TEXT",
		}
	}
}

/// Timestamps filled in by the repository rather than the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generated {
	/// Set once on insert.
	CreatedAt,
	/// Set on insert and on every update that changes a field.
	UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
	pub name: &'static str,
	pub kind: FieldKind,
	pub nullable: bool,
	pub unique: bool,
	pub generated: Option<Generated>,
	/// SQL literal used as the column default, e.g. `"1"`.
	pub default_sql: Option<&'static str>,
}

impl Field {
	pub const fn new(name: &'static str, kind: FieldKind) -> Self {
		Self {
			name,
			kind,
			nullable: false,
			unique: false,
			generated: None,
			default_sql: None,
		}
	}

	pub const fn nullable(self) -> Self {
		Self {
			nullable: true,
			..self
		}
	}

	pub const fn unique(self) -> Self {
		Self {
			unique: true,
			..self
		}
	}

	pub const fn generated(self, generated: Generated) -> Self {
		Self {
			generated: Some(generated),
			..self
		}
	}

	pub const fn default_sql(self, literal: &'static str) -> Self {
		Self {
			default_sql: Some(literal),
			..self
		}
	}

	/// Whether an insert may omit this field.
	pub fn may_be_omitted(&self) -> bool {
		self.nullable || self.generated.is_some() || self.default_sql.is_some()
	}
}

/// Metadata for one record type.
#[derive(Debug)]
pub struct Schema {
	/// Record type name used in errors and logs.
	pub name: &'static str,
	pub table: &'static str,
	pub primary_key: &'static str,
	pub fields: &'static [Field],
}

impl Schema {
	pub fn fields(&self) -> &'static [Field] {
		self.fields
	}

	pub fn field(&self, name: &str) -> Result<&'static Field> {
		self.fields
			.iter()
			.find(|f| f.name == name)
			.ok_or_else(|| DbError::FieldDoesNotExist {
				record: self.name,
				field: name.to_string(),
			})
	}

	pub fn has_field(&self, name: &str) -> bool {
		self.fields.iter().any(|f| f.name == name)
	}

	pub fn is_nullable(&self, name: &str) -> Result<bool> {
		self.field(name).map(|f| f.nullable)
	}

	pub fn is_unique(&self, name: &str) -> Result<bool> {
		self.field(name).map(|f| f.unique)
	}

	pub fn unique_fields(&self) -> impl Iterator<Item = &'static Field> {
		self.fields.iter().filter(|f| f.unique)
	}

	pub fn is_primary_key(&self, name: &str) -> bool {
		self.primary_key == name
	}

	pub(crate) fn quoted_table(&self) -> String {
		quote_ident(self.table)
	}

	pub(crate) fn column_list(&self) -> String {
		self.fields
			.iter()
			.map(|f| quote_ident(f.name))
			.collect::<Vec<_>>()
			.join(", ")
	}

	/// `CREATE TABLE IF NOT EXISTS` statement matching this schema.
	///
	/// The primary key is an autoincrementing integer so ids are never reused
	/// after deletion.
	pub fn create_table_sql(&self) -> String {
		let columns = self
			.fields
			.iter()
			.map(|f| {
				if self.is_primary_key(f.name) {
					return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(f.name));
				}
				let mut column = format!("{} {}", quote_ident(f.name), f.kind.sql_type());
				if !f.nullable {
					column.push_str(" NOT NULL");
				}
				if f.unique {
					column.push_str(" UNIQUE");
				}
				if let Some(default) = f.default_sql {
					column.push_str(" DEFAULT ");
					column.push_str(default);
				}
				column
			})
			.collect::<Vec<_>>()
			.join(", ");

		format!(
			"CREATE TABLE IF NOT EXISTS {} ({columns})",
			self.quoted_table()
		)
	}
}

pub(crate) fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

/// A persisted record type.
///
/// Implementors pair a `FromRow` impl with a static schema describing the
/// same columns.
pub trait Record: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static {
	fn schema() -> &'static Schema;

	fn id(&self) -> i64;
}
