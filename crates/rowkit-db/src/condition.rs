// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Filter specifications and the predicates compiled from them.
//!
//! A [`Filter`] is caller input: field names as strings plus a join mode.
//! [`Condition::from_filter`] resolves it against a [`Schema`] and produces a
//! predicate whose field names are the schema's own `'static` names. An empty
//! filter joined with AND matches every row; joined with OR it matches none.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{DbError, Result};
use crate::schema::{quote_ident, Schema};
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
	#[default]
	And,
	Or,
}

impl JoinMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			JoinMode::And => "and",
			JoinMode::Or => "or",
		}
	}
}

impl FromStr for JoinMode {
	type Err = DbError;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"and" => Ok(JoinMode::And),
			"or" => Ok(JoinMode::Or),
			_ => Err(DbError::InvalidJoinMode(s.to_string())),
		}
	}
}

impl<'de> Deserialize<'de> for JoinMode {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Field → value constraints plus a join mode.
///
/// Behaves like a map: setting the same field twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
	entries: Vec<(String, Value)>,
	join: JoinMode,
}

impl Filter {
	pub fn new(join: JoinMode) -> Self {
		Self {
			entries: Vec::new(),
			join,
		}
	}

	/// Every constraint must hold.
	pub fn all() -> Self {
		Self::new(JoinMode::And)
	}

	/// At least one constraint must hold.
	pub fn any() -> Self {
		Self::new(JoinMode::Or)
	}

	pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(field, value);
		self
	}

	pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
		let field = field.into();
		let value = value.into();
		match self.entries.iter_mut().find(|(f, _)| *f == field) {
			Some(entry) => entry.1 = value,
			None => self.entries.push((field, value)),
		}
	}

	pub fn join(&self) -> JoinMode {
		self.join
	}

	pub fn with_join(mut self, join: JoinMode) -> Self {
		self.join = join;
		self
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.entries.iter().map(|(f, v)| (f.as_str(), v))
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		self.entries.iter().find(|(f, _)| f == field).map(|(_, v)| v)
	}
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for (field, value) in &self.entries {
			if !first {
				f.write_str(", ")?;
			}
			first = false;
			write!(f, "{field}: {value}")?;
		}
		Ok(())
	}
}

/// A boolean predicate over one record type.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
	True,
	False,
	/// Equality; a `Null` value compiles to `IS NULL`.
	Eq { field: &'static str, value: Value },
	/// Equality after SQLite `lower()` on both sides, which folds ASCII only.
	EqIgnoreCase { field: &'static str, value: String },
	In { field: &'static str, values: Vec<Value> },
	Not(Box<Condition>),
	And(Vec<Condition>),
	Or(Vec<Condition>),
}

impl Condition {
	/// Compile a filter against `schema`.
	pub fn from_filter(schema: &Schema, filter: &Filter) -> Result<Self> {
		let mut parts = Vec::with_capacity(filter.len());
		for (name, value) in filter.iter() {
			let field = schema.field(name)?;
			parts.push(Condition::Eq {
				field: field.name,
				value: value.clone(),
			});
		}

		Ok(match filter.join() {
			JoinMode::And if parts.is_empty() => Condition::True,
			JoinMode::Or if parts.is_empty() => Condition::False,
			JoinMode::And => Condition::And(parts),
			JoinMode::Or => Condition::Or(parts),
		})
	}

	/// Compile a filter whose join mode arrives as untyped input.
	pub fn from_parts(schema: &Schema, filter: Filter, join: &str) -> Result<Self> {
		let join = join.parse::<JoinMode>()?;
		Self::from_filter(schema, &filter.with_join(join))
	}

	/// `field = id` against the primary key.
	pub fn id_eq(schema: &Schema, id: i64) -> Self {
		Condition::Eq {
			field: schema.primary_key,
			value: Value::Integer(id),
		}
	}

	/// Primary key membership. The ids travel as a single JSON array bind.
	pub fn id_in(schema: &Schema, ids: &[i64]) -> Self {
		Condition::In {
			field: schema.primary_key,
			values: ids.iter().copied().map(Value::Integer).collect(),
		}
	}

	pub fn and(self, other: Condition) -> Self {
		match self {
			Condition::True => other,
			Condition::And(mut parts) => {
				parts.push(other);
				Condition::And(parts)
			}
			this => Condition::And(vec![this, other]),
		}
	}

	pub fn negate(self) -> Self {
		match self {
			Condition::True => Condition::False,
			Condition::False => Condition::True,
			Condition::Not(inner) => *inner,
			this => Condition::Not(Box::new(this)),
		}
	}

	/// Append this predicate to a statement under construction.
	pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
		match self {
			Condition::True => {
				qb.push("1 = 1");
			}
			Condition::False => {
				qb.push("1 = 0");
			}
			Condition::Eq { field, value } if value.is_null() => {
				qb.push(quote_ident(field));
				qb.push(" IS NULL");
			}
			Condition::Eq { field, value } => {
				qb.push(quote_ident(field));
				qb.push(" = ");
				value.push_bind(qb);
			}
			Condition::EqIgnoreCase { field, value } => {
				qb.push("lower(");
				qb.push(quote_ident(field));
				qb.push(") = lower(");
				qb.push_bind(value.clone());
				qb.push(")");
			}
			Condition::In { values, .. } if values.is_empty() => {
				qb.push("1 = 0");
			}
			Condition::In { field, values } => {
				// One JSON array parameter keeps large sets under the bind limit.
				let array: Vec<serde_json::Value> = values.iter().map(Value::to_json).collect();
				qb.push(quote_ident(field));
				qb.push(" IN (SELECT value FROM json_each(");
				qb.push_bind(serde_json::Value::Array(array).to_string());
				qb.push("))");
			}
			Condition::Not(inner) => {
				qb.push("NOT (");
				inner.push_sql(qb);
				qb.push(")");
			}
			Condition::And(parts) => push_joined(qb, parts, " AND ", "1 = 1"),
			Condition::Or(parts) => push_joined(qb, parts, " OR ", "1 = 0"),
		}
	}

	/// Render the SQL text with `?` placeholders.
	pub fn to_sql(&self) -> String {
		let mut qb = QueryBuilder::<Sqlite>::new("");
		self.push_sql(&mut qb);
		qb.sql().to_string()
	}
}

fn push_joined(
	qb: &mut QueryBuilder<'_, Sqlite>,
	parts: &[Condition],
	separator: &str,
	empty: &str,
) {
	if parts.is_empty() {
		qb.push(empty);
		return;
	}

	qb.push("(");
	for (i, part) in parts.iter().enumerate() {
		if i > 0 {
			qb.push(separator);
		}
		part.push_sql(qb);
	}
	qb.push(")");
}
