// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dynamically typed field values.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{DbError, Result};

/// A single field value as it travels through filters and payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
	Null,
	Bool(bool),
	Integer(i64),
	Real(f64),
	Text(String),
	Timestamp(DateTime<Utc>),
}

impl Value {
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Value::Text(s) => Some(s),
			_ => None,
		}
	}

	/// SQLite stores booleans as integers, so `Integer(1)` is also truthy here.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Bool(b) => *b,
			Value::Integer(i) => *i != 0,
			_ => false,
		}
	}

	/// JSON form matching what SQLite stores for this value.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Value::Null => serde_json::Value::Null,
			Value::Bool(b) => serde_json::Value::from(i64::from(*b)),
			Value::Integer(i) => serde_json::Value::from(*i),
			Value::Real(r) => serde_json::Number::from_f64(*r)
				.map_or(serde_json::Value::Null, serde_json::Value::Number),
			Value::Text(s) => serde_json::Value::from(s.as_str()),
			Value::Timestamp(ts) => {
				serde_json::Value::from(ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
			}
		}
	}

	pub(crate) fn push_bind(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
		match self {
			Value::Null => qb.push_bind(None::<String>),
			Value::Bool(b) => qb.push_bind(*b),
			Value::Integer(i) => qb.push_bind(*i),
			Value::Real(r) => qb.push_bind(*r),
			Value::Text(s) => qb.push_bind(s.clone()),
			Value::Timestamp(ts) => qb.push_bind(*ts),
		};
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Bool(b) => write!(f, "{b}"),
			Value::Integer(i) => write!(f, "{i}"),
			Value::Real(r) => write!(f, "{r}"),
			Value::Text(s) => f.write_str(s),
			Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Integer(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Integer(v.into())
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Real(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Text(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Text(v)
	}
}

impl From<DateTime<Utc>> for Value {
	fn from(v: DateTime<Utc>) -> Self {
		Value::Timestamp(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map_or(Value::Null, Into::into)
	}
}

impl TryFrom<serde_json::Value> for Value {
	type Error = DbError;

	fn try_from(json: serde_json::Value) -> Result<Self> {
		match json {
			serde_json::Value::Null => Ok(Value::Null),
			serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
			serde_json::Value::Number(n) => n
				.as_i64()
				.map(Value::Integer)
				.or_else(|| n.as_f64().map(Value::Real))
				.ok_or_else(|| DbError::Internal(format!("unrepresentable number {n}"))),
			serde_json::Value::String(s) => Ok(Value::Text(s)),
			other => Err(DbError::Internal(format!(
				"nested JSON cannot be stored in a single field: {other}"
			))),
		}
	}
}
