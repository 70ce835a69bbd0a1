// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Create and update payloads.
//!
//! Every field of a payload is in one of three states: absent (leave it
//! alone), explicitly cleared (write null), or set to a value. [`Patch`]
//! carries that state for a single typed field at the boundary, and
//! [`Payload`] carries it for a whole record once field names are strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::value::Value;

/// Three-state field update.
///
/// With `#[serde(default)]` on the containing struct, a missing key
/// deserializes to `Unset`, `null` to `Null`, and anything else to `Value`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
	#[default]
	Unset,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_unset(&self) -> bool {
		matches!(self, Patch::Unset)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Patch::Null)
	}

	pub fn as_value(&self) -> Option<&T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
		match self {
			Patch::Unset => Patch::Unset,
			Patch::Null => Patch::Null,
			Patch::Value(v) => Patch::Value(f(v)),
		}
	}

	/// `None` when unset, `Some(None)` when cleared.
	pub fn into_option(self) -> Option<Option<T>> {
		match self {
			Patch::Unset => None,
			Patch::Null => Some(None),
			Patch::Value(v) => Some(Some(v)),
		}
	}
}

impl<T> From<Option<T>> for Patch<T> {
	fn from(v: Option<T>) -> Self {
		v.map_or(Patch::Null, Patch::Value)
	}
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		Option::<T>::deserialize(deserializer).map(Patch::from)
	}
}

impl<T: Serialize> Serialize for Patch<T> {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		match self {
			Patch::Value(v) => serializer.serialize_some(v),
			Patch::Unset | Patch::Null => serializer.serialize_none(),
		}
	}
}

static UNSET: Patch<Value> = Patch::Unset;

/// Field name → [`Patch`] for one record, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
	fields: Vec<(String, Patch<Value>)>,
}

impl Payload {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(field, Patch::Value(value.into()));
		self
	}

	pub fn clear(mut self, field: impl Into<String>) -> Self {
		self.insert(field, Patch::Null);
		self
	}

	/// Record a typed patch; `Unset` removes the field.
	pub fn patch<T: Into<Value>>(mut self, field: impl Into<String>, patch: Patch<T>) -> Self {
		self.insert(field, patch.map(Into::into));
		self
	}

	pub fn insert(&mut self, field: impl Into<String>, patch: Patch<Value>) {
		let field = field.into();
		let patch = match patch {
			Patch::Value(Value::Null) => Patch::Null,
			other => other,
		};

		if patch.is_unset() {
			self.fields.retain(|(f, _)| *f != field);
			return;
		}

		match self.fields.iter_mut().find(|(f, _)| *f == field) {
			Some(entry) => entry.1 = patch,
			None => self.fields.push((field, patch)),
		}
	}

	/// `Unset` for fields the payload does not mention.
	pub fn get(&self, field: &str) -> &Patch<Value> {
		self.fields
			.iter()
			.find(|(f, _)| f == field)
			.map(|(_, p)| p)
			.unwrap_or(&UNSET)
	}

	pub fn contains(&self, field: &str) -> bool {
		self.fields.iter().any(|(f, _)| f == field)
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Patch<Value>)> {
		self.fields.iter().map(|(f, p)| (f.as_str(), p))
	}

	/// Overlay `extras`; its entries win over existing ones.
	pub fn merged(mut self, extras: &Payload) -> Self {
		for (field, patch) in extras.iter() {
			self.insert(field, patch.clone());
		}
		self
	}

	/// Drop the named fields.
	pub fn without(mut self, exclude: &[&str]) -> Self {
		self.fields.retain(|(f, _)| !exclude.contains(&f.as_str()));
		self
	}

	/// Build from a JSON object: `null` clears, missing keys stay unset.
	pub fn from_json(object: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
		let mut payload = Payload::new();
		for (field, json) in object {
			payload.insert(field, Patch::Value(Value::try_from(json)?));
		}
		Ok(payload)
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut payload = Payload::new();
		for (field, value) in iter {
			payload.insert(field, Patch::Value(value.into()));
		}
		payload
	}
}
