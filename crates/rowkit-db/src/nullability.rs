// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Nullability checks driven by schema metadata.

use crate::error::{DbError, Result};
use crate::payload::{Patch, Payload};
use crate::schema::{Record, Schema};

/// Whether `field` of `R` accepts null.
pub fn is_nullable<R: Record>(field: &str) -> Result<bool> {
	R::schema().is_nullable(field)
}

/// Fail with `NonNullable` unless `field` accepts null.
pub fn ensure_nullable(schema: &Schema, field: &str) -> Result<()> {
	if schema.is_nullable(field)? {
		Ok(())
	} else {
		tracing::debug!(record = schema.name, field, "rejected null for non-nullable field");
		Err(DbError::NonNullable {
			record: schema.name,
			field: field.to_string(),
		})
	}
}

/// Every mentioned field must exist and must not be the primary key; every
/// explicit clear must target a nullable field.
pub fn validate_payload(schema: &Schema, payload: &Payload) -> Result<()> {
	for (name, patch) in payload.iter() {
		let field = schema.field(name)?;
		if schema.is_primary_key(field.name) {
			return Err(DbError::ImmutableField {
				record: schema.name,
				field: field.name.to_string(),
			});
		}
		if let Patch::Null = patch {
			ensure_nullable(schema, field.name)?;
		}
	}
	Ok(())
}
