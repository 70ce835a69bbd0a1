// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fixture record types and in-memory pools for tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::payload::{Patch, Payload};
use crate::schema::{Field, FieldKind, Generated, Record, Schema};

static LANGUAGE_SCHEMA: Schema = Schema {
	name: "Language",
	table: "languages",
	primary_key: "id",
	fields: &[
		Field::new("id", FieldKind::Integer),
		Field::new("title", FieldKind::Text).unique(),
		Field::new("description", FieldKind::Text).nullable(),
		Field::new("is_active", FieldKind::Bool).default_sql("0"),
		Field::new("created_at", FieldKind::Timestamp).generated(Generated::CreatedAt),
		Field::new("updated_at", FieldKind::Timestamp).generated(Generated::UpdatedAt),
	],
};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Language {
	pub id: i64,
	pub title: String,
	pub description: Option<String>,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Record for Language {
	fn schema() -> &'static Schema {
		&LANGUAGE_SCHEMA
	}

	fn id(&self) -> i64 {
		self.id
	}
}

/// Create input for [`Language`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewLanguage {
	pub title: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub is_active: bool,
}

impl From<&NewLanguage> for Payload {
	fn from(new: &NewLanguage) -> Self {
		Payload::new()
			.set("title", new.title.clone())
			.set("description", new.description.clone())
			.set("is_active", new.is_active)
	}
}

/// Partial update input for [`Language`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LanguagePatch {
	pub title: Patch<String>,
	pub description: Patch<String>,
	pub is_active: Patch<bool>,
}

impl From<LanguagePatch> for Payload {
	fn from(patch: LanguagePatch) -> Self {
		Payload::new()
			.patch("title", patch.title)
			.patch("description", patch.description)
			.patch("is_active", patch.is_active)
	}
}

static TAG_SCHEMA: Schema = Schema {
	name: "Tag",
	table: "tags",
	primary_key: "id",
	fields: &[
		Field::new("id", FieldKind::Integer),
		Field::new("name", FieldKind::Text).unique(),
		Field::new("slug", FieldKind::Text).unique(),
		Field::new("language_id", FieldKind::Integer).nullable(),
		Field::new("weight", FieldKind::Real).default_sql("0"),
	],
};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Tag {
	pub id: i64,
	pub name: String,
	pub slug: String,
	pub language_id: Option<i64>,
	pub weight: f64,
}

impl Record for Tag {
	fn schema() -> &'static Schema {
		&TAG_SCHEMA
	}

	fn id(&self) -> i64 {
		self.id
	}
}

pub async fn create_test_pool() -> SqlitePool {
	SqlitePool::connect(":memory:").await.unwrap()
}

pub async fn create_table<R: Record>(pool: &SqlitePool) {
	sqlx::query(&R::schema().create_table_sql())
		.execute(pool)
		.await
		.unwrap();
}

pub async fn create_record_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_table::<Language>(&pool).await;
	create_table::<Tag>(&pool).await;
	pool
}

/// Insert a language with raw SQL, bypassing the repository.
pub async fn insert_language(pool: &SqlitePool, title: &str) -> i64 {
	let now = Utc::now();
	sqlx::query("INSERT INTO languages (title, created_at, updated_at) VALUES (?, ?, ?)")
		.bind(title)
		.bind(now)
		.bind(now)
		.execute(pool)
		.await
		.unwrap()
		.last_insert_rowid()
}
