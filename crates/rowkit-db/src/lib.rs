// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generic data access over SQLite.
//!
//! Record types describe themselves with a static [`Schema`] and implement
//! [`Record`]. A [`Repository`] then provides filtered reads, validated
//! inserts, three-state partial updates and all-or-nothing deletes for any
//! of them:
//!
//! ```ignore
//! let repo = Repository::<Language>::new(pool);
//! let english = repo
//!     .create(&Payload::new().set("title", "English"), None, &[])
//!     .await?;
//! let english = repo
//!     .update(&english, &Payload::new().clear("description"), &[])
//!     .await?;
//! repo.delete([english.id]).await?;
//! ```

pub mod condition;
pub mod error;
pub mod merger;
pub mod nullability;
pub mod payload;
pub mod pool;
pub mod query;
pub mod repository;
pub mod schema;
pub mod testing;
pub mod validator;
pub mod value;

pub use condition::{Condition, Filter, JoinMode};
pub use error::{DbError, Result};
pub use payload::{Patch, Payload};
pub use pool::{create_pool, ensure_tables};
pub use query::{Direction, OrderBy, Page};
pub use repository::{RecordStore, Repository, ACTIVE_FIELD};
pub use schema::{Field, FieldKind, Generated, Record, Schema};
pub use validator::CaseMode;
pub use value::Value;
