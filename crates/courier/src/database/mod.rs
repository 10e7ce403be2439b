/*
 *  Copyright 2025-2026 Courier Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Database connectivity, schema and embedded migrations.
//!
//! The backend (PostgreSQL or SQLite) is chosen at runtime from the
//! connection URL; see [`BackendType::from_url`].

pub mod connection;
pub mod schema;

pub use connection::{AnyPool, BackendType, Database};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

/// Migrations for the PostgreSQL backend.
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/database/migrations/postgres");

/// Migrations for the SQLite backend.
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/database/migrations/sqlite");
