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

//! Notification outbox operations.
//!
//! Rows are enqueued inside the intake transaction and removed by the relay
//! once the matching outstanding event has been published.

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{
    to_naive, NewPgOutboxRow, NewSqliteOutboxRow, PgOutboxRow, SqliteOutboxRow,
};
use super::transaction::{NotificationTransaction, TransactionConnection};
use super::DAL;
use crate::database::schema::{postgres as pg, sqlite};
use crate::database::BackendType;
use crate::error::StoreError;
use crate::models::outbox::OutboxEntry;

#[derive(Clone)]
pub struct OutboxDAL<'a> {
    dal: &'a DAL,
}

impl<'a> OutboxDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Records that `notification_id` still needs an outstanding event.
    pub async fn enqueue(
        &self,
        tx: &NotificationTransaction,
        notification_id: Uuid,
    ) -> Result<(), StoreError> {
        let created_at = to_naive(Utc::now());

        match tx.connection()? {
            TransactionConnection::Postgres(conn) => {
                let row = NewPgOutboxRow {
                    notification_id,
                    created_at,
                };
                conn.interact(move |conn| {
                    diesel::insert_into(pg::notification_outbox::table)
                        .values(&row)
                        .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
            }
            TransactionConnection::Sqlite(conn) => {
                let row = NewSqliteOutboxRow {
                    notification_id: notification_id.to_string(),
                    created_at,
                };
                conn.interact(move |conn| {
                    diesel::insert_into(sqlite::notification_outbox::table)
                        .values(&row)
                        .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
            }
        }
        Ok(())
    }

    /// Lists up to `limit` pending entries, oldest first.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, StoreError> {
        match self.dal.backend() {
            BackendType::Postgres => {
                let conn = self.dal.database.get_postgres_connection().await?;
                let rows: Vec<PgOutboxRow> = conn
                    .interact(move |conn| {
                        pg::notification_outbox::table
                            .order(pg::notification_outbox::id.asc())
                            .limit(limit)
                            .select(PgOutboxRow::as_select())
                            .load(conn)
                    })
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
                Ok(rows.into_iter().map(OutboxEntry::from).collect())
            }
            BackendType::Sqlite => {
                let conn = self.dal.database.get_sqlite_connection().await?;
                let rows: Vec<SqliteOutboxRow> = conn
                    .interact(move |conn| {
                        sqlite::notification_outbox::table
                            .order(sqlite::notification_outbox::id.asc())
                            .limit(limit)
                            .select(SqliteOutboxRow::as_select())
                            .load(conn)
                    })
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
                rows.into_iter().map(OutboxEntry::try_from).collect()
            }
        }
    }

    /// Deletes the given entries. Returns the number removed.
    pub async fn delete(&self, entry_ids: Vec<i64>) -> Result<usize, StoreError> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let deleted = match self.dal.backend() {
            BackendType::Postgres => {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| {
                    diesel::delete(
                        pg::notification_outbox::table
                            .filter(pg::notification_outbox::id.eq_any(entry_ids)),
                    )
                    .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
            BackendType::Sqlite => {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| {
                    diesel::delete(
                        sqlite::notification_outbox::table
                            .filter(sqlite::notification_outbox::id.eq_any(entry_ids)),
                    )
                    .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
        };
        Ok(deleted)
    }

    /// Number of pending entries.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let count = match self.dal.backend() {
            BackendType::Postgres => {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(|conn| pg::notification_outbox::table.count().get_result::<i64>(conn))
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
            BackendType::Sqlite => {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(|conn| {
                    sqlite::notification_outbox::table
                        .count()
                        .get_result::<i64>(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
        };
        Ok(count)
    }
}
