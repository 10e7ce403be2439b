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

//! Notification store operations.
//!
//! `insert_if_absent` is the only deduplication signal in the pipeline and
//! `lock_for_update` is the only per-id serialization point.

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{
    to_naive, NewPgNotificationRow, NewSqliteNotificationRow, PgNotificationRow,
    SqliteNotificationRow,
};
use super::transaction::{NotificationTransaction, TransactionConnection};
use super::DAL;
use crate::database::schema::{postgres as pg, sqlite};
use crate::database::BackendType;
use crate::error::StoreError;
use crate::models::notification::{NewNotification, NotificationRecord, NotificationStatus};

#[derive(Clone)]
pub struct NotificationDAL<'a> {
    dal: &'a DAL,
}

impl<'a> NotificationDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts `new` unless a row with the same id exists.
    ///
    /// Returns 1 when the row was created and 0 when it already existed.
    pub async fn insert_if_absent(
        &self,
        tx: &NotificationTransaction,
        new: NewNotification,
    ) -> Result<usize, StoreError> {
        let affected = match tx.connection()? {
            TransactionConnection::Postgres(conn) => {
                let row = NewPgNotificationRow::from(new);
                conn.interact(move |conn| {
                    diesel::insert_into(pg::notifications::table)
                        .values(&row)
                        .on_conflict(pg::notifications::id)
                        .do_nothing()
                        .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
            TransactionConnection::Sqlite(conn) => {
                let row = NewSqliteNotificationRow::from(new);
                conn.interact(move |conn| {
                    diesel::insert_into(sqlite::notifications::table)
                        .values(&row)
                        .on_conflict(sqlite::notifications::id)
                        .do_nothing()
                        .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
        };
        Ok(affected)
    }

    /// Reads the row for `id` and holds a write lock on it until `tx` ends.
    ///
    /// On SQLite the lock was already taken by `BEGIN IMMEDIATE`.
    pub async fn lock_for_update(
        &self,
        tx: &NotificationTransaction,
        id: Uuid,
    ) -> Result<NotificationRecord, StoreError> {
        match tx.connection()? {
            TransactionConnection::Postgres(conn) => {
                let row: Option<PgNotificationRow> = conn
                    .interact(move |conn| {
                        pg::notifications::table
                            .filter(pg::notifications::id.eq(id))
                            .select(PgNotificationRow::as_select())
                            .for_update()
                            .get_result(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
                row.ok_or(StoreError::NotFound(id))?.try_into()
            }
            TransactionConnection::Sqlite(_) => self.get(tx, id).await,
        }
    }

    /// Sets the status of `id` and bumps `last_updated_at`.
    ///
    /// The update only applies when it does not move the status backwards, so
    /// writing `NotProcessed` over `Processed` affects nothing. Re-applying the
    /// current status succeeds. Returns the number of rows changed.
    pub async fn update_status(
        &self,
        tx: &NotificationTransaction,
        id: Uuid,
        new_status: NotificationStatus,
    ) -> Result<usize, StoreError> {
        let code = new_status.code();
        let now = to_naive(Utc::now());

        let affected = match tx.connection()? {
            TransactionConnection::Postgres(conn) => conn
                .interact(move |conn| {
                    diesel::update(
                        pg::notifications::table
                            .filter(pg::notifications::id.eq(id))
                            .filter(pg::notifications::status.le(code)),
                    )
                    .set((
                        pg::notifications::status.eq(code),
                        pg::notifications::last_updated_at.eq(now),
                    ))
                    .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??,
            TransactionConnection::Sqlite(conn) => {
                let id = id.to_string();
                conn.interact(move |conn| {
                    diesel::update(
                        sqlite::notifications::table
                            .filter(sqlite::notifications::id.eq(id))
                            .filter(sqlite::notifications::status.le(code)),
                    )
                    .set((
                        sqlite::notifications::status.eq(code),
                        sqlite::notifications::last_updated_at.eq(now),
                    ))
                    .execute(conn)
                })
                .await
                .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
        };
        Ok(affected)
    }

    /// Reads the row for `id` without locking it.
    pub async fn get(
        &self,
        tx: &NotificationTransaction,
        id: Uuid,
    ) -> Result<NotificationRecord, StoreError> {
        match tx.connection()? {
            TransactionConnection::Postgres(conn) => {
                let row: Option<PgNotificationRow> = conn
                    .interact(move |conn| {
                        pg::notifications::table
                            .filter(pg::notifications::id.eq(id))
                            .select(PgNotificationRow::as_select())
                            .first(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
                row.ok_or(StoreError::NotFound(id))?.try_into()
            }
            TransactionConnection::Sqlite(conn) => {
                let key = id.to_string();
                let row: Option<SqliteNotificationRow> = conn
                    .interact(move |conn| {
                        sqlite::notifications::table
                            .filter(sqlite::notifications::id.eq(key))
                            .select(SqliteNotificationRow::as_select())
                            .first(conn)
                            .optional()
                    })
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
                row.ok_or(StoreError::NotFound(id))?.try_into()
            }
        }
    }

    /// Reads the row for `id` in its own short transaction.
    pub async fn get_by_id(&self, id: Uuid) -> Result<NotificationRecord, StoreError> {
        let tx = self.dal.begin().await?;
        let result = self.get(&tx, id).await;
        match result {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Number of stored notifications.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = match self.dal.backend() {
            BackendType::Postgres => {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(|conn| pg::notifications::table.count().get_result::<i64>(conn))
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
            BackendType::Sqlite => {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(|conn| sqlite::notifications::table.count().get_result::<i64>(conn))
                    .await
                    .map_err(|e| StoreError::ConnectionPool(e.to_string()))??
            }
        };
        Ok(count)
    }
}
