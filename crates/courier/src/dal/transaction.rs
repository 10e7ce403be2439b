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

//! Caller-owned store transactions.
//!
//! Coordinators hold a transaction open across async work (publishing an
//! event, calling a sender), so the transaction cannot be scoped to a single
//! `interact` closure. Instead a pooled connection is checked out, `BEGIN` is
//! issued on it, and every DAL call runs on that same connection until
//! [`NotificationTransaction::commit`] or [`NotificationTransaction::rollback`].
//!
//! SQLite has no row locks, so its transactions start with `BEGIN IMMEDIATE`
//! and take the database write lock up front.
//!
//! Dropping an open transaction removes its connection from the pool; closing
//! the connection rolls the transaction back on the server.

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::{PgConnection, SqliteConnection};
use tracing::{debug, warn};

use crate::database::connection::{PgObject, SqliteObject, SQLITE_BUSY_TIMEOUT_MS};
use crate::database::{BackendType, Database};
use crate::error::StoreError;

pub(crate) enum TransactionConnection {
    Postgres(PgObject),
    Sqlite(SqliteObject),
}

/// An open transaction on a dedicated pooled connection.
pub struct NotificationTransaction {
    conn: Option<TransactionConnection>,
}

impl std::fmt::Debug for NotificationTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.conn {
            Some(TransactionConnection::Postgres(_)) => "postgres",
            Some(TransactionConnection::Sqlite(_)) => "sqlite",
            None => "finished",
        };
        f.debug_struct("NotificationTransaction")
            .field("state", &state)
            .finish()
    }
}

fn pool_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::ConnectionPool(e.to_string())
}

impl NotificationTransaction {
    pub(crate) async fn begin(database: &Database) -> Result<Self, StoreError> {
        let conn = match database.backend() {
            BackendType::Postgres => {
                let conn = database.get_postgres_connection().await?;
                conn.interact(|conn| {
                    <AnsiTransactionManager as TransactionManager<PgConnection>>::begin_transaction(
                        conn,
                    )
                })
                .await
                .map_err(pool_error)??;
                TransactionConnection::Postgres(conn)
            }
            BackendType::Sqlite => {
                let conn = database.get_sqlite_connection().await?;
                conn.interact(|conn| {
                    diesel::sql_query(format!("PRAGMA busy_timeout={};", SQLITE_BUSY_TIMEOUT_MS))
                        .execute(conn)?;
                    AnsiTransactionManager::begin_transaction_sql::<SqliteConnection>(
                        conn,
                        "BEGIN IMMEDIATE",
                    )
                })
                .await
                .map_err(pool_error)??;
                TransactionConnection::Sqlite(conn)
            }
        };

        debug!("Transaction opened");
        Ok(Self { conn: Some(conn) })
    }

    pub(crate) fn connection(&self) -> Result<&TransactionConnection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::TransactionFinished)
    }

    /// Commits the transaction and returns the connection to the pool.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        let conn = self.conn.take().ok_or(StoreError::TransactionFinished)?;
        match conn {
            TransactionConnection::Postgres(obj) => {
                let result = obj
                    .interact(|conn| {
                        <AnsiTransactionManager as TransactionManager<PgConnection>>::commit_transaction(conn)
                    })
                    .await;
                finish(obj, result)
            }
            TransactionConnection::Sqlite(obj) => {
                let result = obj
                    .interact(|conn| {
                        <AnsiTransactionManager as TransactionManager<SqliteConnection>>::commit_transaction(conn)
                    })
                    .await;
                finish(obj, result)
            }
        }
    }

    /// Rolls the transaction back and returns the connection to the pool.
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        let conn = self.conn.take().ok_or(StoreError::TransactionFinished)?;
        match conn {
            TransactionConnection::Postgres(obj) => {
                let result = obj
                    .interact(|conn| {
                        <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(conn)
                    })
                    .await;
                finish(obj, result)
            }
            TransactionConnection::Sqlite(obj) => {
                let result = obj
                    .interact(|conn| {
                        <AnsiTransactionManager as TransactionManager<SqliteConnection>>::rollback_transaction(conn)
                    })
                    .await;
                finish(obj, result)
            }
        }
    }
}

/// Releases `obj` after commit or rollback. A connection whose transaction
/// did not end cleanly is removed from the pool instead.
fn finish<M, E>(
    obj: deadpool::managed::Object<M>,
    result: Result<QueryResult<()>, E>,
) -> Result<(), StoreError>
where
    M: deadpool::managed::Manager,
    E: std::fmt::Display,
{
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            drop(deadpool::managed::Object::take(obj));
            Err(StoreError::Database(e))
        }
        Err(e) => {
            drop(deadpool::managed::Object::take(obj));
            Err(pool_error(e))
        }
    }
}

impl Drop for NotificationTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Transaction dropped without commit or rollback; discarding its connection");
            match conn {
                TransactionConnection::Postgres(obj) => drop(deadpool::managed::Object::take(obj)),
                TransactionConnection::Sqlite(obj) => drop(deadpool::managed::Object::take(obj)),
            }
        }
    }
}
