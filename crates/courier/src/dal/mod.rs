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

//! Data access layer for notifications and the notification outbox.
//!
//! Every operation has a PostgreSQL and a SQLite code path; the backend is
//! picked at runtime from the [`Database`] handle. Operations that take a
//! [`NotificationTransaction`] run on that transaction's connection and never
//! commit on their own. Coordinators own transaction boundaries.

pub mod models;
pub mod notification;
pub mod outbox;
pub mod transaction;

pub use notification::NotificationDAL;
pub use outbox::OutboxDAL;
pub use transaction::NotificationTransaction;

use crate::database::{BackendType, Database};
use crate::error::StoreError;

/// Entry point to the store.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    /// Opens a transaction on a dedicated pooled connection.
    pub async fn begin(&self) -> Result<NotificationTransaction, StoreError> {
        NotificationTransaction::begin(&self.database).await
    }

    pub fn notifications(&self) -> NotificationDAL<'_> {
        NotificationDAL::new(self)
    }

    pub fn outbox(&self) -> OutboxDAL<'_> {
        OutboxDAL::new(self)
    }
}
