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

//! Backend-specific row types.
//!
//! PostgreSQL rows use native UUIDs, SQLite rows use hyphenated strings. Both
//! convert into the domain types of `crate::models` at the DAL boundary.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::{postgres as pg, sqlite};
use crate::error::StoreError;
use crate::models::notification::{
    Destination, NewNotification, NotificationRecord, NotificationStatus,
};
use crate::models::outbox::OutboxEntry;

pub(crate) fn to_naive(timestamp: DateTime<Utc>) -> NaiveDateTime {
    timestamp.naive_utc()
}

pub(crate) fn from_naive(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

fn decode_fields(
    destination: i16,
    status: i16,
) -> Result<(Destination, NotificationStatus), StoreError> {
    let destination = Destination::try_from(destination)
        .map_err(|e| StoreError::InvalidData(e.to_string()))?;
    let status = NotificationStatus::from_code(status)
        .ok_or_else(|| StoreError::InvalidData(format!("no such status code: {}", status)))?;
    Ok((destination, status))
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::InvalidData(format!("bad id '{}': {}", value, e)))
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = pg::notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgNotificationRow {
    pub id: Uuid,
    pub text: String,
    pub destination: i16,
    pub status: i16,
    pub received_at: NaiveDateTime,
    pub last_updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = pg::notifications)]
pub struct NewPgNotificationRow {
    pub id: Uuid,
    pub text: String,
    pub destination: i16,
    pub status: i16,
    pub received_at: NaiveDateTime,
    pub last_updated_at: NaiveDateTime,
}

impl From<NewNotification> for NewPgNotificationRow {
    fn from(new: NewNotification) -> Self {
        let received_at = to_naive(new.received_at);
        Self {
            id: new.id,
            text: new.text,
            destination: new.destination.code(),
            status: NotificationStatus::NotProcessed.code(),
            received_at,
            last_updated_at: received_at,
        }
    }
}

impl TryFrom<PgNotificationRow> for NotificationRecord {
    type Error = StoreError;

    fn try_from(row: PgNotificationRow) -> Result<Self, Self::Error> {
        let (destination, status) = decode_fields(row.destination, row.status)?;
        Ok(NotificationRecord {
            id: row.id,
            text: row.text,
            destination,
            status,
            received_at: from_naive(row.received_at),
            last_updated_at: from_naive(row.last_updated_at),
        })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = pg::notification_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgOutboxRow {
    pub id: i64,
    pub notification_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = pg::notification_outbox)]
pub struct NewPgOutboxRow {
    pub notification_id: Uuid,
    pub created_at: NaiveDateTime,
}

impl From<PgOutboxRow> for OutboxEntry {
    fn from(row: PgOutboxRow) -> Self {
        OutboxEntry {
            id: row.id,
            notification_id: row.notification_id,
            created_at: from_naive(row.created_at),
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = sqlite::notifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteNotificationRow {
    pub id: String,
    pub text: String,
    pub destination: i16,
    pub status: i16,
    pub received_at: NaiveDateTime,
    pub last_updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sqlite::notifications)]
pub struct NewSqliteNotificationRow {
    pub id: String,
    pub text: String,
    pub destination: i16,
    pub status: i16,
    pub received_at: NaiveDateTime,
    pub last_updated_at: NaiveDateTime,
}

impl From<NewNotification> for NewSqliteNotificationRow {
    fn from(new: NewNotification) -> Self {
        let received_at = to_naive(new.received_at);
        Self {
            id: new.id.to_string(),
            text: new.text,
            destination: new.destination.code(),
            status: NotificationStatus::NotProcessed.code(),
            received_at,
            last_updated_at: received_at,
        }
    }
}

impl TryFrom<SqliteNotificationRow> for NotificationRecord {
    type Error = StoreError;

    fn try_from(row: SqliteNotificationRow) -> Result<Self, Self::Error> {
        let (destination, status) = decode_fields(row.destination, row.status)?;
        Ok(NotificationRecord {
            id: parse_uuid(&row.id)?,
            text: row.text,
            destination,
            status,
            received_at: from_naive(row.received_at),
            last_updated_at: from_naive(row.last_updated_at),
        })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = sqlite::notification_outbox)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteOutboxRow {
    pub id: i64,
    pub notification_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sqlite::notification_outbox)]
pub struct NewSqliteOutboxRow {
    pub notification_id: String,
    pub created_at: NaiveDateTime,
}

impl TryFrom<SqliteOutboxRow> for OutboxEntry {
    type Error = StoreError;

    fn try_from(row: SqliteOutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEntry {
            id: row.id,
            notification_id: parse_uuid(&row.notification_id)?,
            created_at: from_naive(row.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_starts_not_processed() {
        let new = NewNotification {
            id: Uuid::new_v4(),
            text: "hello".into(),
            destination: Destination::Slack,
            received_at: Utc::now(),
        };
        let row = NewSqliteNotificationRow::from(new.clone());
        assert_eq!(row.id, new.id.to_string());
        assert_eq!(row.destination, 2);
        assert_eq!(row.status, 0);
        assert_eq!(row.received_at, row.last_updated_at);
    }

    #[test]
    fn test_corrupt_rows_are_rejected() {
        let now = Utc::now().naive_utc();
        let row = SqliteNotificationRow {
            id: "not-a-uuid".into(),
            text: "x".into(),
            destination: 0,
            status: 0,
            received_at: now,
            last_updated_at: now,
        };
        assert!(matches!(
            NotificationRecord::try_from(row),
            Err(StoreError::InvalidData(_))
        ));

        let row = PgNotificationRow {
            id: Uuid::new_v4(),
            text: "x".into(),
            destination: 9,
            status: 0,
            received_at: now,
            last_updated_at: now,
        };
        assert!(matches!(
            NotificationRecord::try_from(row),
            Err(StoreError::InvalidData(_))
        ));
    }
}
