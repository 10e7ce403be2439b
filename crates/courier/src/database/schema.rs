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

//! Diesel table definitions, one module per backend.
//!
//! PostgreSQL stores ids as native UUIDs; SQLite stores them as hyphenated
//! text. Timestamps are UTC without zone on both.

pub mod postgres {
    diesel::table! {
        notifications (id) {
            id -> Uuid,
            text -> Text,
            destination -> SmallInt,
            status -> SmallInt,
            received_at -> Timestamp,
            last_updated_at -> Timestamp,
        }
    }

    diesel::table! {
        notification_outbox (id) {
            id -> BigInt,
            notification_id -> Uuid,
            created_at -> Timestamp,
        }
    }

    diesel::allow_tables_to_appear_in_same_query!(notifications, notification_outbox);
}

pub mod sqlite {
    diesel::table! {
        notifications (id) {
            id -> Text,
            text -> Text,
            destination -> SmallInt,
            status -> SmallInt,
            received_at -> Timestamp,
            last_updated_at -> Timestamp,
        }
    }

    diesel::table! {
        notification_outbox (id) {
            id -> BigInt,
            notification_id -> Text,
            created_at -> Timestamp,
        }
    }

    diesel::allow_tables_to_appear_in_same_query!(notifications, notification_outbox);
}
