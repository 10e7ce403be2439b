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

//! Wire formats for the two pipeline topics and the gateway request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::{Destination, NewNotification};

/// Published on the "received" topic by the gateway write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub id: Uuid,
    pub text: String,
    pub destination: Destination,
    pub received_at: DateTime<Utc>,
}

impl ReceivedEvent {
    pub fn into_new_notification(self) -> NewNotification {
        NewNotification {
            id: self.id,
            text: self.text,
            destination: self.destination,
            received_at: self.received_at,
        }
    }
}

/// Published on the "outstanding" topic once a notification is durably
/// recorded. Carries only the id; dispatch re-reads the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingEvent {
    pub id: Uuid,
}

/// Client request accepted by the gateway.
///
/// The id is optional; when absent a fresh v4 id is generated, which means a
/// client retry without an id is not deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(default, alias = "uuid", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "txt")]
    pub text: String,
    pub destination: String,
}
