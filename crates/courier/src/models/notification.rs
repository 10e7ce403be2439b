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

//! Notification records and their enumerated fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DestinationError;

/// Delivery channel of a notification.
///
/// Stored as a SMALLINT and serialized in events as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum Destination {
    Sms,
    Email,
    Slack,
}

impl Destination {
    pub const ALL: [Destination; 3] = [Destination::Sms, Destination::Email, Destination::Slack];

    /// Code returned by [`Destination::code_for_name`] for unknown names.
    pub const UNKNOWN_CODE: i16 = -1;

    pub fn code(self) -> i16 {
        match self {
            Destination::Sms => 0,
            Destination::Email => 1,
            Destination::Slack => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Sms => "SMS",
            Destination::Email => "EMAIL",
            Destination::Slack => "SLACK",
        }
    }

    /// Maps a client-facing name to its code, or `-1` when it names nothing.
    pub fn code_for_name(name: &str) -> i16 {
        name.parse::<Destination>()
            .map(Destination::code)
            .unwrap_or(Self::UNKNOWN_CODE)
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SMS" => Ok(Destination::Sms),
            "EMAIL" => Ok(Destination::Email),
            "SLACK" => Ok(Destination::Slack),
            _ => Err(DestinationError::UnknownName(s.to_string())),
        }
    }
}

impl TryFrom<i16> for Destination {
    type Error = DestinationError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Destination::Sms),
            1 => Ok(Destination::Email),
            2 => Ok(Destination::Slack),
            other => Err(DestinationError::UnknownCode(other)),
        }
    }
}

impl From<Destination> for i16 {
    fn from(destination: Destination) -> Self {
        destination.code()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of a stored notification. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotificationStatus {
    NotProcessed,
    Processed,
}

impl NotificationStatus {
    pub fn code(self) -> i16 {
        match self {
            NotificationStatus::NotProcessed => 0,
            NotificationStatus::Processed => 1,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(NotificationStatus::NotProcessed),
            1 => Some(NotificationStatus::Processed),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationStatus::NotProcessed => f.write_str("NOT_PROCESSED"),
            NotificationStatus::Processed => f.write_str("PROCESSED"),
        }
    }
}

/// A notification as held by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub text: String,
    pub destination: Destination,
    pub status: NotificationStatus,
    pub received_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Fields needed to insert a notification. Status starts as
/// [`NotificationStatus::NotProcessed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub id: Uuid,
    pub text: String,
    pub destination: Destination,
    pub received_at: DateTime<Utc>,
}
