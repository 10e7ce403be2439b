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

//! Error types for the notification pipeline.
//!
//! Each layer has its own enum. Handler-level errors wrap the lower layers so
//! that the coordinators can decide between dropping a message (decode
//! failures) and requesting redelivery (everything else).

use thiserror::Error;
use uuid::Uuid;

use crate::models::notification::Destination;

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Notification not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Transaction has already been committed or rolled back")]
    TransactionFinished,

    #[error("Unable to detect database backend from URL '{0}'")]
    UnsupportedBackend(String),

    #[error("In-memory SQLite databases are not supported: '{0}'")]
    InMemoryUnsupported(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Errors raised by message channel producers and consumers.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel has already been stopped")]
    AlreadyStopped,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel configuration error: {0}")]
    Configuration(String),

    #[error("Delivery was not issued by this consumer: {topic}/{partition}@{offset}")]
    UnknownDelivery {
        topic: String,
        partition: i32,
        offset: i64,
    },
}

/// Errors raised while routing a notification to a sender.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("No sender registered for destination {0}")]
    NoSender(Destination),

    #[error("A sender is already registered for destination {0}")]
    DuplicateSender(Destination),

    #[error("Missing senders for destinations: {0:?}")]
    Incomplete(Vec<Destination>),

    #[error("Sender for {destination} failed: {message}")]
    SendFailed {
        destination: Destination,
        message: String,
    },
}

/// A destination name or stored code that does not map to a known channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DestinationError {
    #[error("no such destination exists: '{0}'")]
    UnknownName(String),

    #[error("no such destination code: {0}")]
    UnknownCode(i16),
}

/// Errors returned to the gateway by `IntakeCoordinator::submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    NoSuchDestination(#[from] DestinationError),

    #[error("Invalid notification id '{0}'")]
    InvalidId(String),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish event: {0}")]
    Channel(#[from] ChannelError),
}

impl SubmitError {
    /// True when the request itself is malformed, as opposed to an
    /// infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SubmitError::NoSuchDestination(_) | SubmitError::InvalidId(_))
    }
}

/// Errors raised by the worker pool.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Worker pool drain timed out with {0} workers still running")]
    DrainTimeout(usize),
}

/// Errors surfaced at the message handler boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Notifier(#[from] NotifierError),
}

impl HandlerError {
    /// Decode failures can never succeed on redelivery.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HandlerError::Decode(_))
    }
}
