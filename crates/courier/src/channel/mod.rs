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

//! Message channel abstraction.
//!
//! The pipeline talks to its transport through two traits. A [`Producer`]
//! publishes to one topic; a [`Consumer`] reads one topic on behalf of one
//! consumer group. Delivery is at-least-once: a message is only considered
//! consumed once it has been acked, and the committed position never moves
//! past an offset that has not been acked (see [`offsets::OffsetTracker`]).
//!
//! Two transports are provided: [`kafka`] (behind the `kafka` feature) and the
//! in-process [`memory`] broker.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod offsets;
pub mod redelivery;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ChannelError;

/// A message handed out by a [`Consumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every local redelivery.
    pub attempt: u32,
}

/// Publishes payloads to a single topic.
#[async_trait]
pub trait Producer: Send + Sync {
    fn topic(&self) -> &str;

    /// Publishes `payload` and waits for the transport to confirm it.
    ///
    /// Returns [`ChannelError::AlreadyStopped`] once [`Producer::stop`] has run.
    async fn send(&self, payload: Vec<u8>) -> Result<(), ChannelError>;

    /// Flushes outstanding messages and refuses further sends.
    async fn stop(&self) -> Result<(), ChannelError>;
}

/// Reads a single topic for a single consumer group.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn topic(&self) -> &str;

    /// Waits up to `timeout` for the next delivery. `Ok(None)` means the wait
    /// timed out.
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, ChannelError>;

    /// Marks `delivery` as fully handled. The committed position may advance.
    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError>;

    /// Marks `delivery` as not handled. It will be delivered again.
    async fn nack(&self, delivery: Delivery) -> Result<(), ChannelError>;

    /// Commits the last safe position and releases the subscription.
    async fn stop(&self) -> Result<(), ChannelError>;
}
