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

//! Pipeline configuration.
//!
//! ```rust,ignore
//! let config = CourierConfig::builder()
//!     .intake_concurrency(16)
//!     .outstanding_delivery(OutstandingDelivery::Outbox)
//!     .build();
//! ```

use std::time::Duration;

/// How the intake stage hands a newly recorded notification to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutstandingDelivery {
    /// Publish the outstanding event before committing the insert.
    #[default]
    Direct,
    /// Write an outbox row in the insert transaction; the relay publishes it.
    Outbox,
}

impl std::str::FromStr for OutstandingDelivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(OutstandingDelivery::Direct),
            "outbox" => Ok(OutstandingDelivery::Outbox),
            other => Err(format!(
                "unknown outstanding delivery mode '{}' (expected 'direct' or 'outbox')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CourierConfig {
    intake_concurrency: usize,
    dispatch_concurrency: usize,
    poll_timeout: Duration,
    redelivery_delay: Duration,
    drain_timeout: Duration,
    db_pool_size: u32,
    outstanding_delivery: OutstandingDelivery,
    relay_poll_interval: Duration,
    relay_batch_size: i64,
    received_topic: String,
    outstanding_topic: String,
    intake_group_id: String,
    dispatch_group_id: String,
}

impl CourierConfig {
    pub fn builder() -> CourierConfigBuilder {
        CourierConfigBuilder::default()
    }

    /// Number of intake handlers that may run at once.
    pub fn intake_concurrency(&self) -> usize {
        self.intake_concurrency
    }

    /// Number of dispatch handlers that may run at once.
    pub fn dispatch_concurrency(&self) -> usize {
        self.dispatch_concurrency
    }

    /// Longest a poll loop waits for a message before re-checking for shutdown.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Delay before a nacked message is delivered again.
    pub fn redelivery_delay(&self) -> Duration {
        self.redelivery_delay
    }

    /// How long `stop` waits for in-flight handlers.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size
    }

    pub fn outstanding_delivery(&self) -> OutstandingDelivery {
        self.outstanding_delivery
    }

    pub fn relay_poll_interval(&self) -> Duration {
        self.relay_poll_interval
    }

    pub fn relay_batch_size(&self) -> i64 {
        self.relay_batch_size
    }

    pub fn received_topic(&self) -> &str {
        &self.received_topic
    }

    pub fn outstanding_topic(&self) -> &str {
        &self.outstanding_topic
    }

    pub fn intake_group_id(&self) -> &str {
        &self.intake_group_id
    }

    pub fn dispatch_group_id(&self) -> &str {
        &self.dispatch_group_id
    }
}

#[derive(Debug, Clone)]
pub struct CourierConfigBuilder {
    config: CourierConfig,
}

impl Default for CourierConfigBuilder {
    fn default() -> Self {
        Self {
            config: CourierConfig {
                intake_concurrency: 8,
                dispatch_concurrency: 8,
                poll_timeout: Duration::from_millis(100),
                redelivery_delay: Duration::from_secs(1),
                drain_timeout: Duration::from_secs(10),
                db_pool_size: 10,
                outstanding_delivery: OutstandingDelivery::Direct,
                relay_poll_interval: Duration::from_millis(500),
                relay_batch_size: 100,
                received_topic: "received".to_string(),
                outstanding_topic: "outstanding".to_string(),
                intake_group_id: "courier-intake".to_string(),
                dispatch_group_id: "courier-dispatch".to_string(),
            },
        }
    }
}

impl CourierConfigBuilder {
    pub fn intake_concurrency(mut self, value: usize) -> Self {
        self.config.intake_concurrency = value.max(1);
        self
    }

    pub fn dispatch_concurrency(mut self, value: usize) -> Self {
        self.config.dispatch_concurrency = value.max(1);
        self
    }

    pub fn poll_timeout(mut self, value: Duration) -> Self {
        self.config.poll_timeout = value;
        self
    }

    pub fn redelivery_delay(mut self, value: Duration) -> Self {
        self.config.redelivery_delay = value;
        self
    }

    pub fn drain_timeout(mut self, value: Duration) -> Self {
        self.config.drain_timeout = value;
        self
    }

    pub fn db_pool_size(mut self, value: u32) -> Self {
        self.config.db_pool_size = value;
        self
    }

    pub fn outstanding_delivery(mut self, value: OutstandingDelivery) -> Self {
        self.config.outstanding_delivery = value;
        self
    }

    pub fn relay_poll_interval(mut self, value: Duration) -> Self {
        self.config.relay_poll_interval = value;
        self
    }

    pub fn relay_batch_size(mut self, value: i64) -> Self {
        self.config.relay_batch_size = value.max(1);
        self
    }

    pub fn received_topic(mut self, value: impl Into<String>) -> Self {
        self.config.received_topic = value.into();
        self
    }

    pub fn outstanding_topic(mut self, value: impl Into<String>) -> Self {
        self.config.outstanding_topic = value.into();
        self
    }

    pub fn intake_group_id(mut self, value: impl Into<String>) -> Self {
        self.config.intake_group_id = value.into();
        self
    }

    pub fn dispatch_group_id(mut self, value: impl Into<String>) -> Self {
        self.config.dispatch_group_id = value.into();
        self
    }

    pub fn build(self) -> CourierConfig {
        self.config
    }
}

impl Default for CourierConfig {
    fn default() -> Self {
        CourierConfigBuilder::default().build()
    }
}
