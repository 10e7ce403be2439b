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

//! Command-line and environment configuration for `courierd`.

use std::time::Duration;

use clap::Parser;
use courier::{CourierConfig, OutstandingDelivery};

use crate::retry::Backoff;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid outstanding delivery mode: {0}")]
    InvalidDeliveryMode(String),

    #[error("KAFKA_BOOTSTRAP_SERVERS is set but courierd was built without the kafka feature")]
    KafkaUnavailable,
}

/// Courier - exactly-once notification delivery
#[derive(Parser, Debug, Clone)]
#[command(name = "courierd")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Database URL (postgres://... or a SQLite path)
    #[arg(long, env = "DATABASE_URL", default_value = "courier.db")]
    pub database_url: String,

    /// PostgreSQL database name; replaces the path of DATABASE_URL when set
    #[arg(long, env = "DATABASE_NAME", default_value = "")]
    pub database_name: String,

    /// PostgreSQL connection pool size
    #[arg(long, env = "DB_POOL_SIZE", default_value_t = 10)]
    pub db_pool_size: u32,

    /// Kafka bootstrap servers. Without it an in-process broker is used.
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    pub kafka_bootstrap_servers: Option<String>,

    #[arg(long, env = "KAFKA_CLIENT_ID", default_value = "courierd")]
    pub kafka_client_id: String,

    /// Where a new consumer group starts reading (earliest or latest)
    #[arg(long, env = "KAFKA_AUTO_OFFSET_RESET", default_value = "earliest")]
    pub kafka_auto_offset_reset: String,

    #[arg(long, env = "RECEIVED_TOPIC", default_value = "received")]
    pub received_topic: String,

    #[arg(long, env = "OUTSTANDING_TOPIC", default_value = "outstanding")]
    pub outstanding_topic: String,

    #[arg(long, env = "INTAKE_GROUP_ID", default_value = "courier-intake")]
    pub intake_group_id: String,

    #[arg(long, env = "DISPATCH_GROUP_ID", default_value = "courier-dispatch")]
    pub dispatch_group_id: String,

    #[arg(long, env = "INTAKE_CONCURRENCY", default_value_t = 8)]
    pub intake_concurrency: usize,

    #[arg(long, env = "DISPATCH_CONCURRENCY", default_value_t = 8)]
    pub dispatch_concurrency: usize,

    /// Redelivery delay for failed messages, in milliseconds
    #[arg(long, env = "REDELIVERY_DELAY_MS", default_value_t = 1000)]
    pub redelivery_delay_ms: u64,

    /// How intake hands records to dispatch: direct or outbox
    #[arg(long, env = "OUTSTANDING_DELIVERY", default_value = "direct")]
    pub outstanding_delivery: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8090)]
    pub port: u16,

    /// Retries of the initial database connection and migration
    #[arg(long, env = "STARTUP_RETRIES", default_value_t = 10)]
    pub startup_retries: u32,

    /// First delay between startup retries, in milliseconds; doubles each time
    #[arg(long, env = "STARTUP_BACKOFF_MS", default_value_t = 500)]
    pub startup_backoff_ms: u64,

    /// Upper bound on the delay between startup retries, in milliseconds
    #[arg(long, env = "STARTUP_BACKOFF_MAX_MS", default_value_t = 30_000)]
    pub startup_backoff_max_ms: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServerArgs {
    pub fn pipeline_config(&self) -> Result<CourierConfig, ConfigError> {
        let mode: OutstandingDelivery = self
            .outstanding_delivery
            .parse()
            .map_err(ConfigError::InvalidDeliveryMode)?;

        Ok(CourierConfig::builder()
            .intake_concurrency(self.intake_concurrency)
            .dispatch_concurrency(self.dispatch_concurrency)
            .redelivery_delay(Duration::from_millis(self.redelivery_delay_ms))
            .db_pool_size(self.db_pool_size)
            .outstanding_delivery(mode)
            .received_topic(self.received_topic.clone())
            .outstanding_topic(self.outstanding_topic.clone())
            .intake_group_id(self.intake_group_id.clone())
            .dispatch_group_id(self.dispatch_group_id.clone())
            .build())
    }

    /// Host and port to listen on. The host may be a name; it is resolved
    /// when binding.
    pub fn bind_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn startup_backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.startup_backoff_ms),
            max_interval: Duration::from_millis(self.startup_backoff_max_ms),
            max_retries: self.startup_retries,
        }
    }
}
