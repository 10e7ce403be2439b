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

//! Kafka transport built on `rdkafka`.
//!
//! Producers wait for the broker's delivery report before `send` returns.
//! Consumers never auto-commit: acked offsets go through the
//! [`OffsetTracker`] and only the low-water mark is committed. Nacked
//! deliveries are parked locally and re-yielded by `poll`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as KafkaConsumerApi, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as KafkaProducerApi};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};

use super::offsets::{OffsetTracker, TopicPartition};
use super::redelivery::RedeliveryQueue;
use super::{Consumer, Delivery, Producer};
use crate::error::ChannelError;

fn transport_error(e: KafkaError) -> ChannelError {
    ChannelError::Transport(e.to_string())
}

/// Producer settings.
#[derive(Debug, Clone)]
pub struct KafkaProducerConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub topic: String,
    /// How long `send` waits for a delivery report.
    pub delivery_timeout: Duration,
}

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
    stopped: AtomicBool,
}

impl std::fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("topic", &self.topic)
            .finish()
    }
}

impl KafkaProducer {
    pub fn new(config: &KafkaProducerConfig) -> Result<Self, ChannelError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set(
                "message.timeout.ms",
                config.delivery_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| ChannelError::Configuration(e.to_string()))?;

        info!(
            topic = %config.topic,
            servers = %config.bootstrap_servers,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            delivery_timeout: config.delivery_timeout,
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, payload: Vec<u8>) -> Result<(), ChannelError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChannelError::AlreadyStopped);
        }

        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload.as_slice());
        match self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
        {
            Ok(_) => {
                debug!(topic = %self.topic, "Message delivered");
                Ok(())
            }
            Err((e, _)) => {
                error!(topic = %self.topic, "Message delivery failed: {}", e);
                Err(transport_error(e))
            }
        }
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.producer
            .flush(Timeout::After(self.delivery_timeout))
            .map_err(transport_error)
    }
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topic: String,
    /// `earliest` or `latest`; applies when the group has no committed offset.
    pub auto_offset_reset: String,
    pub redelivery_delay: Duration,
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
    tracker: Mutex<OffsetTracker>,
    redelivery: RedeliveryQueue,
    stopped: AtomicBool,
}

impl std::fmt::Debug for KafkaConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConsumer")
            .field("topic", &self.topic)
            .finish()
    }
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConsumerConfig) -> Result<Self, ChannelError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| ChannelError::Configuration(e.to_string()))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(transport_error)?;

        info!(
            topic = %config.topic,
            group = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            tracker: Mutex::new(OffsetTracker::new()),
            redelivery: RedeliveryQueue::new(config.redelivery_delay),
            stopped: AtomicBool::new(false),
        })
    }

    fn commit(&self, commits: &[(TopicPartition, i64)], mode: CommitMode) -> Result<(), ChannelError> {
        if commits.is_empty() {
            return Ok(());
        }
        let mut tpl = TopicPartitionList::new();
        for (tp, position) in commits {
            tpl.add_partition_offset(&tp.topic, tp.partition, Offset::Offset(*position))
                .map_err(transport_error)?;
        }
        self.consumer.commit(&tpl, mode).map_err(transport_error)
    }

    fn check_delivery(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        if self
            .tracker
            .lock()
            .is_in_flight(&delivery.topic, delivery.partition, delivery.offset)
        {
            Ok(())
        } else {
            Err(ChannelError::UnknownDelivery {
                topic: delivery.topic.clone(),
                partition: delivery.partition,
                offset: delivery.offset,
            })
        }
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, ChannelError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChannelError::AlreadyStopped);
        }
        if let Some(delivery) = self.redelivery.pop_due() {
            return Ok(Some(delivery));
        }

        let wait = match self.redelivery.next_due_in() {
            Some(due_in) => timeout.min(due_in),
            None => timeout,
        };

        match tokio::time::timeout(wait, self.consumer.recv()).await {
            Ok(Ok(message)) => {
                let delivery = Delivery {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    attempt: 1,
                };
                self.tracker
                    .lock()
                    .issued(&delivery.topic, delivery.partition, delivery.offset);
                Ok(Some(delivery))
            }
            Ok(Err(e)) => {
                warn!(topic = %self.topic, "Kafka receive error: {}", e);
                Err(transport_error(e))
            }
            Err(_) => Ok(self.redelivery.pop_due()),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.check_delivery(delivery)?;
        let position = self
            .tracker
            .lock()
            .completed(&delivery.topic, delivery.partition, delivery.offset);
        if let Some(position) = position {
            let tp = TopicPartition::new(delivery.topic.clone(), delivery.partition);
            self.commit(&[(tp, position)], CommitMode::Async)?;
        }
        Ok(())
    }

    async fn nack(&self, delivery: Delivery) -> Result<(), ChannelError> {
        self.check_delivery(&delivery)?;
        debug!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            attempt = delivery.attempt,
            "Scheduling redelivery"
        );
        self.redelivery.push(delivery);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let commits = self.tracker.lock().take_commits();
        let result = self.commit(&commits, CommitMode::Sync);
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "Kafka consumer unsubscribed");
        result
    }
}
