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

//! In-process message broker.
//!
//! Each topic is a single-partition append-only log. Consumer groups keep a
//! committed position per topic, and a consumer created for a group starts
//! from that position, so anything that was not acked before a consumer
//! stopped is delivered again to its successor. Publishing can be made to fail
//! on demand to exercise the retry paths of the coordinators.
//!
//! Only one live consumer per group and topic is supported.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::offsets::OffsetTracker;
use super::redelivery::RedeliveryQueue;
use super::{Consumer, Delivery, Producer};
use crate::error::ChannelError;

const PARTITION: i32 = 0;

#[derive(Debug, Default)]
struct BrokerState {
    logs: HashMap<String, Vec<Vec<u8>>>,
    committed: HashMap<(String, String), i64>,
    publish_failures: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `payload` to `topic` and returns its offset.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<i64, ChannelError> {
        let offset = {
            let mut state = self.state.lock();
            if state.publish_failures > 0 {
                state.publish_failures -= 1;
                return Err(ChannelError::Transport(format!(
                    "injected publish failure on topic '{}'",
                    topic
                )));
            }
            let log = state.logs.entry(topic.to_string()).or_default();
            log.push(payload);
            (log.len() - 1) as i64
        };
        self.notify.notify_waiters();
        Ok(offset)
    }

    /// Makes the next `count` publishes on any topic fail.
    pub fn fail_next_publishes(&self, count: usize) {
        self.state.lock().publish_failures = count;
    }

    /// Every payload ever published to `topic`, in offset order.
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Committed position of `group` on `topic`.
    pub fn committed(&self, group: &str, topic: &str) -> Option<i64> {
        self.state
            .lock()
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
    }

    pub fn producer(&self, topic: &str) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
            topic: topic.to_string(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Subscribes `group` to `topic`, resuming from the group's committed
    /// position.
    pub fn consumer(&self, topic: &str, group: &str, redelivery_delay: Duration) -> MemoryConsumer {
        let position = self.committed(group, topic).unwrap_or(0);
        debug!(topic, group, position, "Memory consumer subscribed");
        MemoryConsumer {
            broker: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position: Mutex::new(position),
            tracker: Mutex::new(OffsetTracker::new()),
            redelivery: RedeliveryQueue::new(redelivery_delay),
            stopped: AtomicBool::new(false),
        }
    }

    fn read(&self, topic: &str, offset: i64) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let log = state.logs.get(topic)?;
        usize::try_from(offset)
            .ok()
            .and_then(|index| log.get(index))
            .cloned()
    }

    fn commit(&self, group: &str, topic: &str, position: i64) {
        let mut state = self.state.lock();
        let entry = state
            .committed
            .entry((group.to_string(), topic.to_string()))
            .or_insert(position);
        if position > *entry {
            *entry = position;
        }
    }
}

#[derive(Debug)]
pub struct MemoryProducer {
    broker: MemoryBroker,
    topic: String,
    stopped: AtomicBool,
}

#[async_trait]
impl Producer for MemoryProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, payload: Vec<u8>) -> Result<(), ChannelError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChannelError::AlreadyStopped);
        }
        let offset = self.broker.publish(&self.topic, payload)?;
        debug!(topic = %self.topic, offset, "Message delivered");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    topic: String,
    group: String,
    position: Mutex<i64>,
    tracker: Mutex<OffsetTracker>,
    redelivery: RedeliveryQueue,
    stopped: AtomicBool,
}

impl MemoryConsumer {
    fn next_from_log(&self) -> Option<Delivery> {
        let mut position = self.position.lock();
        let payload = self.broker.read(&self.topic, *position)?;
        let offset = *position;
        *position += 1;
        self.tracker.lock().issued(&self.topic, PARTITION, offset);

        Some(Delivery {
            topic: self.topic.clone(),
            partition: PARTITION,
            offset,
            payload,
            attempt: 1,
        })
    }

    fn check_delivery(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        let known = delivery.topic == self.topic
            && self
                .tracker
                .lock()
                .is_in_flight(&delivery.topic, delivery.partition, delivery.offset);
        if known {
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
impl Consumer for MemoryConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(ChannelError::AlreadyStopped);
            }
            if let Some(delivery) = self.redelivery.pop_due() {
                return Ok(Some(delivery));
            }

            // Register for wakeups before looking at the log so a publish in
            // between is not missed.
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.next_from_log() {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let mut wait = deadline - now;
            if let Some(due_in) = self.redelivery.next_due_in() {
                wait = wait.min(due_in);
            }
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.check_delivery(delivery)?;
        let position = self
            .tracker
            .lock()
            .completed(&delivery.topic, delivery.partition, delivery.offset);
        if let Some(position) = position {
            self.broker.commit(&self.group, &self.topic, position);
            debug!(topic = %self.topic, group = %self.group, position, "Committed position");
        }
        Ok(())
    }

    async fn nack(&self, delivery: Delivery) -> Result<(), ChannelError> {
        self.check_delivery(&delivery)?;
        debug!(
            topic = %self.topic,
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
        for (tp, position) in commits {
            self.broker.commit(&self.group, &tp.topic, position);
        }
        if !self.redelivery.is_empty() {
            warn!(
                topic = %self.topic,
                pending = self.redelivery.len(),
                "Consumer stopped with undelivered retries; they will be replayed"
            );
        }
        Ok(())
    }
}
