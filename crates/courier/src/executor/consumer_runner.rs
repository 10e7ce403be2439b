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

//! Poll loop shared by the intake and dispatch stages.
//!
//! A `ConsumerRunner` owns one consumer and one worker pool. Its poll loop is
//! the only caller of `Consumer::poll`: it reserves a worker slot, polls, and
//! hands the delivery to a worker which runs the stage's [`MessageHandler`]
//! and then acks or nacks.
//!
//! * `Ok(())` acks.
//! * A non-retryable error (a payload that cannot be decoded) is logged and
//!   acked so it does not block the partition.
//! * Any other error nacks and the message is delivered again.
//!
//! Shutdown cancels the loop, drains the pool, then stops the consumer so the
//! final commit covers every handler that finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::WorkerPool;
use crate::channel::{Consumer, Delivery};
use crate::error::{ChannelError, HandlerError};

/// Stage-specific processing of one delivery.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

pub struct ConsumerRunner {
    stage: &'static str,
    consumer: Arc<dyn Consumer>,
    handler: Arc<dyn MessageHandler>,
    pool: Arc<WorkerPool>,
    poll_timeout: Duration,
    drain_timeout: Duration,
    shutdown: CancellationToken,
    started: AtomicBool,
    poll_loop: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConsumerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRunner")
            .field("stage", &self.stage)
            .field("topic", &self.consumer.topic())
            .field("pool", &self.pool)
            .finish()
    }
}

impl ConsumerRunner {
    /// Must be called from within a Tokio runtime; the worker pool is spawned
    /// immediately.
    pub fn new(
        stage: &'static str,
        consumer: Arc<dyn Consumer>,
        handler: Arc<dyn MessageHandler>,
        concurrency: usize,
        poll_timeout: Duration,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            stage,
            consumer,
            handler,
            pool: Arc::new(WorkerPool::new(stage, concurrency)),
            poll_timeout,
            drain_timeout,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            poll_loop: Mutex::new(None),
        }
    }

    /// Starts the poll loop. Calling it again has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let poll_loop = PollLoop {
            stage: self.stage,
            consumer: self.consumer.clone(),
            handler: self.handler.clone(),
            pool: self.pool.clone(),
            poll_timeout: self.poll_timeout,
            shutdown: self.shutdown.clone(),
        };
        *self.poll_loop.lock() = Some(tokio::spawn(poll_loop.run()));
        info!(stage = self.stage, topic = %self.consumer.topic(), "Consumer started");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    pub fn available_slots(&self) -> usize {
        self.pool.available_slots()
    }

    /// Stops polling, waits for in-flight handlers, commits and unsubscribes.
    pub async fn stop(&self) -> Result<(), ChannelError> {
        self.shutdown.cancel();

        let handle = self.poll_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(stage = self.stage, "Poll loop ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.pool.drain(self.drain_timeout).await {
            warn!(stage = self.stage, "{}", e);
        }

        let result = self.consumer.stop().await;
        info!(stage = self.stage, "Consumer stopped");
        result
    }
}

struct PollLoop {
    stage: &'static str,
    consumer: Arc<dyn Consumer>,
    handler: Arc<dyn MessageHandler>,
    pool: Arc<WorkerPool>,
    poll_timeout: Duration,
    shutdown: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        loop {
            let slot = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                slot = self.pool.reserve() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                polled = self.consumer.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(delivery)) => {
                    let consumer = self.consumer.clone();
                    let handler = self.handler.clone();
                    let stage = self.stage;
                    let job = async move {
                        process(stage, consumer.as_ref(), handler.as_ref(), delivery).await;
                    };
                    if let Err(e) = self.pool.spawn(slot, job) {
                        error!(stage = self.stage, "Could not schedule handler: {}", e);
                        break;
                    }
                }
                Ok(None) => {}
                Err(ChannelError::AlreadyStopped) => break,
                Err(e) => {
                    warn!(stage = self.stage, "Poll failed: {}", e);
                    drop(slot);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_timeout) => {}
                    }
                }
            }
        }
        debug!(stage = self.stage, "Poll loop exited");
    }
}

async fn process(
    stage: &'static str,
    consumer: &dyn Consumer,
    handler: &dyn MessageHandler,
    delivery: Delivery,
) {
    match handler.handle(&delivery).await {
        Ok(()) => {
            if let Err(e) = consumer.ack(&delivery).await {
                error!(stage, offset = delivery.offset, "Ack failed: {}", e);
            }
        }
        Err(e) if !e.is_retryable() => {
            counter!("courier_decode_failures_total", "stage" => stage).increment(1);
            error!(
                stage,
                offset = delivery.offset,
                "Dropping message that can never be processed: {}",
                e
            );
            if let Err(e) = consumer.ack(&delivery).await {
                error!(stage, offset = delivery.offset, "Ack failed: {}", e);
            }
        }
        Err(e) => {
            warn!(
                stage,
                offset = delivery.offset,
                attempt = delivery.attempt,
                "Handler failed, message will be redelivered: {}",
                e
            );
            let offset = delivery.offset;
            if let Err(e) = consumer.nack(delivery).await {
                error!(stage, offset, "Nack failed: {}", e);
            }
        }
    }
}
