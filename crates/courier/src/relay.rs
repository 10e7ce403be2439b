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

//! Outbox relay.
//!
//! In outbox mode the intake stage writes an outbox row instead of
//! publishing. The relay periodically reads the oldest rows, publishes an
//! outstanding event for each, and deletes the rows it published. A publish
//! failure ends the pass; the remaining rows are picked up on the next one.
//! A crash between publishing and deleting re-publishes those rows, which the
//! dispatch stage treats as duplicates.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::Producer;
use crate::config::CourierConfig;
use crate::dal::DAL;
use crate::error::HandlerError;
use crate::models::events::OutstandingEvent;

struct RelayWorker {
    dal: DAL,
    producer: Arc<dyn Producer>,
    batch_size: i64,
}

impl RelayWorker {
    async fn relay_once(&self) -> Result<usize, HandlerError> {
        let entries = self.dal.outbox().list_pending(self.batch_size).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut published = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload = serde_json::to_vec(&OutstandingEvent {
                id: entry.notification_id,
            })
            .map_err(HandlerError::Encode)?;
            match self.producer.send(payload).await {
                Ok(()) => published.push(entry.id),
                Err(e) => {
                    warn!(
                        notification_id = %entry.notification_id,
                        "Outbox publish failed, will retry next pass: {}",
                        e
                    );
                    break;
                }
            }
        }

        let count = published.len();
        self.dal.outbox().delete(published).await?;
        if count > 0 {
            counter!("courier_relay_published_total").increment(count as u64);
            debug!(count, "Outbox entries relayed");
        }
        Ok(count)
    }
}

pub struct OutboxRelay {
    worker: Arc<RelayWorker>,
    interval: Duration,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for OutboxRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxRelay")
            .field("topic", &self.worker.producer.topic())
            .field("interval", &self.interval)
            .field("batch_size", &self.worker.batch_size)
            .finish()
    }
}

impl OutboxRelay {
    pub fn new(config: &CourierConfig, dal: DAL, producer: Arc<dyn Producer>) -> Self {
        Self {
            worker: Arc::new(RelayWorker {
                dal,
                producer,
                batch_size: config.relay_batch_size(),
            }),
            interval: config.relay_poll_interval(),
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Runs a single pass. Returns how many entries were published.
    pub async fn relay_once(&self) -> Result<usize, HandlerError> {
        self.worker.relay_once().await
    }

    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.shutdown.is_cancelled() {
            return;
        }

        let worker = self.worker.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.interval;
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = worker.relay_once().await {
                    error!("Outbox relay pass failed: {}", e);
                }
            }
            debug!("Outbox relay loop exited");
        }));
        info!(interval_ms = interval.as_millis() as u64, "Outbox relay started");
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Outbox relay ended abnormally: {}", e);
            }
        }
        info!("Outbox relay stopped");
    }
}
