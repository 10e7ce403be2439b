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

//! Dispatch stage.
//!
//! Consumes outstanding pointers. For each one the handler locks the stored
//! record for the duration of a transaction. A record that is still
//! `NotProcessed` is routed to its sender and marked `Processed` before the
//! commit. A record that is already processed is left alone, so redelivered
//! or duplicated pointers never cause a second send.
//!
//! A missing record or a failed send rolls the transaction back and the
//! pointer is redelivered. Failed sends are retried for as long as they keep
//! failing; there is no dead-letter path.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{Consumer, Delivery};
use crate::config::CourierConfig;
use crate::dal::{NotificationTransaction, DAL};
use crate::error::{ChannelError, HandlerError};
use crate::executor::{ConsumerRunner, MessageHandler};
use crate::models::events::OutstandingEvent;
use crate::models::notification::NotificationStatus;
use crate::notifier::NotifierRouter;

/// Result of handling one `outstanding` pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The notification was sent and marked processed.
    Sent,
    /// The record was already processed; nothing was sent.
    AlreadyProcessed,
}

/// Per-delivery logic of the dispatch stage.
pub struct DispatchHandler {
    dal: DAL,
    router: Arc<NotifierRouter>,
}

impl DispatchHandler {
    pub fn new(dal: DAL, router: Arc<NotifierRouter>) -> Self {
        Self { dal, router }
    }

    /// Sends the notification `event` points at unless it was already
    /// processed. The record stays locked until the commit or rollback, so
    /// concurrent pointers for one id are handled one after another.
    pub async fn process_event(
        &self,
        event: OutstandingEvent,
    ) -> Result<DispatchOutcome, HandlerError> {
        let id = event.id;
        let tx = self.dal.begin().await?;

        let result = self.dispatch(&tx, id).await;
        match result {
            Ok(outcome) => {
                tx.commit().await?;
                match outcome {
                    DispatchOutcome::Sent => {
                        counter!("courier_dispatch_sent_total").increment(1);
                        info!(%id, "Notification dispatched");
                    }
                    DispatchOutcome::AlreadyProcessed => {
                        counter!("courier_dispatch_duplicates_total").increment(1);
                        debug!(%id, "Notification already processed");
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, HandlerError::Notifier(_)) {
                    counter!("courier_dispatch_failures_total").increment(1);
                }
                if let Err(rollback) = tx.rollback().await {
                    warn!(%id, "Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        tx: &NotificationTransaction,
        id: Uuid,
    ) -> Result<DispatchOutcome, HandlerError> {
        let notifications = self.dal.notifications();
        let record = notifications.lock_for_update(tx, id).await?;

        if record.status == NotificationStatus::Processed {
            return Ok(DispatchOutcome::AlreadyProcessed);
        }

        self.router
            .route(record.id, record.destination, &record.text)
            .await?;
        notifications
            .update_status(tx, id, NotificationStatus::Processed)
            .await?;
        Ok(DispatchOutcome::Sent)
    }
}

#[async_trait]
impl MessageHandler for DispatchHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: OutstandingEvent =
            serde_json::from_slice(&delivery.payload).map_err(HandlerError::Decode)?;
        self.process_event(event).await.map(|_| ())
    }
}

/// Runs the dispatch stage on the `outstanding` consumer.
#[derive(Debug)]
pub struct DispatchCoordinator {
    runner: ConsumerRunner,
}

impl DispatchCoordinator {
    /// Builds the coordinator. Must be called from within a Tokio runtime.
    pub fn new(
        config: &CourierConfig,
        dal: DAL,
        consumer: Arc<dyn Consumer>,
        router: Arc<NotifierRouter>,
    ) -> Self {
        Self {
            runner: ConsumerRunner::new(
                "dispatch",
                consumer,
                Arc::new(DispatchHandler::new(dal, router)),
                config.dispatch_concurrency(),
                config.poll_timeout(),
                config.drain_timeout(),
            ),
        }
    }

    pub fn start(&self) {
        self.runner.start();
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    pub async fn stop(&self) -> Result<(), ChannelError> {
        self.runner.stop().await
    }
}
