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

//! Intake stage.
//!
//! Consumes `received` events and records each notification exactly once.
//! For every delivery the handler opens a store transaction and inserts the
//! record unless its id already exists. Only a first insert produces an
//! outstanding pointer for the dispatch stage, either published directly
//! before the commit or written to the outbox inside the same transaction.
//! The delivery is acked only after the commit. A crash between publishing
//! and committing means the message is redelivered and re-published, and
//! dispatch absorbs the duplicate pointer.
//!
//! The coordinator also owns the gateway write path, [`Submitter::submit`],
//! which stamps and publishes client requests onto the `received` topic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{Consumer, Delivery, Producer};
use crate::config::{CourierConfig, OutstandingDelivery};
use crate::dal::{NotificationTransaction, DAL};
use crate::error::{ChannelError, HandlerError, SubmitError};
use crate::executor::{ConsumerRunner, MessageHandler};
use crate::models::events::{NotificationRequest, OutstandingEvent, ReceivedEvent};
use crate::models::notification::Destination;

/// Result of handling one `received` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// First sighting of the id; dispatch was handed a pointer.
    Inserted,
    /// The id was already stored; nothing else happened.
    Duplicate,
}

/// Publishes client requests as `received` events.
#[derive(Clone)]
pub struct Submitter {
    producer: Arc<dyn Producer>,
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("topic", &self.producer.topic())
            .finish()
    }
}

impl Submitter {
    pub fn new(producer: Arc<dyn Producer>) -> Self {
        Self { producer }
    }

    /// Validates `request`, stamps it and publishes it.
    ///
    /// A missing or empty id is replaced by a fresh v4 id. Returns the id the
    /// notification was recorded under.
    pub async fn submit(&self, request: NotificationRequest) -> Result<Uuid, SubmitError> {
        let destination: Destination = request.destination.parse()?;
        let id = match request.id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                Uuid::parse_str(raw).map_err(|_| SubmitError::InvalidId(raw.to_string()))?
            }
            _ => Uuid::new_v4(),
        };

        let event = ReceivedEvent {
            id,
            text: request.text,
            destination,
            received_at: Utc::now().trunc_subsecs(6),
        };
        let payload = serde_json::to_vec(&event)?;
        self.producer.send(payload).await?;

        debug!(%id, %destination, "Notification submitted");
        Ok(id)
    }
}

/// Per-delivery logic of the intake stage.
pub struct IntakeHandler {
    dal: DAL,
    outstanding: Arc<dyn Producer>,
    mode: OutstandingDelivery,
}

impl IntakeHandler {
    pub fn new(dal: DAL, outstanding: Arc<dyn Producer>, mode: OutstandingDelivery) -> Self {
        Self {
            dal,
            outstanding,
            mode,
        }
    }

    /// Records `event` and, on first insert, hands it to dispatch.
    pub async fn process_event(&self, event: ReceivedEvent) -> Result<IntakeOutcome, HandlerError> {
        let id = event.id;
        let tx = self.dal.begin().await?;

        let result = self.record(&tx, event).await;
        match result {
            Ok(outcome) => {
                tx.commit().await?;
                match outcome {
                    IntakeOutcome::Inserted => {
                        counter!("courier_intake_inserted_total").increment(1);
                        info!(%id, "Notification recorded");
                    }
                    IntakeOutcome::Duplicate => {
                        counter!("courier_intake_duplicates_total").increment(1);
                        debug!(%id, "Duplicate notification ignored");
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(%id, "Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn record(
        &self,
        tx: &NotificationTransaction,
        event: ReceivedEvent,
    ) -> Result<IntakeOutcome, HandlerError> {
        let id = event.id;
        let affected = self
            .dal
            .notifications()
            .insert_if_absent(tx, event.into_new_notification())
            .await?;
        if affected == 0 {
            return Ok(IntakeOutcome::Duplicate);
        }

        match self.mode {
            OutstandingDelivery::Direct => {
                let payload =
                    serde_json::to_vec(&OutstandingEvent { id }).map_err(HandlerError::Encode)?;
                self.outstanding.send(payload).await?;
            }
            OutstandingDelivery::Outbox => {
                self.dal.outbox().enqueue(tx, id).await?;
            }
        }
        Ok(IntakeOutcome::Inserted)
    }
}

#[async_trait]
impl MessageHandler for IntakeHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: ReceivedEvent =
            serde_json::from_slice(&delivery.payload).map_err(HandlerError::Decode)?;
        self.process_event(event).await.map(|_| ())
    }
}

/// Runs the intake stage: the `received` consumer plus the submit path.
#[derive(Debug)]
pub struct IntakeCoordinator {
    runner: ConsumerRunner,
    submitter: Submitter,
}

impl IntakeCoordinator {
    /// Builds the coordinator. Must be called from within a Tokio runtime.
    pub fn new(
        config: &CourierConfig,
        dal: DAL,
        consumer: Arc<dyn Consumer>,
        received: Arc<dyn Producer>,
        outstanding: Arc<dyn Producer>,
    ) -> Self {
        let handler = IntakeHandler::new(dal, outstanding, config.outstanding_delivery());
        Self::with_handler(
            handler,
            consumer,
            received,
            config.intake_concurrency(),
            config.poll_timeout(),
            config.drain_timeout(),
        )
    }

    fn with_handler(
        handler: IntakeHandler,
        consumer: Arc<dyn Consumer>,
        received: Arc<dyn Producer>,
        concurrency: usize,
        poll_timeout: Duration,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            runner: ConsumerRunner::new(
                "intake",
                consumer,
                Arc::new(handler),
                concurrency,
                poll_timeout,
                drain_timeout,
            ),
            submitter: Submitter::new(received),
        }
    }

    pub fn start(&self) {
        self.runner.start();
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Stops polling, drains in-flight handlers, commits and unsubscribes.
    pub async fn stop(&self) -> Result<(), ChannelError> {
        self.runner.stop().await
    }

    pub async fn submit(&self, request: NotificationRequest) -> Result<Uuid, SubmitError> {
        self.submitter.submit(request).await
    }

    /// Clonable handle to the submit path, for the gateway.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }
}
