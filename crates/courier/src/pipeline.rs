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

//! Wiring of the full pipeline.
//!
//! [`Pipeline::start`] builds the intake and dispatch coordinators (plus the
//! outbox relay in outbox mode) over one store and one set of channels, and
//! [`Pipeline::stop`] shuts them down in dependency order: intake first so no
//! new work is produced, then the relay, then dispatch, then the producers.

use std::sync::Arc;

use tracing::{error, info};

use crate::channel::memory::MemoryBroker;
use crate::channel::{Consumer, Producer};
use crate::config::{CourierConfig, OutstandingDelivery};
use crate::dal::DAL;
use crate::database::Database;
use crate::dispatch::DispatchCoordinator;
use crate::error::{ChannelError, NotifierError};
use crate::intake::{IntakeCoordinator, Submitter};
use crate::notifier::NotifierRouter;
use crate::relay::OutboxRelay;

/// Transport endpoints used by the pipeline.
#[derive(Clone)]
pub struct PipelineChannels {
    pub received_producer: Arc<dyn Producer>,
    pub received_consumer: Arc<dyn Consumer>,
    pub outstanding_producer: Arc<dyn Producer>,
    pub outstanding_consumer: Arc<dyn Consumer>,
}

impl PipelineChannels {
    /// Channels on an in-process broker, using the topics and groups from
    /// `config`.
    pub fn memory(broker: &MemoryBroker, config: &CourierConfig) -> Self {
        Self {
            received_producer: Arc::new(broker.producer(config.received_topic())),
            received_consumer: Arc::new(broker.consumer(
                config.received_topic(),
                config.intake_group_id(),
                config.redelivery_delay(),
            )),
            outstanding_producer: Arc::new(broker.producer(config.outstanding_topic())),
            outstanding_consumer: Arc::new(broker.consumer(
                config.outstanding_topic(),
                config.dispatch_group_id(),
                config.redelivery_delay(),
            )),
        }
    }

    /// Channels on a Kafka cluster.
    #[cfg(feature = "kafka")]
    pub fn kafka(
        bootstrap_servers: &str,
        client_id: &str,
        auto_offset_reset: &str,
        config: &CourierConfig,
    ) -> Result<Self, ChannelError> {
        use crate::channel::kafka::{
            KafkaConsumer, KafkaConsumerConfig, KafkaProducer, KafkaProducerConfig,
        };
        use std::time::Duration;

        let producer = |topic: &str| {
            KafkaProducer::new(&KafkaProducerConfig {
                bootstrap_servers: bootstrap_servers.to_string(),
                client_id: client_id.to_string(),
                topic: topic.to_string(),
                delivery_timeout: Duration::from_secs(30),
            })
        };
        let consumer = |topic: &str, group: &str| {
            KafkaConsumer::new(&KafkaConsumerConfig {
                bootstrap_servers: bootstrap_servers.to_string(),
                group_id: group.to_string(),
                topic: topic.to_string(),
                auto_offset_reset: auto_offset_reset.to_string(),
                redelivery_delay: config.redelivery_delay(),
            })
        };

        Ok(Self {
            received_producer: Arc::new(producer(config.received_topic())?),
            received_consumer: Arc::new(consumer(
                config.received_topic(),
                config.intake_group_id(),
            )?),
            outstanding_producer: Arc::new(producer(config.outstanding_topic())?),
            outstanding_consumer: Arc::new(consumer(
                config.outstanding_topic(),
                config.dispatch_group_id(),
            )?),
        })
    }
}

pub struct Pipeline {
    dal: DAL,
    intake: IntakeCoordinator,
    dispatch: DispatchCoordinator,
    relay: Option<OutboxRelay>,
    producers: Vec<Arc<dyn Producer>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("intake", &self.intake)
            .field("dispatch", &self.dispatch)
            .field("relay", &self.relay)
            .finish()
    }
}

impl Pipeline {
    /// Starts every stage. Fails if `router` does not cover every destination.
    ///
    /// Must be called from within a Tokio runtime; the stages are spawned
    /// onto it and run until [`Pipeline::stop`].
    pub fn start(
        config: CourierConfig,
        database: Database,
        channels: PipelineChannels,
        router: NotifierRouter,
    ) -> Result<Self, NotifierError> {
        router.require_complete()?;

        let dal = DAL::new(database);
        let router = Arc::new(router);

        let dispatch = DispatchCoordinator::new(
            &config,
            dal.clone(),
            channels.outstanding_consumer.clone(),
            router,
        );
        let intake = IntakeCoordinator::new(
            &config,
            dal.clone(),
            channels.received_consumer.clone(),
            channels.received_producer.clone(),
            channels.outstanding_producer.clone(),
        );
        let relay = match config.outstanding_delivery() {
            OutstandingDelivery::Outbox => Some(OutboxRelay::new(
                &config,
                dal.clone(),
                channels.outstanding_producer.clone(),
            )),
            OutstandingDelivery::Direct => None,
        };

        dispatch.start();
        if let Some(relay) = &relay {
            relay.start();
        }
        intake.start();

        info!(
            mode = ?config.outstanding_delivery(),
            "Notification pipeline started"
        );

        Ok(Self {
            dal,
            intake,
            dispatch,
            relay,
            producers: vec![channels.received_producer, channels.outstanding_producer],
        })
    }

    pub fn intake(&self) -> &IntakeCoordinator {
        &self.intake
    }

    pub fn dispatch(&self) -> &DispatchCoordinator {
        &self.dispatch
    }

    pub fn relay(&self) -> Option<&OutboxRelay> {
        self.relay.as_ref()
    }

    pub fn submitter(&self) -> Submitter {
        self.intake.submitter()
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    /// Stops every stage. All stages are stopped even if one fails; the first
    /// failure is returned.
    pub async fn stop(self) -> Result<(), ChannelError> {
        let mut first_error = None;

        if let Err(e) = self.intake.stop().await {
            error!("Stopping intake failed: {}", e);
            first_error.get_or_insert(e);
        }
        if let Some(relay) = &self.relay {
            relay.stop().await;
        }
        if let Err(e) = self.dispatch.stop().await {
            error!("Stopping dispatch failed: {}", e);
            first_error.get_or_insert(e);
        }
        for producer in &self.producers {
            if let Err(e) = producer.stop().await {
                error!(topic = %producer.topic(), "Stopping producer failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        info!("Notification pipeline stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
