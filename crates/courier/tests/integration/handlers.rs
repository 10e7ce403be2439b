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

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use courier::channel::memory::MemoryBroker;
use courier::config::OutstandingDelivery;
use courier::dispatch::{DispatchHandler, DispatchOutcome};
use courier::intake::{IntakeHandler, IntakeOutcome};
use courier::{Destination, NotificationStatus, OutstandingEvent, ReceivedEvent};
use serial_test::serial;
use uuid::Uuid;

use crate::fixtures::{fresh_fixture, recording_router};

fn received(id: Uuid, text: &str) -> ReceivedEvent {
    ReceivedEvent {
        id,
        text: text.to_string(),
        destination: Destination::Sms,
        received_at: Utc::now().trunc_subsecs(6),
    }
}

#[tokio::test]
#[serial]
async fn test_intake_reports_insert_then_duplicate() {
    let fixture = fresh_fixture().await;
    let broker = MemoryBroker::new();
    let handler = IntakeHandler::new(
        fixture.get_dal(),
        Arc::new(broker.producer("outstanding")),
        OutstandingDelivery::Direct,
    );
    let id = Uuid::new_v4();

    let first = handler.process_event(received(id, "once")).await.unwrap();
    let second = handler.process_event(received(id, "once")).await.unwrap();

    assert_eq!(first, IntakeOutcome::Inserted);
    assert_eq!(second, IntakeOutcome::Duplicate);
    assert_eq!(broker.messages("outstanding").len(), 1);
}

#[tokio::test]
#[serial]
async fn test_dispatch_reports_sent_then_already_processed() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let broker = MemoryBroker::new();
    let id = Uuid::new_v4();
    IntakeHandler::new(
        dal.clone(),
        Arc::new(broker.producer("outstanding")),
        OutstandingDelivery::Direct,
    )
    .process_event(received(id, "ping"))
    .await
    .unwrap();

    let (router, recorders) = recording_router();
    let handler = DispatchHandler::new(dal.clone(), Arc::new(router));

    let first = handler.process_event(OutstandingEvent { id }).await.unwrap();
    let second = handler.process_event(OutstandingEvent { id }).await.unwrap();

    assert_eq!(first, DispatchOutcome::Sent);
    assert_eq!(second, DispatchOutcome::AlreadyProcessed);
    assert_eq!(recorders.sms.sent(), vec!["ping".to_string()]);
    let record = dal.notifications().get_by_id(id).await.unwrap();
    assert_eq!(record.status, NotificationStatus::Processed);
}

#[tokio::test]
#[serial]
async fn test_simultaneous_dispatch_of_one_record_sends_once() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let broker = MemoryBroker::new();
    let id = Uuid::new_v4();
    IntakeHandler::new(
        dal.clone(),
        Arc::new(broker.producer("outstanding")),
        OutstandingDelivery::Direct,
    )
    .process_event(received(id, "contended"))
    .await
    .unwrap();

    let (router, recorders) = recording_router();
    let handler = DispatchHandler::new(dal, Arc::new(router));

    let (a, b) = tokio::join!(
        handler.process_event(OutstandingEvent { id }),
        handler.process_event(OutstandingEvent { id }),
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == DispatchOutcome::AlreadyProcessed);

    assert_eq!(
        outcomes,
        vec![DispatchOutcome::Sent, DispatchOutcome::AlreadyProcessed]
    );
    assert_eq!(recorders.sms.attempts(), 1);
}
