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

use chrono::{SubsecRound, Utc};
use courier::channel::memory::MemoryBroker;
use courier::config::OutstandingDelivery;
use courier::models::notification::NewNotification;
use courier::{
    Destination, NotificationRequest, NotificationStatus, OutstandingEvent, ReceivedEvent,
};
use serial_test::serial;
use uuid::Uuid;

use crate::fixtures::{fresh_fixture, start_pipeline, start_pipeline_on, wait_for_status, wait_until};

const FIXED_ID: &str = "11111111-1111-1111-1111-111111111111";

fn request(id: Option<&str>, text: &str, destination: &str) -> NotificationRequest {
    NotificationRequest {
        id: id.map(str::to_string),
        text: text.to_string(),
        destination: destination.to_string(),
    }
}

#[tokio::test]
#[serial]
async fn test_submitted_notification_is_sent_once() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Direct);

    let id = running
        .pipeline
        .intake()
        .submit(request(Some(FIXED_ID), "hello", "EMAIL"))
        .await
        .unwrap();
    assert_eq!(id, Uuid::parse_str(FIXED_ID).unwrap());

    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;

    let record = running.pipeline.dal().notifications().get_by_id(id).await.unwrap();
    assert_eq!(record.text, "hello");
    assert_eq!(record.destination, Destination::Email);

    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(recorders.email.sent(), vec!["hello".to_string()]);
    assert!(recorders.sms.sent().is_empty());
    assert!(recorders.slack.sent().is_empty());
}

#[tokio::test]
#[serial]
async fn test_duplicate_submission_is_sent_once() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Direct);
    let intake_group = running.config.intake_group_id().to_string();
    let received_topic = running.config.received_topic().to_string();
    let outstanding_topic = running.config.outstanding_topic().to_string();

    for _ in 0..2 {
        running
            .pipeline
            .intake()
            .submit(request(Some(FIXED_ID), "twice", "sms"))
            .await
            .unwrap();
    }

    let id = Uuid::parse_str(FIXED_ID).unwrap();
    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;
    let broker = running.broker.clone();
    wait_until("both received events handled", || {
        broker.committed(&intake_group, &received_topic) == Some(2)
    })
    .await;

    let dal = running.pipeline.dal().clone();
    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(dal.notifications().count().await.unwrap(), 1);
    assert_eq!(broker.messages(&outstanding_topic).len(), 1);
    assert_eq!(recorders.sms.sent(), vec!["twice".to_string()]);
    assert_eq!(recorders.total_sent(), 1);
}

#[tokio::test]
#[serial]
async fn test_redelivered_outstanding_event_sends_nothing() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Direct);
    let dispatch_group = running.config.dispatch_group_id().to_string();
    let outstanding_topic = running.config.outstanding_topic().to_string();

    let id = running
        .pipeline
        .intake()
        .submit(request(None, "only once", "slack"))
        .await
        .unwrap();
    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;

    let replay = serde_json::to_vec(&OutstandingEvent { id }).unwrap();
    running.broker.publish(&outstanding_topic, replay).unwrap();

    let broker = running.broker.clone();
    wait_until("replayed outstanding event handled", || {
        broker.committed(&dispatch_group, &outstanding_topic) == Some(2)
    })
    .await;

    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(recorders.slack.sent(), vec!["only once".to_string()]);
    assert_eq!(recorders.slack.attempts(), 1);
}

#[tokio::test]
#[serial]
async fn test_concurrent_pointers_for_unprocessed_record_send_once() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let broker = MemoryBroker::new();
    let copies = 4;

    let id = Uuid::new_v4();
    let tx = dal.begin().await.unwrap();
    dal.notifications()
        .insert_if_absent(
            &tx,
            NewNotification {
                id,
                text: "raced".to_string(),
                destination: Destination::Email,
                received_at: Utc::now().trunc_subsecs(6),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let pointer = serde_json::to_vec(&OutstandingEvent { id }).unwrap();
    for _ in 0..copies {
        broker.publish("outstanding", pointer.clone()).unwrap();
    }

    let running = start_pipeline_on(&fixture, broker, OutstandingDelivery::Direct);
    assert!(running.config.dispatch_concurrency() > 1);
    let dispatch_group = running.config.dispatch_group_id().to_string();

    let broker = running.broker.clone();
    wait_until("every copy of the pointer handled", || {
        broker.committed(&dispatch_group, "outstanding") == Some(copies)
    })
    .await;

    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(recorders.email.sent(), vec!["raced".to_string()]);
    assert_eq!(recorders.email.attempts(), 1);
    assert_eq!(recorders.total_sent(), 1);
    let record = dal.notifications().get_by_id(id).await.unwrap();
    assert_eq!(record.status, NotificationStatus::Processed);
}

#[tokio::test]
#[serial]
async fn test_failed_send_is_retried_until_it_succeeds() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Direct);
    running.recorders.email.fail_next(2);

    let id = running
        .pipeline
        .intake()
        .submit(request(None, "eventually", "Email"))
        .await
        .unwrap();
    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;

    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(recorders.email.attempts(), 3);
    assert_eq!(recorders.email.sent(), vec!["eventually".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_failed_outstanding_publish_is_retried() {
    let fixture = fresh_fixture().await;
    let broker = MemoryBroker::new();

    let event = ReceivedEvent {
        id: Uuid::new_v4(),
        text: "after a hiccup".to_string(),
        destination: Destination::Sms,
        received_at: Utc::now().trunc_subsecs(6),
    };
    let id = event.id;
    broker
        .publish("received", serde_json::to_vec(&event).unwrap())
        .unwrap();
    broker.fail_next_publishes(1);

    let running = start_pipeline_on(&fixture, broker, OutstandingDelivery::Direct);
    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;

    let dal = running.pipeline.dal().clone();
    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(dal.notifications().count().await.unwrap(), 1);
    assert_eq!(recorders.sms.sent(), vec!["after a hiccup".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_outbox_mode_relays_and_clears_entries() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Outbox);
    assert!(running.pipeline.relay().is_some());
    let outstanding_topic = running.config.outstanding_topic().to_string();

    let id = running
        .pipeline
        .intake()
        .submit(request(Some(FIXED_ID), "via outbox", "EMAIL"))
        .await
        .unwrap();
    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;

    let dal = running.pipeline.dal().clone();
    let mut drained = false;
    for _ in 0..500 {
        if dal.outbox().count_pending().await.unwrap() == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(drained, "outbox entry was never deleted");

    let broker = running.broker.clone();
    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    let published = broker.messages(&outstanding_topic);
    assert_eq!(published.len(), 1);
    let event: OutstandingEvent = serde_json::from_slice(&published[0]).unwrap();
    assert_eq!(event.id, id);
    assert_eq!(recorders.email.sent(), vec!["via outbox".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_undecodable_event_is_dropped() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Direct);
    let intake_group = running.config.intake_group_id().to_string();
    let received_topic = running.config.received_topic().to_string();

    running
        .broker
        .publish(&received_topic, b"not json at all".to_vec())
        .unwrap();
    let id = running
        .pipeline
        .intake()
        .submit(request(None, "still flowing", "sms"))
        .await
        .unwrap();

    wait_for_status(running.pipeline.dal(), id, NotificationStatus::Processed).await;
    let broker = running.broker.clone();
    wait_until("garbage and valid event committed", || {
        broker.committed(&intake_group, &received_topic) == Some(2)
    })
    .await;

    let dal = running.pipeline.dal().clone();
    let recorders = running.recorders;
    running.pipeline.stop().await.unwrap();

    assert_eq!(dal.notifications().count().await.unwrap(), 1);
    assert_eq!(recorders.total_sent(), 1);
}

#[tokio::test]
#[serial]
async fn test_rejected_submission_publishes_nothing() {
    let fixture = fresh_fixture().await;
    let running = start_pipeline(&fixture, OutstandingDelivery::Direct);
    let received_topic = running.config.received_topic().to_string();

    let bad_destination = running
        .pipeline
        .intake()
        .submit(request(None, "nowhere", "PIGEON"))
        .await;
    let bad_id = running
        .pipeline
        .intake()
        .submit(request(Some("not-a-uuid"), "nobody", "sms"))
        .await;

    assert!(bad_destination.unwrap_err().is_client_error());
    assert!(bad_id.unwrap_err().is_client_error());
    assert!(running.broker.messages(&received_topic).is_empty());

    running.pipeline.stop().await.unwrap();
}
