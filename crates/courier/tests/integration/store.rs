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

use std::time::Duration;

use chrono::{SubsecRound, Utc};
use courier::models::notification::NewNotification;
use courier::{Destination, NotificationStatus, StoreError};
use serial_test::serial;
use uuid::Uuid;

use crate::fixtures::fresh_fixture;

fn new_notification(text: &str, destination: Destination) -> NewNotification {
    NewNotification {
        id: Uuid::new_v4(),
        text: text.to_string(),
        destination,
        received_at: Utc::now().trunc_subsecs(6),
    }
}

#[tokio::test]
#[serial]
async fn test_insert_if_absent_is_idempotent() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let new = new_notification("hello", Destination::Email);
    let id = new.id;

    let tx = dal.begin().await.unwrap();
    let first = dal.notifications().insert_if_absent(&tx, new.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let tx = dal.begin().await.unwrap();
    let second = dal
        .notifications()
        .insert_if_absent(&tx, NewNotification {
            text: "a different body".to_string(),
            ..new
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    assert_eq!(dal.notifications().count().await.unwrap(), 1);

    let record = dal.notifications().get_by_id(id).await.unwrap();
    assert_eq!(record.text, "hello");
    assert_eq!(record.destination, Destination::Email);
    assert_eq!(record.status, NotificationStatus::NotProcessed);
}

#[tokio::test]
#[serial]
async fn test_uncommitted_insert_is_discarded() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let new = new_notification("rolled back", Destination::Sms);
    let id = new.id;

    let tx = dal.begin().await.unwrap();
    dal.notifications().insert_if_absent(&tx, new.clone()).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(matches!(
        dal.notifications().get_by_id(id).await,
        Err(StoreError::NotFound(missing)) if missing == id
    ));

    // Dropping an open transaction must not leave the row behind either.
    let tx = dal.begin().await.unwrap();
    dal.notifications().insert_if_absent(&tx, new).await.unwrap();
    drop(tx);

    assert!(matches!(
        dal.notifications().get_by_id(id).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(dal.notifications().count().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_lock_for_update_missing_row() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let id = Uuid::new_v4();

    let tx = dal.begin().await.unwrap();
    let result = dal.notifications().lock_for_update(&tx, id).await;
    tx.rollback().await.unwrap();

    assert!(matches!(result, Err(StoreError::NotFound(missing)) if missing == id));
}

#[tokio::test]
#[serial]
async fn test_status_never_moves_backwards() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let new = new_notification("status", Destination::Slack);
    let id = new.id;

    let tx = dal.begin().await.unwrap();
    dal.notifications().insert_if_absent(&tx, new).await.unwrap();
    tx.commit().await.unwrap();

    let tx = dal.begin().await.unwrap();
    let forward = dal
        .notifications()
        .update_status(&tx, id, NotificationStatus::Processed)
        .await
        .unwrap();
    let backward = dal
        .notifications()
        .update_status(&tx, id, NotificationStatus::NotProcessed)
        .await
        .unwrap();
    let reapplied = dal
        .notifications()
        .update_status(&tx, id, NotificationStatus::Processed)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(forward, 1);
    assert_eq!(backward, 0);
    assert_eq!(reapplied, 1);

    let record = dal.notifications().get_by_id(id).await.unwrap();
    assert_eq!(record.status, NotificationStatus::Processed);
    assert!(record.last_updated_at >= record.received_at);
}

#[tokio::test]
#[serial]
async fn test_lock_for_update_blocks_second_transaction() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let new = new_notification("locked", Destination::Email);
    let id = new.id;

    let tx = dal.begin().await.unwrap();
    dal.notifications().insert_if_absent(&tx, new).await.unwrap();
    tx.commit().await.unwrap();

    let holder = dal.begin().await.unwrap();
    let locked = dal.notifications().lock_for_update(&holder, id).await.unwrap();
    assert_eq!(locked.status, NotificationStatus::NotProcessed);

    let contender_dal = dal.clone();
    let contender = tokio::spawn(async move {
        let tx = contender_dal.begin().await?;
        let record = contender_dal.notifications().lock_for_update(&tx, id).await?;
        tx.commit().await?;
        Ok::<_, StoreError>(record)
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        !contender.is_finished(),
        "second transaction acquired the lock while the first still held it"
    );

    dal.notifications()
        .update_status(&holder, id, NotificationStatus::Processed)
        .await
        .unwrap();
    holder.commit().await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(10), contender)
        .await
        .expect("contender never acquired the lock")
        .unwrap()
        .unwrap();
    assert_eq!(seen.status, NotificationStatus::Processed);
}

#[tokio::test]
#[serial]
async fn test_outbox_enqueue_list_delete() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let first = new_notification("one", Destination::Sms);
    let second = new_notification("two", Destination::Email);
    let (first_id, second_id) = (first.id, second.id);

    for new in [first, second] {
        let tx = dal.begin().await.unwrap();
        let id = new.id;
        dal.notifications().insert_if_absent(&tx, new).await.unwrap();
        dal.outbox().enqueue(&tx, id).await.unwrap();
        tx.commit().await.unwrap();
    }

    assert_eq!(dal.outbox().count_pending().await.unwrap(), 2);

    let pending = dal.outbox().list_pending(10).await.unwrap();
    let ids: Vec<Uuid> = pending.iter().map(|e| e.notification_id).collect();
    assert_eq!(ids, vec![first_id, second_id]);

    let limited = dal.outbox().list_pending(1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].notification_id, first_id);

    let deleted = dal.outbox().delete(vec![pending[0].id]).await.unwrap();
    assert_eq!(deleted, 1);

    let remaining = dal.outbox().list_pending(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].notification_id, second_id);

    assert_eq!(dal.outbox().delete(Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_rolled_back_outbox_entry_is_discarded() {
    let fixture = fresh_fixture().await;
    let dal = fixture.get_dal();
    let new = new_notification("never enqueued", Destination::Slack);
    let id = new.id;

    let tx = dal.begin().await.unwrap();
    dal.notifications().insert_if_absent(&tx, new).await.unwrap();
    dal.outbox().enqueue(&tx, id).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(dal.outbox().count_pending().await.unwrap(), 0);
    assert_eq!(dal.notifications().count().await.unwrap(), 0);
}
