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

//! Load generator for the HTTP gateway.
//!
//! Posts a batch of notifications with a bounded number of requests in
//! flight and reports how many were accepted and how long the batch took.

use std::sync::Arc;
use std::time::Duration;

use courier::NotificationRequest;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("At least one target URL is required")]
    NoTargets,

    #[error("Request limiter closed unexpectedly")]
    LimiterClosed,
}

/// What to send and where.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    /// Gateway endpoints; requests are spread over them round-robin.
    pub targets: Vec<String>,
    pub count: usize,
    pub concurrency: usize,
    pub destination: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// 2xx responses.
    pub accepted: usize,
    /// Non-2xx responses.
    pub rejected: usize,
    /// Requests that got no response.
    pub failed: usize,
    pub elapsed: Duration,
}

/// One request per notification, each with a fresh id and body `txt-<n>`.
pub fn build_requests(count: usize, destination: &str) -> Vec<NotificationRequest> {
    (0..count)
        .map(|i| NotificationRequest {
            id: Some(Uuid::new_v4().to_string()),
            text: format!("txt-{}", i),
            destination: destination.to_string(),
        })
        .collect()
}

/// Sends every request of `plan`, at most `plan.concurrency` at a time.
///
/// Requests are built before the clock starts, so the elapsed time covers
/// only the HTTP round trips.
pub async fn run_load(
    client: &reqwest::Client,
    plan: &LoadPlan,
) -> Result<LoadReport, LoadError> {
    if plan.targets.is_empty() {
        return Err(LoadError::NoTargets);
    }

    let requests = build_requests(plan.count, &plan.destination);
    let limiter = Arc::new(Semaphore::new(plan.concurrency.max(1)));
    let mut in_flight = JoinSet::new();
    let started = Instant::now();

    for (i, request) in requests.into_iter().enumerate() {
        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LoadError::LimiterClosed)?;
        let client = client.clone();
        let url = plan.targets[i % plan.targets.len()].clone();

        in_flight.spawn(async move {
            let _permit = permit;
            client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map(|response| response.status())
        });
    }

    let mut report = LoadReport::default();
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(Ok(status)) if status.is_success() => report.accepted += 1,
            Ok(Ok(status)) => {
                debug!(%status, "Notification rejected");
                report.rejected += 1;
            }
            Ok(Err(e)) => {
                warn!("Request failed: {}", e);
                report.failed += 1;
            }
            Err(e) => {
                error!("Request task ended abnormally: {}", e);
                report.failed += 1;
            }
        }
    }
    report.elapsed = started.elapsed();

    Ok(report)
}
