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

//! Fixed-size worker pool.
//!
//! `N` worker tasks pull jobs from a shared queue. Admission is gated by a
//! semaphore with `N` permits: a caller must hold a [`SlotToken`] to enqueue,
//! so at most `N` jobs are queued or running and a poll loop that reserves a
//! slot before polling stops pulling messages while the pool is saturated.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::SlotToken;
use crate::error::ExecutorError;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct WorkerPool {
    name: String,
    size: usize,
    semaphore: Arc<Semaphore>,
    sender: Mutex<Option<mpsc::UnboundedSender<(Job, SlotToken)>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("available_slots", &self.available_slots())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `size` workers on the current runtime. A size of zero is raised
    /// to one.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<(Job, SlotToken)>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..size)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let pool_name = name.clone();
                tokio::spawn(async move {
                    loop {
                        let next = { receiver.lock().await.recv().await };
                        let Some((job, slot)) = next else {
                            break;
                        };
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            error!(pool = %pool_name, worker_id, "Job panicked");
                        }
                        drop(slot);
                    }
                    debug!(pool = %pool_name, worker_id, "Worker exiting");
                })
            })
            .collect();

        info!(pool = %name, size, "Worker pool started");

        Self {
            name,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently reserved by a queued or running job.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot.
    pub async fn reserve(&self) -> Result<SlotToken, ExecutorError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecutorError::PoolClosed)?;
        Ok(SlotToken::new(permit))
    }

    /// Enqueues `job` on a slot obtained from [`WorkerPool::reserve`].
    pub fn spawn<F>(&self, slot: SlotToken, job: F) -> Result<(), ExecutorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().clone().ok_or(ExecutorError::PoolClosed)?;
        sender
            .send((Box::pin(job), slot))
            .map_err(|_| ExecutorError::PoolClosed)
    }

    /// Reserves a slot, waiting if all are busy, then enqueues `job`.
    pub async fn submit<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = self.reserve().await?;
        self.spawn(slot, job)
    }

    /// Stops accepting jobs and waits up to `timeout` for queued and running
    /// jobs to finish. Workers still running at the deadline are aborted.
    pub async fn drain(&self, timeout: Duration) -> Result<(), ExecutorError> {
        self.semaphore.close();
        drop(self.sender.lock().take());

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();

        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(_) => {
                info!(pool = %self.name, "Worker pool drained");
                Ok(())
            }
            Err(_) => {
                let remaining = aborts.iter().filter(|a| !a.is_finished()).count();
                warn!(pool = %self.name, remaining, "Worker pool drain timed out; aborting");
                for abort in aborts {
                    abort.abort();
                }
                Err(ExecutorError::DrainTimeout(remaining))
            }
        }
    }
}
