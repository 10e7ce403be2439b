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

//! Bounded exponential backoff for startup dependencies.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry schedule: `initial`, doubling up to `max_interval`, for at most
/// `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_interval: Duration,
    pub max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}

impl Backoff {
    /// Runs `operation` until it succeeds or the retries are spent. The last
    /// error is returned.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut delay = self.initial;
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        retry = retries,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed: {}",
                        what,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2).min(self.max_interval);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn schedule(max_retries: u32) -> Backoff {
        Backoff {
            initial: Duration::from_millis(100),
            max_interval: Duration::from_millis(250),
            max_retries,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let started = Instant::now();

        let result: Result<&str, String> = schedule(5)
            .retry("connect", move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err("database is starting up".to_string())
                } else {
                    Ok("connected")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // 100 + 200 + 250 (capped)
        assert!(started.elapsed() >= Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), String> = schedule(2)
            .retry("connect", move || async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Err(format!("refused #{}", n))
            })
            .await;

        assert_eq!(result.unwrap_err(), "refused #2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_success_does_not_wait() {
        let result: Result<u8, String> = Backoff::default().retry("noop", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
