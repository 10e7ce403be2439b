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

//! Built-in senders. They only log; real delivery is plugged in by
//! registering other [`Notifier`] implementations.

use async_trait::async_trait;
use tracing::info;

use super::Notifier;
use crate::error::NotifierError;
use crate::models::notification::Destination;

#[derive(Debug, Clone, Copy, Default)]
pub struct SmsNotifier;

#[async_trait]
impl Notifier for SmsNotifier {
    fn destination(&self) -> Destination {
        Destination::Sms
    }

    async fn send(&self, text: &str) -> Result<(), NotifierError> {
        info!(destination = "SMS", "Sent an SMS notification with text {}", text);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmailNotifier;

#[async_trait]
impl Notifier for EmailNotifier {
    fn destination(&self) -> Destination {
        Destination::Email
    }

    async fn send(&self, text: &str) -> Result<(), NotifierError> {
        info!(destination = "EMAIL", "Sent an email notification with text {}", text);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlackNotifier;

#[async_trait]
impl Notifier for SlackNotifier {
    fn destination(&self) -> Destination {
        Destination::Slack
    }

    async fn send(&self, text: &str) -> Result<(), NotifierError> {
        info!(destination = "SLACK", "Sent a Slack notification with text {}", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn test_log_only_senders_log_the_text() {
        SmsNotifier.send("ping").await.unwrap();
        EmailNotifier.send("hello").await.unwrap();
        SlackNotifier.send("deploy done").await.unwrap();

        assert!(logs_contain("Sent an SMS notification with text ping"));
        assert!(logs_contain("Sent an email notification with text hello"));
        assert!(logs_contain("Sent a Slack notification with text deploy done"));
    }
}
