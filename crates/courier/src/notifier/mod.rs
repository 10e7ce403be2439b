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

//! Routing of notifications to channel-specific senders.
//!
//! The router is a fixed map from [`Destination`] to one [`Notifier`]. It is
//! built once at startup; registering two senders for the same destination is
//! an error, and routing to a destination without a sender fails loudly with
//! [`NotifierError::NoSender`].

pub mod senders;

pub use senders::{EmailNotifier, SlackNotifier, SmsNotifier};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::NotifierError;
use crate::models::notification::Destination;

/// A sender for one destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn destination(&self) -> Destination;

    async fn send(&self, text: &str) -> Result<(), NotifierError>;
}

#[derive(Clone, Default)]
pub struct NotifierRouter {
    senders: HashMap<Destination, Arc<dyn Notifier>>,
}

impl std::fmt::Debug for NotifierRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierRouter")
            .field("destinations", &self.destinations())
            .finish()
    }
}

impl NotifierRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the built-in log-only senders for every destination.
    pub fn with_default_senders() -> Self {
        let mut router = Self::new();
        router.senders.insert(Destination::Sms, Arc::new(SmsNotifier));
        router.senders.insert(Destination::Email, Arc::new(EmailNotifier));
        router.senders.insert(Destination::Slack, Arc::new(SlackNotifier));
        router
    }

    pub fn register(&mut self, notifier: Arc<dyn Notifier>) -> Result<(), NotifierError> {
        let destination = notifier.destination();
        if self.senders.contains_key(&destination) {
            return Err(NotifierError::DuplicateSender(destination));
        }
        self.senders.insert(destination, notifier);
        Ok(())
    }

    /// Builder form of [`NotifierRouter::register`].
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Result<Self, NotifierError> {
        self.register(notifier)?;
        Ok(self)
    }

    /// Fails unless every destination has a sender.
    pub fn require_complete(&self) -> Result<(), NotifierError> {
        let missing: Vec<Destination> = Destination::ALL
            .into_iter()
            .filter(|d| !self.senders.contains_key(d))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Incomplete(missing))
        }
    }

    pub fn destinations(&self) -> Vec<Destination> {
        let mut destinations: Vec<Destination> = self.senders.keys().copied().collect();
        destinations.sort();
        destinations
    }

    /// Hands `text` to the sender registered for `destination`.
    pub async fn route(
        &self,
        id: Uuid,
        destination: Destination,
        text: &str,
    ) -> Result<(), NotifierError> {
        let notifier = self
            .senders
            .get(&destination)
            .ok_or(NotifierError::NoSender(destination))?;
        notifier.send(text).await?;
        debug!(%id, %destination, "Notification handed to sender");
        Ok(())
    }
}
