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

//! Concurrency slot tokens.
//!
//! A `SlotToken` holds one of a worker pool's slots. The poll loop reserves a
//! slot before it polls, hands the token to the job it submits, and the slot
//! is freed when the job finishes and the token drops.

use tokio::sync::OwnedSemaphorePermit;

#[derive(Debug)]
pub struct SlotToken {
    permit: Option<OwnedSemaphorePermit>,
}

impl SlotToken {
    pub(crate) fn new(permit: OwnedSemaphorePermit) -> Self {
        Self {
            permit: Some(permit),
        }
    }

    /// Frees the slot early. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        self.permit.take().is_some()
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn test_release_and_drop_return_the_slot() {
        let semaphore = Arc::new(Semaphore::new(2));
        let mut first = SlotToken::new(semaphore.clone().acquire_owned().await.unwrap());
        let second = SlotToken::new(semaphore.clone().acquire_owned().await.unwrap());
        assert_eq!(semaphore.available_permits(), 0);

        assert!(first.release());
        assert!(!first.release());
        assert!(!first.is_held());
        assert_eq!(semaphore.available_permits(), 1);

        drop(second);
        assert_eq!(semaphore.available_permits(), 2);
    }
}
