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

//! Local redelivery of nacked messages.
//!
//! Neither transport can rewind a single message for one consumer, so nacked
//! deliveries are parked here and handed out again by `poll` once their delay
//! has elapsed. Their offsets stay in flight in the offset tracker, which keeps
//! the committed position from passing them.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::Delivery;

#[derive(Debug)]
pub struct RedeliveryQueue {
    delay: Duration,
    queue: Mutex<VecDeque<(Instant, Delivery)>>,
}

impl RedeliveryQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, mut delivery: Delivery) {
        delivery.attempt = delivery.attempt.saturating_add(1);
        let due = Instant::now() + self.delay;
        self.queue.lock().push_back((due, delivery));
    }

    /// Removes and returns the oldest delivery whose delay has elapsed.
    pub fn pop_due(&self) -> Option<Delivery> {
        let mut queue = self.queue.lock();
        match queue.front() {
            Some((due, _)) if *due <= Instant::now() => queue.pop_front().map(|(_, d)| d),
            _ => None,
        }
    }

    /// Time until the next parked delivery is due, if any.
    pub fn next_due_in(&self) -> Option<Duration> {
        self.queue
            .lock()
            .front()
            .map(|(due, _)| due.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
