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

//! Low-water-mark offset tracking.
//!
//! Handlers finish out of order, but a consumer group can only commit a single
//! position per partition, and committing it means "everything before this is
//! done". The tracker therefore commits the lowest offset that is still in
//! flight, or one past the highest issued offset when nothing is in flight.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

#[derive(Debug, Default)]
struct PartitionState {
    in_flight: BTreeSet<i64>,
    highest_issued: Option<i64>,
    committed: Option<i64>,
}

impl PartitionState {
    fn safe_position(&self) -> Option<i64> {
        match self.in_flight.iter().next() {
            Some(lowest) => Some(*lowest),
            None => self.highest_issued.map(|offset| offset + 1),
        }
    }
}

#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<TopicPartition, PartitionState>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `offset` was handed to a handler.
    ///
    /// The first offset seen on a partition is where consumption resumed, so
    /// it counts as already committed.
    pub fn issued(&mut self, topic: &str, partition: i32, offset: i64) {
        let state = self
            .partitions
            .entry(TopicPartition::new(topic, partition))
            .or_insert_with(|| PartitionState {
                committed: Some(offset),
                ..Default::default()
            });
        state.in_flight.insert(offset);
        if state.highest_issued.map_or(true, |highest| offset > highest) {
            state.highest_issued = Some(offset);
        }
    }

    /// Records that `offset` was acked.
    ///
    /// Returns the new commit position when it advanced past the last one
    /// handed out by this method or by [`OffsetTracker::take_commits`].
    pub fn completed(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self
            .partitions
            .get_mut(&TopicPartition::new(topic, partition))?;
        if !state.in_flight.remove(&offset) {
            return None;
        }

        let position = state.safe_position()?;
        if state.committed.map_or(true, |committed| position > committed) {
            state.committed = Some(position);
            Some(position)
        } else {
            None
        }
    }

    /// True when `offset` has been issued and not yet completed.
    pub fn is_in_flight(&self, topic: &str, partition: i32, offset: i64) -> bool {
        self.partitions
            .get(&TopicPartition::new(topic, partition))
            .map_or(false, |state| state.in_flight.contains(&offset))
    }

    /// Positions that are safe to commit and have not been committed yet.
    pub fn take_commits(&mut self) -> Vec<(TopicPartition, i64)> {
        let mut commits = Vec::new();
        for (tp, state) in self.partitions.iter_mut() {
            if let Some(position) = state.safe_position() {
                if state.committed.map_or(true, |committed| position > committed) {
                    state.committed = Some(position);
                    commits.push((tp.clone(), position));
                }
            }
        }
        commits.sort();
        commits
    }

    pub fn in_flight_count(&self) -> usize {
        self.partitions.values().map(|s| s.in_flight.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_completion_advances_each_time() {
        let mut tracker = OffsetTracker::new();
        tracker.issued("received", 0, 0);
        tracker.issued("received", 0, 1);

        assert_eq!(tracker.completed("received", 0, 0), Some(1));
        assert_eq!(tracker.completed("received", 0, 1), Some(2));
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[test]
    fn test_out_of_order_completion_holds_low_water_mark() {
        let mut tracker = OffsetTracker::new();
        for offset in 5..8 {
            tracker.issued("received", 0, offset);
        }

        // 6 and 7 finish first; 5 is still running so nothing may be committed.
        assert_eq!(tracker.completed("received", 0, 7), None);
        assert_eq!(tracker.completed("received", 0, 6), None);
        assert!(tracker.take_commits().is_empty());
        assert!(tracker.is_in_flight("received", 0, 5));

        assert_eq!(tracker.completed("received", 0, 5), Some(8));
    }

    #[test]
    fn test_partitions_are_independent() {
        let mut tracker = OffsetTracker::new();
        tracker.issued("received", 0, 10);
        tracker.issued("received", 1, 3);

        assert_eq!(tracker.completed("received", 1, 3), Some(4));
        assert!(tracker.is_in_flight("received", 0, 10));
        assert_eq!(tracker.completed("received", 0, 10), Some(11));
    }

    #[test]
    fn test_take_commits_reports_unfinished_partition_floor() {
        let mut tracker = OffsetTracker::new();
        tracker.issued("outstanding", 0, 0);
        tracker.issued("outstanding", 0, 1);
        tracker.issued("outstanding", 0, 2);
        assert_eq!(tracker.completed("outstanding", 0, 0), Some(1));
        assert_eq!(tracker.completed("outstanding", 0, 2), None);

        // Offset 1 never finished; a restart must resume from it.
        let commits = tracker.take_commits();
        assert!(commits.is_empty());

        assert_eq!(tracker.completed("outstanding", 0, 1), Some(3));
        assert!(tracker.take_commits().is_empty());
    }

    #[test]
    fn test_unknown_offsets_are_ignored() {
        let mut tracker = OffsetTracker::new();
        assert_eq!(tracker.completed("received", 0, 3), None);
        tracker.issued("received", 0, 3);
        assert_eq!(tracker.completed("received", 0, 4), None);
    }
}
