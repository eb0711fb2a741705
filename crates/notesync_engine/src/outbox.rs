//! Append-only queue of local deltas awaiting acknowledgment.

use crate::local::PendingDelta;
use notesync_protocol::Delta;
use std::collections::VecDeque;

/// Queue of recorded local deltas.
///
/// # Invariants
///
/// - Deltas are kept in creation order
/// - Sequence numbers increase by one per appended delta and are never reused
/// - A delta is never modified; acknowledgment only removes it
#[derive(Debug, Clone)]
pub struct Outbox {
    entries: VecDeque<PendingDelta>,
    next_seq: u64,
    last_acked: u64,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 1,
            last_acked: 0,
        }
    }

    /// Appends a delta and returns its sequence number.
    pub fn append(&mut self, delta: Delta) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(PendingDelta { seq, delta });
        seq
    }

    /// Unacknowledged deltas in creation order.
    pub fn pending(&self) -> impl Iterator<Item = &PendingDelta> {
        self.entries.iter()
    }

    /// Number of unacknowledged deltas.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Removes every delta with a sequence number up to `seq`.
    ///
    /// Acknowledging an already acknowledged range is a no-op.
    pub fn acknowledge_up_to(&mut self, seq: u64) {
        while self.entries.front().is_some_and(|e| e.seq <= seq) {
            self.entries.pop_front();
        }
        self.last_acked = self.last_acked.max(seq.min(self.next_seq - 1));
    }

    /// Highest acknowledged sequence number.
    pub fn last_acked(&self) -> u64 {
        self.last_acked
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use notesync_protocol::{DeviceId, EntityId, EntityPayload};

    fn delta(title: &str) -> Delta {
        Delta::create(
            EntityId::new(),
            EntityPayload::note(title, ""),
            Utc::now(),
            DeviceId::generate(),
        )
    }

    #[test]
    fn append_assigns_sequence() {
        let mut outbox = Outbox::new();
        assert_eq!(outbox.append(delta("a")), 1);
        assert_eq!(outbox.append(delta("b")), 2);
        assert_eq!(outbox.append(delta("c")), 3);
        assert_eq!(outbox.pending_count(), 3);
    }

    #[test]
    fn acknowledge_removes_prefix() {
        let mut outbox = Outbox::new();
        for title in ["a", "b", "c"] {
            outbox.append(delta(title));
        }

        outbox.acknowledge_up_to(2);
        let remaining: Vec<u64> = outbox.pending().map(|p| p.seq).collect();
        assert_eq!(remaining, vec![3]);
        assert_eq!(outbox.last_acked(), 2);

        outbox.acknowledge_up_to(1);
        assert_eq!(outbox.pending_count(), 1);
        assert_eq!(outbox.last_acked(), 2);
    }

    #[test]
    fn sequences_are_not_reused_after_ack() {
        let mut outbox = Outbox::new();
        outbox.append(delta("a"));
        outbox.acknowledge_up_to(1);
        assert!(outbox.is_empty());
        assert_eq!(outbox.append(delta("b")), 2);
    }

    #[test]
    fn acknowledging_beyond_tail_is_clamped() {
        let mut outbox = Outbox::new();
        outbox.append(delta("a"));
        outbox.acknowledge_up_to(99);
        assert_eq!(outbox.last_acked(), 1);
    }
}
