use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::value_objects::{DetectionEvent, SequencedEvent};

struct Pending {
    timestamp: u64,
    seq: u64,
    arrived_at: Instant,
    event: DetectionEvent,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        (self.timestamp, self.seq) == (other.timestamp, other.seq)
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.seq).cmp(&(other.timestamp, other.seq))
    }
}

/// Bounded reordering of events arriving out of timestamp order.
///
/// Events are held until the buffer overflows `capacity` or the oldest held
/// event has waited `max_delay`, then released smallest timestamp first.
/// An event that still lands behind an already released timestamp is passed
/// through flagged as out of order rather than dropped.
pub struct ReorderBuffer {
    capacity: usize,
    max_delay: Duration,
    pending: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
    last_released: Option<u64>,
}

impl ReorderBuffer {
    pub fn new(capacity: usize, max_delay: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            max_delay,
            pending: BinaryHeap::new(),
            next_seq: 0,
            last_released: None,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, event: DetectionEvent, now: Instant) -> Vec<SequencedEvent> {
        self.pending.push(Reverse(Pending {
            timestamp: event.timestamp,
            seq: self.next_seq,
            arrived_at: now,
            event,
        }));
        self.next_seq += 1;

        let mut released = Vec::new();
        while self.pending.len() > self.capacity {
            if let Some(event) = self.release_one() {
                released.push(event);
            }
        }
        released
    }

    /// When the held events must be released
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .iter()
            .map(|Reverse(p)| p.arrived_at)
            .min()
            .map(|oldest| oldest + self.max_delay)
    }

    pub fn release_due(&mut self, now: Instant) -> Vec<SequencedEvent> {
        match self.next_deadline() {
            Some(deadline) if deadline <= now => self.drain(),
            _ => Vec::new(),
        }
    }

    pub fn drain(&mut self) -> Vec<SequencedEvent> {
        let mut released = Vec::with_capacity(self.pending.len());
        while let Some(event) = self.release_one() {
            released.push(event);
        }
        released
    }

    fn release_one(&mut self) -> Option<SequencedEvent> {
        let Reverse(pending) = self.pending.pop()?;
        let out_of_order = match self.last_released {
            Some(last) if pending.timestamp < last => true,
            _ => {
                self.last_released = Some(pending.timestamp);
                false
            }
        };
        Some(SequencedEvent {
            event: pending.event,
            out_of_order,
        })
    }
}
