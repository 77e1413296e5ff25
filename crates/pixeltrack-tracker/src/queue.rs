//! Pending delivery queue for the client channel.
//!
//! Events produced before the in-page script is ready wait here. Each entry
//! is a small state machine: it starts `Queued` and leaves the queue as
//! either `Delivered` (flushed to the script) or `Exhausted` (the retry
//! schedule ran out first). The tracker drives transitions from timer ticks;
//! this module only keeps the bookkeeping.

use std::collections::VecDeque;
use std::time::Duration;

use pixeltrack_core::{EventId, EventName, Payload};
use serde::Serialize;

use crate::error::ScriptError;

/// Oldest entries are dropped beyond this many queued events.
const MAX_PENDING: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    Queued,
    Delivered,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub seq: u64,
    pub event_name: EventName,
    pub payload: Payload,
    pub event_id: EventId,
    /// Retry ticks observed so far.
    pub attempts: u32,
    pub state: PendingState,
}

/// Lifetime counters for the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub dropped: u64,
}

/// Delays between retry ticks for one queued event.
///
/// | Tick | Delay before tick |
/// |------|-------------------|
/// | 1    | 100 ms            |
/// | 2    | 250 ms            |
/// | 3    | 500 ms            |
/// | 4    | 1 s               |
/// | 5    | 1.5 s             |
/// | 6    | 2.5 s             |
///
/// After the last tick a still-queued event is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.delays.iter().copied()
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }

    /// Sum of all delays: how long an event can wait before exhaustion.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.delays.iter().sum()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(
            [100, 250, 500, 1_000, 1_500, 2_500]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingEvent>,
    next_seq: u64,
    stats: QueueStats,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its sequence number.
    pub fn enqueue(&mut self, event_name: EventName, payload: Payload, event_id: EventId) -> u64 {
        if self.entries.len() >= MAX_PENDING {
            if let Some(dropped) = self.entries.pop_front() {
                self.stats.dropped += 1;
                tracing::warn!(
                    event_name = %dropped.event_name,
                    event_id = %dropped.event_id,
                    "pending queue full, dropping oldest event"
                );
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.stats.enqueued += 1;
        self.entries.push_back(PendingEvent {
            seq,
            event_name,
            payload,
            event_id,
            attempts: 0,
            state: PendingState::Queued,
        });
        seq
    }

    #[must_use]
    pub fn contains(&self, seq: u64) -> bool {
        self.entries.iter().any(|e| e.seq == seq)
    }

    /// Counts one retry tick against `seq`; `None` if it already left the queue.
    pub fn record_attempt(&mut self, seq: u64) -> Option<u32> {
        let entry = self.entries.iter_mut().find(|e| e.seq == seq)?;
        entry.attempts += 1;
        Some(entry.attempts)
    }

    /// Hands queued events to `deliver` in FIFO order.
    ///
    /// Stops at the first failure so later events never overtake an earlier
    /// one; the failed event and everything behind it stay queued.
    pub fn flush<F>(&mut self, mut deliver: F) -> Vec<PendingEvent>
    where
        F: FnMut(&PendingEvent) -> Result<(), ScriptError>,
    {
        let mut delivered = Vec::new();
        while let Some(front) = self.entries.front() {
            if let Err(err) = deliver(front) {
                tracing::warn!(
                    event_name = %front.event_name,
                    event_id = %front.event_id,
                    error = %err,
                    "flush stopped, event stays queued"
                );
                break;
            }
            if let Some(mut done) = self.entries.pop_front() {
                done.state = PendingState::Delivered;
                self.stats.delivered += 1;
                delivered.push(done);
            }
        }
        delivered
    }

    /// Removes `seq` as exhausted; `None` if it already left the queue.
    pub fn exhaust(&mut self, seq: u64) -> Option<PendingEvent> {
        let idx = self.entries.iter().position(|e| e.seq == seq)?;
        let mut entry = self.entries.remove(idx)?;
        entry.state = PendingState::Exhausted;
        self.stats.exhausted += 1;
        Some(entry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEvent> {
        self.entries.iter()
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}
