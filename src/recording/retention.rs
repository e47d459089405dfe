// src/recording/retention.rs
//! Bounded in-memory retention of recent events
//!
//! `RetentionBuffer` owns the event history. Appending and evicting happen
//! under a single lock acquisition, so `snapshot()` always observes a window
//! that satisfies the active policy.

use crate::observability::metrics as m;
use crate::recording::event::Event;
use crate::recording::eviction::{policy_for, EvictionPolicy};
use crate::utils::config::MonitorConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// The retained events plus checkpoint bookkeeping
///
/// Checkpoints are stored as absolute sequence numbers (position of the event
/// in the whole session), which stay valid as the head moves forward.
#[derive(Debug, Default)]
pub struct RetentionWindow {
    events: VecDeque<Event>,

    /// Sequence number of `events.front()`
    head_seq: u64,

    /// Sequence numbers of events that opened a segment, ascending
    checkpoints: VecDeque<u64>,

    newest_timestamp: Option<u64>,
    ingested: u64,
    evicted: u64,
}

impl RetentionWindow {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn front_timestamp(&self) -> Option<u64> {
        self.events.front().map(|e| e.timestamp)
    }

    /// Largest timestamp ingested so far (survives eviction)
    pub fn newest_timestamp(&self) -> Option<u64> {
        self.newest_timestamp
    }

    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub(crate) fn push(&mut self, event: Event, checkpoint: bool) {
        let seq = self.head_seq + self.events.len() as u64;
        self.newest_timestamp = Some(
            self.newest_timestamp
                .map_or(event.timestamp, |newest| newest.max(event.timestamp)),
        );
        self.events.push_back(event);
        self.ingested += 1;

        if checkpoint {
            self.checkpoints.push_back(seq);
        }
    }

    /// Remove the oldest event
    pub fn pop_front(&mut self) -> Option<Event> {
        let event = self.events.pop_front()?;
        self.head_seq += 1;
        self.evicted += 1;

        while self
            .checkpoints
            .front()
            .is_some_and(|seq| *seq < self.head_seq)
        {
            self.checkpoints.pop_front();
        }

        Some(event)
    }

    /// Evict every event with a sequence number below `seq`
    pub fn evict_before(&mut self, seq: u64) -> usize {
        let mut evicted = 0;
        while self.head_seq < seq && self.pop_front().is_some() {
            evicted += 1;
        }
        evicted
    }

    /// Timestamp of the event opening the current segment
    ///
    /// Without any checkpoint the whole window is one segment starting at the head.
    pub fn current_segment_start(&self) -> Option<u64> {
        match self.checkpoints.back() {
            Some(seq) => self.timestamp_at(*seq),
            None => self.front_timestamp(),
        }
    }

    /// Start of the segment before the current one, if there is one
    pub fn previous_checkpoint(&self) -> Option<u64> {
        let n = self.checkpoints.len();
        (n >= 2).then(|| self.checkpoints[n - 2])
    }

    /// Make the most recently pushed event open a new segment
    ///
    /// Returns false if it already does or the window is empty.
    pub fn mark_newest_as_checkpoint(&mut self) -> bool {
        if self.events.is_empty() {
            return false;
        }
        let seq = self.head_seq + self.events.len() as u64 - 1;
        if self.checkpoints.back() == Some(&seq) {
            return false;
        }
        self.checkpoints.push_back(seq);
        true
    }

    fn timestamp_at(&self, seq: u64) -> Option<u64> {
        let offset = seq.checked_sub(self.head_seq)?;
        self.events.get(offset as usize).map(|e| e.timestamp)
    }
}

/// Retention statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub ingested: u64,
    pub evicted: u64,
    pub retained: usize,
    pub checkpoints: usize,
    pub oldest_timestamp: Option<u64>,
    pub newest_timestamp: Option<u64>,
}

/// Thread-safe retention buffer with a pluggable eviction policy
pub struct RetentionBuffer {
    window: Mutex<RetentionWindow>,
    policy: Box<dyn EvictionPolicy>,
}

impl RetentionBuffer {
    /// Create a buffer using `policy` for eviction
    pub fn new(policy: Box<dyn EvictionPolicy>) -> Self {
        debug!("Creating retention buffer with {} eviction", policy.name());
        Self {
            window: Mutex::new(RetentionWindow::default()),
            policy,
        }
    }

    /// Create a buffer with the policy selected by `config`
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(policy_for(config))
    }

    /// Record one event and evict what falls out of the window
    pub fn ingest(&self, event: Event) {
        self.append(event, false);
    }

    /// Record an event that opens a new checkpoint segment
    pub fn ingest_checkpoint(&self, event: Event) {
        self.append(event, true);
    }

    fn append(&self, event: Event, checkpoint: bool) {
        let checkpoint = checkpoint && self.policy.honors_producer_checkpoints();
        let (evicted, retained) = {
            let mut window = self.window.lock();
            window.push(event, checkpoint);
            let newest = window.newest_timestamp().unwrap_or(0);
            let evicted = self.policy.evict(&mut window, newest);
            (evicted, window.len())
        };

        if evicted > 0 {
            trace!("Evicted {} events, {} retained", evicted, retained);
            metrics::counter!(m::EVENTS_EVICTED).increment(evicted as u64);
        }
        metrics::counter!(m::EVENTS_INGESTED).increment(1);
        metrics::gauge!(m::RETAINED_EVENTS).set(retained as f64);
    }

    /// Owned copy of the currently retained events, oldest first
    pub fn snapshot(&self) -> Vec<Event> {
        let window = self.window.lock();
        window.iter().cloned().collect()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().is_empty()
    }

    /// Name of the active eviction policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn stats(&self) -> RetentionStats {
        let window = self.window.lock();
        RetentionStats {
            ingested: window.ingested(),
            evicted: window.evicted(),
            retained: window.len(),
            checkpoints: window.checkpoint_count(),
            oldest_timestamp: window.front_timestamp(),
            newest_timestamp: window.newest_timestamp(),
        }
    }
}

impl std::fmt::Debug for RetentionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionBuffer")
            .field("policy", &self.policy)
            .field("retained", &self.len())
            .finish()
    }
}
