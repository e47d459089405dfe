// src/recording/eviction.rs
//! Eviction strategies for the retention window
//!
//! A buffer is built with exactly one strategy:
//!
//! - **TimeWindowEviction**: strict bound, every retained event is within
//!   `record_time_ms` of the newest one. Forward scan from the head.
//! - **SegmentEviction**: keeps the current and previous checkpoint segments
//!   and drops older segments whole. The window spans between one and two
//!   segment lengths.
//!
//! ```text
//!            evicted          previous        current
//! checkpoints  |       c1         |      c2      |
//! events     [ . . . . | . . . . . | . . . . . . ]
//!                      ^ cut point (second-to-last checkpoint)
//! ```

use crate::recording::retention::RetentionWindow;
use crate::utils::config::{EvictionMode, MonitorConfig};
use std::fmt::Debug;

/// Pluggable eviction strategy
pub trait EvictionPolicy: Send + Sync + Debug {
    /// Drop events that fall outside the policy, given the newest ingested
    /// timestamp. Returns how many events were evicted.
    fn evict(&self, window: &mut RetentionWindow, newest_timestamp: u64) -> usize;

    /// Short name for logs and metrics labels
    fn name(&self) -> &'static str;

    /// Whether the producer's checkpoint flag opens a segment
    ///
    /// A policy that cuts its own segments returns false so that only one
    /// source ever decides where segments start.
    fn honors_producer_checkpoints(&self) -> bool {
        true
    }
}

/// Build the policy selected by `config.eviction`
pub fn policy_for(config: &MonitorConfig) -> Box<dyn EvictionPolicy> {
    match config.eviction {
        EvictionMode::TimeWindow => Box::new(TimeWindowEviction::new(config.record_time_ms)),
        EvictionMode::CheckpointSegments => {
            let segment_ms = config.self_checkpoint.then_some(config.record_time_ms);
            Box::new(SegmentEviction::new(segment_ms))
        }
    }
}

/// Keeps events with `timestamp + record_time_ms >= newest`
#[derive(Debug, Clone, Copy)]
pub struct TimeWindowEviction {
    record_time_ms: u64,
}

impl TimeWindowEviction {
    pub fn new(record_time_ms: u64) -> Self {
        Self { record_time_ms }
    }

    pub fn record_time_ms(&self) -> u64 {
        self.record_time_ms
    }
}

impl EvictionPolicy for TimeWindowEviction {
    fn evict(&self, window: &mut RetentionWindow, newest_timestamp: u64) -> usize {
        let mut evicted = 0;

        // Timestamps are non-decreasing, so stale events are always at the head
        while let Some(oldest) = window.front_timestamp() {
            if oldest.saturating_add(self.record_time_ms) >= newest_timestamp {
                break;
            }
            window.pop_front();
            evicted += 1;
        }

        evicted
    }

    fn name(&self) -> &'static str {
        "time_window"
    }
}

/// Keeps at most the two most recent checkpoint segments
#[derive(Debug, Clone, Copy)]
pub struct SegmentEviction {
    /// When set, a new segment is opened once the current one spans this long
    segment_ms: Option<u64>,
}

impl SegmentEviction {
    pub fn new(segment_ms: Option<u64>) -> Self {
        Self {
            segment_ms: segment_ms.filter(|ms| *ms > 0),
        }
    }

    /// Segments are cut only by producer checkpoints
    pub fn producer_driven() -> Self {
        Self { segment_ms: None }
    }

    pub fn self_checkpointing(&self) -> bool {
        self.segment_ms.is_some()
    }
}

impl EvictionPolicy for SegmentEviction {
    fn evict(&self, window: &mut RetentionWindow, newest_timestamp: u64) -> usize {
        if let (Some(span), Some(start)) = (self.segment_ms, window.current_segment_start()) {
            if newest_timestamp.saturating_sub(start) >= span {
                window.mark_newest_as_checkpoint();
            }
        }

        match window.previous_checkpoint() {
            Some(cut) => window.evict_before(cut),
            None => 0,
        }
    }

    fn name(&self) -> &'static str {
        "checkpoint_segments"
    }

    fn honors_producer_checkpoints(&self) -> bool {
        !self.self_checkpointing()
    }
}
