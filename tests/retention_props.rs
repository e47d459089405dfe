// tests/retention_props.rs
//! Property tests for the retention buffer's eviction invariants

use proptest::prelude::*;
use replay_monitor::recording::{Event, RetentionBuffer, SegmentEviction, TimeWindowEviction};

/// Non-decreasing timestamps built from random gaps
fn arb_timestamps() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..5_000, 1..200).prop_map(|gaps| {
        gaps.into_iter()
            .scan(0u64, |ts, gap| {
                *ts += gap;
                Some(*ts)
            })
            .collect()
    })
}

fn arb_segmented() -> impl Strategy<Value = Vec<(u64, bool)>> {
    prop::collection::vec((0u64..1_000, prop::bool::weighted(0.1)), 1..200).prop_map(|steps| {
        let mut ts = 0;
        steps
            .into_iter()
            .map(|(gap, checkpoint)| {
                ts += gap;
                (ts, checkpoint)
            })
            .collect()
    })
}

fn retained(buffer: &RetentionBuffer) -> Vec<u64> {
    buffer.snapshot().iter().map(|e| e.timestamp).collect()
}

proptest! {
    #[test]
    fn prop_time_window_keeps_exactly_recent_events(
        timestamps in arb_timestamps(),
        record_time in 1u64..20_000,
    ) {
        let buffer = RetentionBuffer::new(Box::new(TimeWindowEviction::new(record_time)));

        for (i, ts) in timestamps.iter().enumerate() {
            buffer.ingest(Event::at(*ts));

            let expected: Vec<u64> = timestamps[..=i]
                .iter()
                .copied()
                .filter(|t| t + record_time >= *ts)
                .collect();
            prop_assert_eq!(retained(&buffer), expected);
        }

        let stats = buffer.stats();
        prop_assert_eq!(stats.ingested, timestamps.len() as u64);
        prop_assert_eq!(stats.ingested, stats.evicted + stats.retained as u64);
    }

    #[test]
    fn prop_snapshot_is_isolated_from_later_ingestion(
        timestamps in arb_timestamps(),
        split in 0usize..200,
    ) {
        let buffer = RetentionBuffer::new(Box::new(TimeWindowEviction::new(3_000)));
        let split = split.min(timestamps.len());

        for ts in &timestamps[..split] {
            buffer.ingest(Event::at(*ts));
        }
        let snapshot = buffer.snapshot();
        let frozen = snapshot.clone();

        for ts in &timestamps[split..] {
            buffer.ingest(Event::at(*ts));
        }
        prop_assert_eq!(snapshot, frozen);
    }

    #[test]
    fn prop_segments_keep_at_most_two(steps in arb_segmented()) {
        let buffer = RetentionBuffer::new(Box::new(SegmentEviction::producer_driven()));

        for (ts, checkpoint) in &steps {
            if *checkpoint {
                buffer.ingest_checkpoint(Event::at(*ts));
            } else {
                buffer.ingest(Event::at(*ts));
            }
        }

        let checkpoints: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, (_, checkpoint))| *checkpoint)
            .map(|(i, _)| i)
            .collect();
        let start = if checkpoints.len() >= 2 {
            checkpoints[checkpoints.len() - 2]
        } else {
            0
        };

        let expected: Vec<u64> = steps[start..].iter().map(|(ts, _)| *ts).collect();
        prop_assert_eq!(retained(&buffer), expected);
        prop_assert!(buffer.stats().checkpoints <= 2);
    }

    #[test]
    fn prop_self_checkpointing_span_stays_within_one_to_two_segments(
        steps in arb_segmented(),
        record_time in 1_000u64..5_000,
    ) {
        // Producer checkpoints are mixed in but must not cut segments
        let buffer = RetentionBuffer::new(Box::new(SegmentEviction::new(Some(record_time))));
        let max_gap = 1_000;

        for (ts, checkpoint) in &steps {
            if *checkpoint {
                buffer.ingest_checkpoint(Event::at(*ts));
            } else {
                buffer.ingest(Event::at(*ts));
            }

            let stats = buffer.stats();
            let span = stats.newest_timestamp.unwrap() - stats.oldest_timestamp.unwrap();
            prop_assert!(span < 2 * record_time + max_gap, "span {} too wide", span);
            if stats.checkpoints > 0 {
                prop_assert!(span >= record_time, "span {} too narrow", span);
            }
            prop_assert!(stats.checkpoints <= 2);
        }
    }
}
