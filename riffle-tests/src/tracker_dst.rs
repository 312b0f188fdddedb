//! Checkpoint tracker simulation tests.
//!
//! Records are delivered in batches and completed in a seeded random order,
//! interleaved with trigger evaluations, checkpoint attempts (some of which
//! fail) and clock advances. Properties are checked after every step.

#![allow(clippy::cast_possible_truncation)] // Small test sizes.
#![allow(clippy::too_many_lines)] // Test functions can be longer for clarity

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use riffle_checkpoint::{
    CheckpointConfig, CheckpointError, CheckpointTracker, CheckpointerFaultConfig,
    SimulatedCheckpointer,
};
use riffle_core::Record;

use crate::properties::{
    check_checkpoints_complete, check_checkpoints_monotonic, check_prefix_eviction,
};
use crate::scenarios::{position, records, seeds};

/// Runs one randomized tracker simulation.
async fn run_tracker_simulation(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = CheckpointConfig::for_testing()
        .with_max_batch_size(rng.gen_range(1..=20))
        .with_max_batch_wait(Duration::from_millis(rng.gen_range(10..=500)));
    let checkpointer = SimulatedCheckpointer::with_faults(seed, CheckpointerFaultConfig::flaky());
    let mut tracker = CheckpointTracker::new(config);

    let total: u128 = rng.gen_range(1..=200);
    let delivered: Vec<Record> = records(1..=total);

    // Deliver in random-sized batches, completing a random subset in between.
    let mut next_delivery = 0usize;
    let mut completion_order: Vec<usize> = Vec::new();
    let mut completed = 0usize;

    while completed < delivered.len() {
        if next_delivery < delivered.len() && rng.gen_bool(0.5) {
            let size = rng.gen_range(1..=10).min(delivered.len() - next_delivery);
            let batch = &delivered[next_delivery..next_delivery + size];
            tracker.watch_for_completion(batch.iter().cloned());
            completion_order.extend(next_delivery..next_delivery + size);
            completion_order.shuffle(&mut rng);
            next_delivery += size;
        }

        // Complete a few delivered records in random order.
        let burst = rng.gen_range(0..=3).min(completion_order.len());
        for index in completion_order.drain(..burst) {
            assert!(delivered[index].mark_processed());
            completed += 1;
        }

        if rng.gen_bool(0.3) {
            tokio::time::advance(Duration::from_millis(rng.gen_range(0..=200))).await;
        }

        let due = tracker.should_checkpoint();
        let visible = &delivered[..next_delivery];
        if let Err(violation) = check_prefix_eviction(visible, &tracker) {
            panic!("seed {seed}: {violation}");
        }

        if due {
            let pending = tracker.pending_position().cloned();
            let result = tracker.checkpoint_last_completed_record(&checkpointer).await;
            match result {
                Ok(persisted) => assert_eq!(persisted, pending, "seed {seed}"),
                Err(CheckpointError::Throttled { .. }) => {
                    assert_eq!(tracker.pending_position(), pending.as_ref(), "seed {seed}");
                }
                Err(e) => panic!("seed {seed}: unexpected error {e}"),
            }
            // Triggers reset after every attempt, successful or not.
            assert_eq!(tracker.completed_since_checkpoint(), 0, "seed {seed}");
            assert!(!tracker.should_checkpoint(), "seed {seed}");
        }

        let persisted = checkpointer.persisted();
        if let Err(violation) = check_checkpoints_monotonic(&persisted) {
            panic!("seed {seed}: {violation}");
        }
        if let Err(violation) = check_checkpoints_complete(&persisted, visible) {
            panic!("seed {seed}: {violation}");
        }

        // Deliver the rest once nothing is left to complete.
        if completion_order.is_empty() && next_delivery < delivered.len() {
            let batch = &delivered[next_delivery..];
            tracker.watch_for_completion(batch.iter().cloned());
            completion_order.extend(next_delivery..delivered.len());
            completion_order.shuffle(&mut rng);
            next_delivery = delivered.len();
        }
    }

    // Everything completed: the whole sequence drains and the last record
    // becomes checkpointable.
    assert!(tracker.all_in_flight_records_completed(), "seed {seed}");
    tracker.should_checkpoint();
    assert_eq!(tracker.in_flight_len(), 0, "seed {seed}");

    checkpointer.set_fail_rate(0.0);
    tracker
        .checkpoint_last_completed_record(&checkpointer)
        .await
        .unwrap();
    assert_eq!(
        checkpointer.last_position(),
        Some(position(total)),
        "seed {seed}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_dst_tracker_regression_seeds() {
    for &seed in seeds::REGRESSION_SEEDS {
        run_tracker_simulation(seed).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_tracker_random_seeds() {
    for seed in 0..u64::from(seeds::CI_SEED_COUNT) {
        run_tracker_simulation(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_dst_tracker_reverse_completion() {
    // Worst case: nothing is evictable until the very first record completes.
    let delivered = records(1..=50);
    let mut tracker = CheckpointTracker::new(CheckpointConfig::for_testing());
    tracker.watch_for_completion(delivered.iter().cloned());

    for record in delivered.iter().skip(1).rev() {
        record.mark_processed();
        tracker.should_checkpoint();
        assert_eq!(tracker.in_flight_len(), 50);
        assert_eq!(tracker.pending_position(), None);
    }

    delivered[0].mark_processed();
    assert!(tracker.should_checkpoint());
    assert_eq!(tracker.in_flight_len(), 0);
    assert_eq!(tracker.completed_since_checkpoint(), 50);
    assert_eq!(tracker.pending_position(), Some(&position(50)));
}

#[tokio::test(start_paused = true)]
async fn test_tracker_two_then_one_then_three() {
    let delivered = records(1..=3);
    let mut tracker = CheckpointTracker::new(CheckpointConfig::for_testing());
    tracker.watch_for_completion(delivered.iter().cloned());

    delivered[1].mark_processed();
    tracker.should_checkpoint();
    assert_eq!(tracker.in_flight_len(), 3);

    delivered[0].mark_processed();
    tracker.should_checkpoint();
    assert_eq!(tracker.completed_since_checkpoint(), 2);
    assert_eq!(tracker.in_flight_len(), 1);

    let checkpointer = SimulatedCheckpointer::new(1);
    let persisted = tracker
        .checkpoint_last_completed_record(&checkpointer)
        .await
        .unwrap();
    assert_eq!(persisted, Some(position(2)));

    delivered[2].mark_processed();
    tracker.should_checkpoint();
    assert_eq!(tracker.in_flight_len(), 0);
}
