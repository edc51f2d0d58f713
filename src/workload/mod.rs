//! Churn Workload
//!
//! Scripted allocate/free scenario used to compare the allocators against
//! plain heap allocation. Every target runs the same operations, drawn from
//! the same seeded random sequence, so all of them must end with the same
//! checksum.
//!
//! Phases:
//! 1. insert `n` items with `val = position`
//! 2. remove `n / 2` random positions (already-empty draws are skipped)
//! 3. refill every empty position with a random value
//! 4. `n` random-position writes `val = i`
//! 5. one sequential pass summing every value (the checksum)
//! 6. destroy everything

pub mod targets;

pub use targets::{
    all_targets, ArcTarget, BoxTarget, PoolSharedTarget, PoolTarget, SlabSharedTarget, SlabTarget,
};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default item count
pub const DEFAULT_COUNT: usize = 1_000_000;

/// Default seed of the random sequence
pub const DEFAULT_SEED: u64 = 1234;

/// Phase labels, in execution order
pub const PHASES: [&str; 6] = [
    "init insert",
    "random removal",
    "second insert",
    "random access",
    "sequential access",
    "destruction",
];

/// The object type churned by the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub val: usize,
}

impl Item {
    pub fn new(val: usize) -> Self {
        Self {
            name: "object".to_string(),
            val,
        }
    }
}

/// A container of `Item`s addressed by position, backed by one allocator
pub trait ChurnTarget {
    /// Short name shown in reports
    fn label(&self) -> &'static str;

    /// Store `item` at an empty `position`
    fn insert(&mut self, position: usize, item: Item);

    /// Drop the item at `position`; returns false if it was already empty
    fn remove(&mut self, position: usize) -> bool;

    fn contains(&self, position: usize) -> bool;

    /// # Panics
    ///
    /// Panics if `position` is empty.
    fn value(&self, position: usize) -> usize;

    /// # Panics
    ///
    /// Panics if `position` is empty.
    fn value_mut(&mut self, position: usize) -> &mut usize;

    /// Drop every item
    fn destroy(&mut self);
}

/// Timings and checksum of one workload run
#[derive(Debug, Clone, Serialize)]
pub struct ChurnReport {
    pub label: String,
    pub count: usize,
    pub seed: u64,
    #[serde(rename = "phases_ms", serialize_with = "serialize_millis")]
    pub phases: [Duration; 6],
    pub checksum: u64,
}

impl ChurnReport {
    pub fn total(&self) -> Duration {
        self.phases.iter().sum()
    }
}

fn serialize_millis<S: Serializer>(phases: &[Duration; 6], serializer: S) -> Result<S::Ok, S::Error> {
    let millis: Vec<f64> = phases.iter().map(|d| d.as_nanos() as f64 / 1e6).collect();
    millis.serialize(serializer)
}

/// Run the scripted workload against `target`, which must start empty
///
/// Positions `0..count` are used; `target` must accept all of them.
pub fn run_churn(target: &mut dyn ChurnTarget, count: usize, seed: u64) -> ChurnReport {
    let label = target.label();
    info!(workload = label, count, seed, "Running churn workload");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut phases = [Duration::ZERO; 6];
    let mut clock = Instant::now();
    let mut lap = |phase: usize, phases: &mut [Duration; 6]| {
        let now = Instant::now();
        phases[phase] = now - clock;
        clock = now;
        debug!(workload = label, phase = PHASES[phase], elapsed = ?phases[phase], "Phase done");
    };

    for position in 0..count {
        target.insert(position, Item::new(position));
    }
    lap(0, &mut phases);

    if count > 0 {
        for _ in 0..count / 2 {
            target.remove(rng.gen_range(0..count));
        }
    }
    lap(1, &mut phases);

    for position in 0..count {
        if !target.contains(position) {
            target.insert(position, Item::new(rng.gen_range(0..count)));
        }
    }
    lap(2, &mut phases);

    if count > 0 {
        for i in 0..count {
            *target.value_mut(rng.gen_range(0..count)) = i;
        }
    }
    lap(3, &mut phases);

    let checksum = (0..count).fold(0u64, |sum, position| {
        sum.wrapping_add(target.value(position) as u64)
    });
    lap(4, &mut phases);

    target.destroy();
    lap(5, &mut phases);

    ChurnReport {
        label: label.to_string(),
        count,
        seed,
        phases,
        checksum,
    }
}
