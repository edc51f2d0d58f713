//! End-to-end churn scenario: every allocator must reproduce the reference checksum

use churnpool::workload::{
    run_churn, ArcTarget, BoxTarget, ChurnTarget, PoolSharedTarget, PoolTarget, SlabSharedTarget,
    SlabTarget,
    DEFAULT_COUNT, DEFAULT_SEED,
};
use churnpool::{AllocConfig, PoolConfig, SlabConfig};

fn reference(count: usize, seed: u64) -> u64 {
    run_churn(&mut BoxTarget::new(count), count, seed).checksum
}

fn assert_matches(target: &mut dyn ChurnTarget, count: usize, seed: u64, expected: u64) {
    let report = run_churn(target, count, seed);
    assert_eq!(
        report.checksum, expected,
        "{} checksum differs from the box reference",
        report.label
    );
}

#[test]
fn test_full_scenario_matches_reference() -> churnpool::error::Result<()> {
    let count = DEFAULT_COUNT;
    let seed = DEFAULT_SEED;
    let config = AllocConfig::default();
    let expected = reference(count, seed);
    assert!(expected > 0);

    assert_matches(&mut ArcTarget::new(count), count, seed, expected);
    assert_matches(&mut PoolTarget::new(count, &config)?, count, seed, expected);
    assert_matches(&mut PoolSharedTarget::new(count, &config)?, count, seed, expected);
    assert_matches(&mut SlabTarget::new(count, &config)?, count, seed, expected);
    assert_matches(&mut SlabSharedTarget::new(count, &config)?, count, seed, expected);
    Ok(())
}

#[test]
fn test_tiny_geometry_matches_reference() -> churnpool::error::Result<()> {
    // Small chunks and blocks force many blocks and constant recycling
    let config = AllocConfig {
        pool: PoolConfig {
            chunk_bytes: 512,
            chunks_per_block: 2,
        },
        slab: SlabConfig { block_bytes: 256 },
    };
    let count = 50_000;

    for seed in [1, 7, DEFAULT_SEED] {
        let expected = reference(count, seed);
        assert_matches(&mut PoolTarget::new(count, &config)?, count, seed, expected);
        assert_matches(&mut PoolSharedTarget::new(count, &config)?, count, seed, expected);
        assert_matches(&mut SlabTarget::new(count, &config)?, count, seed, expected);
        assert_matches(&mut SlabSharedTarget::new(count, &config)?, count, seed, expected);
    }
    Ok(())
}

#[test]
fn test_same_seed_is_deterministic() {
    assert_eq!(reference(10_000, 42), reference(10_000, 42));
}
