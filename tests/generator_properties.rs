//! Property tests for uniform value generation.
//!
//! Run with: `cargo test --test generator_properties`

use std::time::Duration;

use proptest::prelude::*;

use testkit_rs::UniformRandomGenerator;

/// Case budget: full in CI, small locally, overridable via `PROPTEST_CASES`.
fn cases(default: u32) -> u32 {
    if let Some(value) = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
    {
        return value.max(1);
    }
    if std::env::var_os("CI").is_some() {
        default.max(1)
    } else {
        default.clamp(1, 16)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(cases(256)))]

    #[test]
    fn integral_samples_lie_in_inclusive_bounds(
        (lower, upper) in any::<(i64, i64)>().prop_map(|(a, b)| (a.min(b), a.max(b))),
        seed in any::<u64>(),
    ) {
        let mut g = UniformRandomGenerator::with_seed(lower, upper, seed);
        for _ in 0..64 {
            let v = g.generate();
            prop_assert!(v >= lower && v <= upper);
        }
    }

    #[test]
    fn real_samples_lie_in_half_open_bounds(
        (lower, upper) in (-1.0e9f64..1.0e9, -1.0e9f64..1.0e9)
            .prop_map(|(a, b)| (a.min(b), a.max(b))),
        seed in any::<u64>(),
    ) {
        let mut g = UniformRandomGenerator::with_seed(lower, upper, seed);
        for _ in 0..64 {
            let v = g.generate();
            if lower == upper {
                // Degenerate interval: the bound itself is the only value.
                prop_assert_eq!(v, lower);
            } else {
                prop_assert!(v >= lower && v < upper);
            }
        }
    }

    #[test]
    fn duration_rep_lies_in_bounds(
        (lo, hi) in any::<(u64, u64)>().prop_map(|(a, b)| (a.min(b), a.max(b))),
        seed in any::<u64>(),
    ) {
        let lower = Duration::from_nanos(lo);
        let upper = Duration::from_nanos(hi);
        let mut g = UniformRandomGenerator::with_seed(lower, upper, seed);
        for _ in 0..64 {
            let v = g.generate();
            prop_assert!(v >= lower && v <= upper);
        }
    }

    #[test]
    fn equal_seeds_agree(seed in any::<u64>()) {
        let mut a = UniformRandomGenerator::with_seed(i32::MIN, i32::MAX, seed);
        let mut b = UniformRandomGenerator::with_seed(i32::MIN, i32::MAX, seed);
        for _ in 0..32 {
            prop_assert_eq!(a.generate(), b.generate());
        }
    }
}

#[test]
fn bernoulli_rate_tracks_probability() {
    const TRIALS: usize = 100_000;
    // Seeded runs keep the observed rate stable; the tolerance still leaves
    // several standard deviations of slack at 100k trials.
    for (probability, seed) in [(0.5, 11u64), (0.2, 22), (0.9, 33)] {
        let mut g = UniformRandomGenerator::with_probability_and_seed(probability, seed).unwrap();
        let hits = (0..TRIALS).filter(|_| g.generate()).count();
        let rate = hits as f64 / TRIALS as f64;
        assert!(
            (rate - probability).abs() < 0.01,
            "observed rate {rate} for configured probability {probability}"
        );
    }
}
