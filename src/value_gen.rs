//! Uniform random value generation for test inputs.
//!
//! The sampling strategy is chosen by the value's type at construction time,
//! not by a runtime tag:
//! - integers sample uniformly over `[lower, upper]` (inclusive),
//! - floats sample uniformly over `[lower, upper)` (half-open; equal bounds
//!   collapse to a constant),
//! - `bool` runs a Bernoulli trial (bounds are ignored),
//! - `Duration` samples its nanosecond representation uniformly and
//!   reinterprets the draw as a duration.
//!
//! Generators are independent and own their engine state. They are cheap to
//! construct, intended for single-threaded use inside one test case, and have
//! no error conditions: the only side effect of `generate()` is advancing the
//! engine.

use std::time::Duration;

use rand::distributions::{Bernoulli, BernoulliError, Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Success probability used for boolean generation unless overridden.
pub const DEFAULT_TRUE_PROBABILITY: f64 = 0.5;

/// A value category that can be sampled uniformly.
///
/// The associated `Dist` type fixes the sampling algorithm per category when
/// the generator is constructed. Implemented for primitive integers, floats,
/// `bool`, and `Duration`; the set is closed by design.
pub trait SampleDomain: Sized + Copy {
    /// Distribution used to sample this type.
    type Dist: Distribution<Self>;

    /// Bounds used by `Default` generators.
    ///
    /// Integers and durations use their representable extremes. Floats use
    /// `[0, 1)` because a uniform over the full `f64` range is not a finite
    /// interval. Booleans report `(false, true)` and ignore bounds entirely.
    fn full_range() -> (Self, Self);

    /// Builds the category's distribution for the given bounds.
    fn distribution(lower: Self, upper: Self) -> Self::Dist;
}

macro_rules! impl_integral_domain {
    ($($t:ty),* $(,)?) => {$(
        impl SampleDomain for $t {
            type Dist = Uniform<$t>;

            fn full_range() -> (Self, Self) {
                (<$t>::MIN, <$t>::MAX)
            }

            fn distribution(lower: Self, upper: Self) -> Self::Dist {
                Uniform::new_inclusive(lower, upper)
            }
        }
    )*};
}

impl_integral_domain!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

macro_rules! impl_real_domain {
    ($($t:ty),* $(,)?) => {$(
        impl SampleDomain for $t {
            type Dist = Uniform<$t>;

            fn full_range() -> (Self, Self) {
                (0.0, 1.0)
            }

            fn distribution(lower: Self, upper: Self) -> Self::Dist {
                if lower == upper {
                    // Degenerate interval: always produce the bound itself.
                    Uniform::new_inclusive(lower, upper)
                } else {
                    // Half-open: `upper` itself is never produced.
                    Uniform::new(lower, upper)
                }
            }
        }
    )*};
}

impl_real_domain!(f32, f64);

fn default_bernoulli() -> Bernoulli {
    Bernoulli::new(DEFAULT_TRUE_PROBABILITY).expect("0.5 is a valid probability")
}

impl SampleDomain for bool {
    type Dist = Bernoulli;

    fn full_range() -> (Self, Self) {
        (false, true)
    }

    fn distribution(_lower: Self, _upper: Self) -> Self::Dist {
        default_bernoulli()
    }
}

/// Clamp a duration to the sampleable `u64` nanosecond representation.
fn duration_rep(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Samples `Duration` by drawing its nanosecond representation uniformly
/// (inclusive bounds) and reinterpreting the integer as a duration.
#[derive(Clone, Copy, Debug)]
pub struct UniformDuration {
    nanos: Uniform<u64>,
}

impl Distribution<Duration> for UniformDuration {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_nanos(self.nanos.sample(rng))
    }
}

impl SampleDomain for Duration {
    type Dist = UniformDuration;

    fn full_range() -> (Self, Self) {
        (Duration::ZERO, Duration::from_nanos(u64::MAX))
    }

    fn distribution(lower: Self, upper: Self) -> Self::Dist {
        UniformDuration {
            nanos: Uniform::new_inclusive(duration_rep(lower), duration_rep(upper)),
        }
    }
}

/// Uniform random generator for a single value category.
///
/// ```
/// use testkit_rs::UniformRandomGenerator;
///
/// let mut g = UniformRandomGenerator::new(0u32, 100);
/// let v = g.generate(); // in [0, 100]
/// assert!(v <= 100);
/// ```
pub struct UniformRandomGenerator<T: SampleDomain, R = StdRng> {
    dist: T::Dist,
    rng: R,
}

impl<T: SampleDomain> UniformRandomGenerator<T, StdRng> {
    /// Generator over `[lower, upper]`, seeded from OS entropy.
    pub fn new(lower: T, upper: T) -> Self {
        Self {
            dist: T::distribution(lower, upper),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for reproducible runs.
    ///
    /// Two generators built with the same bounds and seed produce identical
    /// sequences.
    pub fn with_seed(lower: T, upper: T, seed: u64) -> Self {
        Self {
            dist: T::distribution(lower, upper),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<T: SampleDomain> Default for UniformRandomGenerator<T, StdRng> {
    fn default() -> Self {
        let (lower, upper) = T::full_range();
        Self::new(lower, upper)
    }
}

impl<T: SampleDomain, R: Rng> UniformRandomGenerator<T, R> {
    /// Generator with a caller-supplied engine.
    pub fn with_engine(lower: T, upper: T, rng: R) -> Self {
        Self {
            dist: T::distribution(lower, upper),
            rng,
        }
    }

    /// Returns the next random value.
    pub fn generate(&mut self) -> T {
        self.dist.sample(&mut self.rng)
    }
}

impl UniformRandomGenerator<bool, StdRng> {
    /// Boolean generator with an explicit success probability.
    ///
    /// # Errors
    /// Fails if `probability` is outside `[0, 1]`.
    pub fn with_probability(probability: f64) -> Result<Self, BernoulliError> {
        Ok(Self {
            dist: Bernoulli::new(probability)?,
            rng: StdRng::from_entropy(),
        })
    }

    /// Deterministic variant of [`Self::with_probability`].
    ///
    /// # Errors
    /// Fails if `probability` is outside `[0, 1]`.
    pub fn with_probability_and_seed(probability: f64, seed: u64) -> Result<Self, BernoulliError> {
        Ok(Self {
            dist: Bernoulli::new(probability)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_samples_stay_inclusive() {
        let mut g = UniformRandomGenerator::with_seed(5i32, 7, 0x5EED);
        for _ in 0..1_000 {
            let v = g.generate();
            assert!((5..=7).contains(&v));
        }
    }

    #[test]
    fn integral_single_point_range() {
        let mut g = UniformRandomGenerator::with_seed(42u8, 42, 1);
        for _ in 0..64 {
            assert_eq!(g.generate(), 42);
        }
    }

    #[test]
    fn real_equal_bounds_yield_the_bound() {
        let mut g = UniformRandomGenerator::with_seed(1.0f64, 1.0, 7);
        for _ in 0..64 {
            assert_eq!(g.generate(), 1.0);
        }
        let mut g32 = UniformRandomGenerator::with_seed(-2.5f32, -2.5, 7);
        for _ in 0..64 {
            assert_eq!(g32.generate(), -2.5);
        }
    }

    #[test]
    fn real_samples_stay_half_open() {
        let mut g = UniformRandomGenerator::with_seed(-1.0f64, 1.0, 0x5EED);
        for _ in 0..1_000 {
            let v = g.generate();
            assert!((-1.0..1.0).contains(&v));
        }
    }

    #[test]
    fn duration_rep_stays_in_bounds() {
        let lower = Duration::from_millis(10);
        let upper = Duration::from_millis(20);
        let mut g = UniformRandomGenerator::with_seed(lower, upper, 0x5EED);
        for _ in 0..1_000 {
            let v = g.generate();
            assert!(v >= lower && v <= upper);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = UniformRandomGenerator::with_seed(0u64, u64::MAX, 99);
        let mut b = UniformRandomGenerator::with_seed(0u64, u64::MAX, 99);
        for _ in 0..256 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn degenerate_probabilities() {
        let mut always = UniformRandomGenerator::with_probability_and_seed(1.0, 7).unwrap();
        let mut never = UniformRandomGenerator::with_probability_and_seed(0.0, 7).unwrap();
        for _ in 0..128 {
            assert!(always.generate());
            assert!(!never.generate());
        }
    }

    #[test]
    fn invalid_probability_is_rejected() {
        assert!(UniformRandomGenerator::<bool>::with_probability(1.5).is_err());
        assert!(UniformRandomGenerator::<bool>::with_probability(-0.1).is_err());
    }

    #[test]
    fn default_uses_full_range() {
        // Mostly a compile check: the default pair must be a valid interval
        // for every implemented category.
        let _ = UniformRandomGenerator::<i64>::default().generate();
        let _ = UniformRandomGenerator::<f32>::default().generate();
        let _ = UniformRandomGenerator::<bool>::default().generate();
        let _ = UniformRandomGenerator::<Duration>::default().generate();
    }
}
