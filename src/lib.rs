//! Test-support harness for native compute crates.
//!
//! ## Scope
//! This crate supplies the infrastructure a compute library's test suite
//! leans on, not the tests themselves:
//! - uniform random value generation across value categories (integers,
//!   floats, booleans, durations) with the sampling strategy picked by the
//!   value's type at construction time,
//! - a process-lifetime scratch directory with documented best-effort
//!   teardown,
//! - a process-wide allocator resource with a strict once-per-process
//!   `set_up`/`tear_down` bracket around the whole run.
//!
//! ## Key invariants
//! - Exactly one allocator handle is live during test execution, created
//!   before the first test case and destroyed after the last.
//! - Ordered categories always sample in range (integers inclusive, floats
//!   half-open); boolean generation is a Bernoulli trial.
//! - The scratch path string ends in exactly one separator and derived paths
//!   are plain concatenation.
//!
//! ## Harness flow
//! `args -> parse_harness_opts -> AllocatorEnv::set_up -> engine runs trials
//! (fixtures observe the handle) -> AllocatorEnv::tear_down -> exit status`
//!
//! ## Notable entry points
//! - [`run_harness`] / [`run_harness_with`]: the composition entry point for
//!   `harness = false` test binaries.
//! - [`UniformRandomGenerator`]: per-test-case value generation.
//! - [`ScratchDir`]: shared file sandbox.
//! - [`FixtureBase`] / [`active_allocator`]: allocator access from tests.

pub mod alloc_env;
pub mod device_alloc;
pub mod fixture;
pub mod runner;
pub mod scratch_dir;
pub mod value_gen;

pub use alloc_env::{active_allocator, AllocatorEnv, EnvError, EnvState};
pub use device_alloc::{
    AllocError, AllocStats, AllocatorMode, DeviceAllocator, DeviceBuffer, BUFFER_ALIGN,
    POOL_BLOCK_COUNT, POOL_BLOCK_SIZE,
};
pub use fixture::FixtureBase;
pub use runner::{
    parse_harness_opts, run_harness, run_harness_with, Failed, HarnessError, HarnessOptions,
    TestEnvironment, Trial, DEFAULT_RMM_MODE,
};
pub use scratch_dir::{RemovalReport, ScratchDir, ScratchDirError, MAX_REMOVE_DEPTH};
pub use value_gen::{
    SampleDomain, UniformDuration, UniformRandomGenerator, DEFAULT_TRUE_PROBABILITY,
};
