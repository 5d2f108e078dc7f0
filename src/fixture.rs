//! Per-test-case base fixture.

use std::sync::Arc;

use crate::alloc_env::active_allocator;
use crate::device_alloc::DeviceAllocator;

/// Base fixture for test cases that allocate through the harness.
///
/// One instance per test case. The allocator handle is captured from the
/// active environment at construction time and never revalidated; building a
/// fixture outside the environment bracket is a composition bug and panics,
/// matching the runner's ordering guarantee rather than guarding against its
/// absence.
pub struct FixtureBase {
    mr: Arc<DeviceAllocator>,
}

impl Default for FixtureBase {
    fn default() -> Self {
        Self {
            mr: active_allocator().expect("allocator environment is not initialized"),
        }
    }
}

impl FixtureBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that tests built on this fixture should use.
    pub fn allocator(&self) -> &Arc<DeviceAllocator> {
        &self.mr
    }
}
