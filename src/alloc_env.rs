//! Allocator environment: one global setup/teardown pair bracketing the run.
//!
//! Lifecycle is `Uninitialized -> Initialized -> Finalized`, driven only by
//! `set_up` and `tear_down`. The runner guarantees single-pass bracketing;
//! out-of-order calls are a caller bug and are only debug-asserted, never
//! guarded at runtime.
//!
//! While the environment is `Initialized`, the allocator handle lives in an
//! explicit process-wide context slot readable through [`active_allocator`].
//! Test cases observe the handle; they never own it.

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::device_alloc::{AllocError, AllocatorMode, DeviceAllocator};
use crate::runner::{HarnessError, TestEnvironment};

/// Context slot holding the handle between `set_up` and `tear_down`.
static ACTIVE: RwLock<Option<Arc<DeviceAllocator>>> = RwLock::new(None);

/// Allocator installed by the active environment, if any.
///
/// `None` outside the environment bracket.
pub fn active_allocator() -> Option<Arc<DeviceAllocator>> {
    ACTIVE.read().expect("allocator slot poisoned").clone()
}

/// Observable lifecycle state of the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvState {
    Uninitialized,
    Initialized,
    Finalized,
}

/// Fatal environment errors. All of these abort the run.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The configuration string does not name an allocator mode.
    #[error("invalid allocator configuration: {0}")]
    Config(#[source] AllocError),
    /// The allocator resource could not be initialized.
    #[error("allocator initialization failed: {0}")]
    Init(#[source] AllocError),
    /// The allocator resource could not be finalized.
    #[error("allocator finalization failed: {0}")]
    Finalize(#[source] AllocError),
}

/// Owns the process-wide allocator lifecycle for one test run.
pub struct AllocatorEnv {
    mode_string: String,
    state: EnvState,
    resource: Option<Arc<DeviceAllocator>>,
}

impl AllocatorEnv {
    /// Stores the raw configuration string without validation; `set_up`
    /// parses it.
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode_string: mode.into(),
            state: EnvState::Uninitialized,
            resource: None,
        }
    }

    /// Raw configuration string as given.
    pub fn mode_string(&self) -> &str {
        &self.mode_string
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EnvState {
        self.state
    }

    /// Parses the mode, initializes the allocator resource, and installs the
    /// handle into the context slot.
    ///
    /// # Errors
    /// - `Config` if the stored string is not a valid mode (fatal
    ///   configuration error, surfaced before any test case runs).
    /// - `Init` if the resource cannot be initialized.
    pub fn set_up(&mut self) -> Result<(), EnvError> {
        debug_assert_eq!(self.state, EnvState::Uninitialized);

        let mode: AllocatorMode = self.mode_string.parse().map_err(EnvError::Config)?;
        let resource = DeviceAllocator::initialize(mode).map_err(EnvError::Init)?;

        let handle = Arc::new(resource);
        *ACTIVE.write().expect("allocator slot poisoned") = Some(Arc::clone(&handle));
        self.resource = Some(handle);
        self.state = EnvState::Initialized;
        Ok(())
    }

    /// Clears the context slot and finalizes the allocator resource.
    ///
    /// The slot is cleared before finalization so a failed finalize still
    /// leaves no stale handle visible.
    ///
    /// # Errors
    /// `Finalize` if the resource reports outstanding allocations or cannot
    /// release its reservation.
    pub fn tear_down(&mut self) -> Result<(), EnvError> {
        debug_assert_eq!(self.state, EnvState::Initialized);

        ACTIVE.write().expect("allocator slot poisoned").take();
        self.state = EnvState::Finalized;

        if let Some(handle) = self.resource.take() {
            handle.finalize().map_err(EnvError::Finalize)?;
        }
        Ok(())
    }
}

impl TestEnvironment for AllocatorEnv {
    fn set_up(&mut self) -> Result<(), HarnessError> {
        AllocatorEnv::set_up(self).map_err(HarnessError::from)
    }

    fn tear_down(&mut self) -> Result<(), HarnessError> {
        AllocatorEnv::tear_down(self).map_err(HarnessError::from)
    }
}
