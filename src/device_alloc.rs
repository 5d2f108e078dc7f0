//! Process-wide allocator resource bracketed by the test run.
//!
//! This is the resource the allocator environment initializes before the
//! first test case and finalizes after the last. Three modes, selected once
//! per process from a configuration string:
//! - `Default` ("cuda"): each request is a fresh page-aligned system
//!   allocation.
//! - `Pooled` ("pool"): fixed-size blocks are reserved up front and served
//!   from a free list; dropping a buffer returns its block.
//! - `Managed` ("managed"): system allocation with zero-initialized contents.
//!
//! # Invariants
//! - All buffers are aligned to [`BUFFER_ALIGN`].
//! - Allocation stats (total, outstanding, outstanding bytes) are exact under
//!   the harness's sequential-test assumption and monotone under races.
//! - `finalize` fails while any buffer is outstanding: leaking test
//!   allocations is an infrastructure defect, not a test failure.

use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Minimum alignment for buffers (one page).
pub const BUFFER_ALIGN: usize = 4096;

/// Block size served by the pooled mode.
pub const POOL_BLOCK_SIZE: usize = 64 * 1024;

/// Number of blocks the pooled mode reserves up front.
pub const POOL_BLOCK_COUNT: usize = 64;

/// Allocation mode for the whole test run.
///
/// Invalid configuration strings are not representable: the only way to build
/// a mode from text is the fallible [`FromStr`] parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocatorMode {
    /// Direct system allocation per request.
    Default,
    /// Fixed-size blocks from a pre-reserved free list.
    Pooled,
    /// System allocation, zero-initialized.
    Managed,
}

impl AllocatorMode {
    /// Configuration string this mode parses from.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "cuda",
            Self::Pooled => "pool",
            Self::Managed => "managed",
        }
    }
}

impl FromStr for AllocatorMode {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, AllocError> {
        match s {
            "cuda" => Ok(Self::Default),
            "pool" => Ok(Self::Pooled),
            "managed" => Ok(Self::Managed),
            other => Err(AllocError::UnknownMode(other.to_string())),
        }
    }
}

/// Errors from allocator configuration, allocation, and finalization.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Configuration string does not name a mode.
    #[error("unknown allocator mode {0:?} (expected \"cuda\", \"pool\", or \"managed\")")]
    UnknownMode(String),
    /// Zero-byte requests are rejected rather than given a dangling buffer.
    #[error("allocation size must be non-zero")]
    SizeZero,
    /// The size/alignment pair is not representable as a layout.
    #[error("requested layout is invalid")]
    InvalidLayout,
    /// The system allocator returned null.
    #[error("system allocator returned null")]
    OutOfMemory,
    /// Pooled mode cannot serve requests larger than its block size.
    #[error("request of {requested} bytes exceeds pool block size {block}")]
    BlockTooLarge { requested: usize, block: usize },
    /// Every reserved block is in use.
    #[error("pool exhausted: all {0} blocks are in use")]
    PoolExhausted(usize),
    /// Finalize was called while buffers are still live.
    #[error("finalize with {0} outstanding allocations")]
    OutstandingAllocations(usize),
}

/// Page-aligned raw allocation with exclusive ownership of its memory.
struct RawBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: RawBlock uniquely owns its allocation; the pointer is never shared
// or aliased, so moving the block across threads is sound, and `&RawBlock`
// exposes no mutation.
unsafe impl Send for RawBlock {}
unsafe impl Sync for RawBlock {}

impl RawBlock {
    fn allocate(size: usize, zeroed: bool) -> Result<Self, AllocError> {
        if size == 0 {
            return Err(AllocError::SizeZero);
        }
        let layout =
            Layout::from_size_align(size, BUFFER_ALIGN).map_err(|_| AllocError::InvalidLayout)?;

        // SAFETY: layout is valid and has non-zero size.
        let raw = unsafe {
            if zeroed {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory)?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        // SAFETY: ptr/layout come from the matching alloc call above.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Point-in-time allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Total allocations served since initialization.
    pub allocations: usize,
    /// Buffers currently live.
    pub outstanding: usize,
    /// Requested bytes of currently live buffers.
    pub outstanding_bytes: usize,
}

struct Inner {
    mode: AllocatorMode,
    /// Free list for `Pooled`; empty and unused for the other modes.
    free: Mutex<Vec<RawBlock>>,
    reserved: usize,
    allocations: AtomicUsize,
    outstanding: AtomicUsize,
    outstanding_bytes: AtomicUsize,
}

/// The allocator resource. Cloned handles (`Arc<DeviceAllocator>`) all refer
/// to the same pool and counters.
pub struct DeviceAllocator {
    inner: Arc<Inner>,
}

impl DeviceAllocator {
    /// Builds the resource for `mode`.
    ///
    /// `Pooled` reserves [`POOL_BLOCK_COUNT`] blocks of [`POOL_BLOCK_SIZE`]
    /// bytes immediately so allocation failures surface here, before any test
    /// case runs.
    ///
    /// # Errors
    /// Fails if the pool reservation cannot be satisfied.
    pub fn initialize(mode: AllocatorMode) -> Result<Self, AllocError> {
        let (free, reserved) = match mode {
            AllocatorMode::Pooled => {
                let mut blocks = Vec::with_capacity(POOL_BLOCK_COUNT);
                for _ in 0..POOL_BLOCK_COUNT {
                    blocks.push(RawBlock::allocate(POOL_BLOCK_SIZE, false)?);
                }
                (blocks, POOL_BLOCK_COUNT)
            }
            AllocatorMode::Default | AllocatorMode::Managed => (Vec::new(), 0),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                mode,
                free: Mutex::new(free),
                reserved,
                allocations: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
                outstanding_bytes: AtomicUsize::new(0),
            }),
        })
    }

    /// Active mode.
    pub fn mode(&self) -> AllocatorMode {
        self.inner.mode
    }

    /// Blocks currently available in the pooled free list (0 for non-pooled
    /// modes).
    pub fn available_blocks(&self) -> usize {
        self.inner.free.lock().expect("pool mutex poisoned").len()
    }

    /// Current counters.
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            allocations: self.inner.allocations.load(Ordering::Relaxed),
            outstanding: self.inner.outstanding.load(Ordering::Relaxed),
            outstanding_bytes: self.inner.outstanding_bytes.load(Ordering::Relaxed),
        }
    }

    /// Serves one buffer of `bytes` bytes.
    ///
    /// # Errors
    /// - `SizeZero` for empty requests.
    /// - `BlockTooLarge`/`PoolExhausted` in pooled mode.
    /// - `InvalidLayout`/`OutOfMemory` from the system allocator.
    pub fn allocate(&self, bytes: usize) -> Result<DeviceBuffer, AllocError> {
        if bytes == 0 {
            return Err(AllocError::SizeZero);
        }

        let block = match self.inner.mode {
            AllocatorMode::Default => RawBlock::allocate(bytes, false)?,
            AllocatorMode::Managed => RawBlock::allocate(bytes, true)?,
            AllocatorMode::Pooled => {
                if bytes > POOL_BLOCK_SIZE {
                    return Err(AllocError::BlockTooLarge {
                        requested: bytes,
                        block: POOL_BLOCK_SIZE,
                    });
                }
                self.inner
                    .free
                    .lock()
                    .expect("pool mutex poisoned")
                    .pop()
                    .ok_or(AllocError::PoolExhausted(self.inner.reserved))?
            }
        };

        self.inner.allocations.fetch_add(1, Ordering::Relaxed);
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        self.inner.outstanding_bytes.fetch_add(bytes, Ordering::Relaxed);

        Ok(DeviceBuffer {
            block: Some(block),
            len: bytes,
            owner: Arc::clone(&self.inner),
        })
    }

    /// Releases the resource.
    ///
    /// # Errors
    /// Fails with `OutstandingAllocations` if any buffer is still live; the
    /// pool is left intact in that case so the leak can be inspected.
    pub fn finalize(&self) -> Result<(), AllocError> {
        let outstanding = self.inner.outstanding.load(Ordering::Relaxed);
        if outstanding != 0 {
            return Err(AllocError::OutstandingAllocations(outstanding));
        }
        self.inner.free.lock().expect("pool mutex poisoned").clear();
        Ok(())
    }
}

/// One allocation served by the active allocator.
///
/// Contents are uninitialized except in `Managed` mode; call
/// [`Self::fill`] before reading. Dropping the buffer returns a pooled block
/// to the free list or the memory to the system, and updates counters.
pub struct DeviceBuffer {
    block: Option<RawBlock>,
    len: usize,
    owner: Arc<Inner>,
}

impl DeviceBuffer {
    /// Requested length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the buffer's memory.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        match &self.block {
            Some(block) => block.ptr.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Initializes all `len` bytes to `byte`.
    pub fn fill(&mut self, byte: u8) {
        if let Some(block) = &self.block {
            // SAFETY: the block holds at least `len` writable bytes.
            unsafe { std::ptr::write_bytes(block.ptr.as_ptr(), byte, self.len) }
        }
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };

        self.owner.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.owner
            .outstanding_bytes
            .fetch_sub(self.len, Ordering::Relaxed);

        if self.owner.mode == AllocatorMode::Pooled {
            // A poisoned pool lock leaks the block back to the system
            // (RawBlock::drop) instead of panicking during unwind.
            if let Ok(mut free) = self.owner.free.lock() {
                free.push(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings_round_trip() {
        for mode in [
            AllocatorMode::Default,
            AllocatorMode::Pooled,
            AllocatorMode::Managed,
        ] {
            assert_eq!(mode.as_str().parse::<AllocatorMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_fails_to_parse() {
        let err = "arena".parse::<AllocatorMode>().unwrap_err();
        assert!(matches!(err, AllocError::UnknownMode(s) if s == "arena"));
    }

    #[test]
    fn default_mode_tracks_stats() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Default).unwrap();
        let buf = mr.allocate(1024).unwrap();
        assert_eq!(buf.len(), 1024);
        assert_eq!(
            mr.stats(),
            AllocStats {
                allocations: 1,
                outstanding: 1,
                outstanding_bytes: 1024,
            }
        );

        drop(buf);
        let stats = mr.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.outstanding_bytes, 0);
    }

    #[test]
    fn managed_mode_zeroes_memory() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Managed).unwrap();
        let mut buf = mr.allocate(4096).unwrap();
        let ptr = buf.as_mut_ptr();
        for i in 0..4096 {
            // SAFETY: `ptr` covers 4096 initialized (zeroed) bytes.
            assert_eq!(unsafe { *ptr.add(i) }, 0);
        }
    }

    #[test]
    fn pooled_mode_reuses_blocks() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Pooled).unwrap();
        assert_eq!(mr.available_blocks(), POOL_BLOCK_COUNT);

        let buf = mr.allocate(100).unwrap();
        assert_eq!(mr.available_blocks(), POOL_BLOCK_COUNT - 1);
        drop(buf);
        assert_eq!(mr.available_blocks(), POOL_BLOCK_COUNT);
    }

    #[test]
    fn pooled_mode_rejects_oversized_and_exhausted() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Pooled).unwrap();
        assert!(matches!(
            mr.allocate(POOL_BLOCK_SIZE + 1),
            Err(AllocError::BlockTooLarge { .. })
        ));

        let held: Vec<_> = (0..POOL_BLOCK_COUNT)
            .map(|_| mr.allocate(1).unwrap())
            .collect();
        assert!(matches!(
            mr.allocate(1),
            Err(AllocError::PoolExhausted(n)) if n == POOL_BLOCK_COUNT
        ));
        drop(held);
        assert_eq!(mr.available_blocks(), POOL_BLOCK_COUNT);
    }

    #[test]
    fn zero_byte_requests_are_rejected() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Default).unwrap();
        assert!(matches!(mr.allocate(0), Err(AllocError::SizeZero)));
    }

    #[test]
    fn finalize_detects_leaks() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Pooled).unwrap();
        let buf = mr.allocate(8).unwrap();
        assert!(matches!(
            mr.finalize(),
            Err(AllocError::OutstandingAllocations(1))
        ));

        drop(buf);
        mr.finalize().unwrap();
        assert_eq!(mr.available_blocks(), 0);
    }

    #[test]
    fn buffers_outlive_fill() {
        let mr = DeviceAllocator::initialize(AllocatorMode::Default).unwrap();
        let mut buf = mr.allocate(64).unwrap();
        buf.fill(0xA5);
        let ptr = buf.as_mut_ptr();
        // SAFETY: all 64 bytes were just initialized by `fill`.
        assert_eq!(unsafe { *ptr.add(63) }, 0xA5);
    }
}
