//! Message memory accounting
//!
//! Messages are fixed-size objects obtained from a [`MessageAllocator`].
//! Allocation can fail, in which case `send` reports `OutOfMemory` before it
//! touches any queue. Every successful allocation is represented by a
//! [`MessageLease`]; dropping the lease returns the slot to its allocator, so
//! a message can never be freed twice or forgotten.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::LpcConfig;

/// Fixed-size allocator for message objects
pub trait MessageAllocator: Send + Sync {
    /// Reserve one message slot; `false` means out of memory
    fn try_reserve(&self) -> bool;

    /// Return one previously reserved slot
    fn release(&self);
}

/// Proof of one reserved message slot
///
/// Released back to the allocator on drop.
pub struct MessageLease {
    allocator: Arc<dyn MessageAllocator>,
}

impl MessageLease {
    /// Reserve a slot from `allocator`
    ///
    /// Returns `None` if the allocator is exhausted.
    pub fn acquire(allocator: &Arc<dyn MessageAllocator>) -> Option<Self> {
        if allocator.try_reserve() {
            Some(Self {
                allocator: Arc::clone(allocator),
            })
        } else {
            None
        }
    }
}

impl Drop for MessageLease {
    fn drop(&mut self) {
        self.allocator.release();
    }
}

impl fmt::Debug for MessageLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageLease")
    }
}

/// Counting message allocator with an optional limit
pub struct MessagePool {
    /// Maximum live messages (`None` = unlimited)
    limit: Option<usize>,
    /// Messages currently alive
    in_use: AtomicUsize,
    /// Messages ever allocated
    allocated: AtomicUsize,
    /// Allocation attempts refused
    failed: AtomicUsize,
}

impl MessagePool {
    /// Create a pool with the given limit on live messages
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            in_use: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Create a pool sized from an LPC configuration
    pub fn from_config(config: &LpcConfig) -> Self {
        Self::new(config.message_limit)
    }

    /// Messages currently alive
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Total successful allocations
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Total refused allocations
    #[inline]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Configured limit on live messages
    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl MessageAllocator for MessagePool {
    fn try_reserve(&self) -> bool {
        let limit = self.limit.unwrap_or(usize::MAX);
        let reserved = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok();

        if reserved {
            self.allocated.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        reserved
    }

    fn release(&self) {
        let previous = self.in_use.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "message pool released more than reserved");
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::from_config(&LpcConfig::default())
    }
}

impl fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePool")
            .field("limit", &self.limit)
            .field("in_use", &self.in_use())
            .field("allocated", &self.allocated())
            .field("failed", &self.failed())
            .finish()
    }
}
