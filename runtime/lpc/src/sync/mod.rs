//! Sleep/wakeup primitives
//!
//! LPC is built on a single primitive: a wait-queue whose `wait` takes the
//! lock guarding the caller's condition and atomically releases it for the
//! duration of the sleep, re-acquiring it before returning. Wakeups carry a
//! [`WakeReason`] that tells the sleeper why it was woken.
//!
//! ## Lock Ordering
//!
//! - Queue, completion and thread-table locks are `std::sync::Mutex` and may be
//!   held across a user-memory copy.
//! - The waiter list inside a [`WaitQueue`] is a `spin::Mutex` held only for a
//!   handful of instructions; it is always the innermost lock and no sleep
//!   ever happens while it is held.

pub mod wait_queue;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use wait_queue::{Sleeper, WaitQueue, Waiter};

/// Why a sleeping thread was woken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// Normal release by the counterpart
    Released,
    /// The deadline of a bounded sleep expired
    TimedOut,
    /// The object being waited on was destroyed
    Destroyed,
    /// An event was delivered to the sleeping thread
    Interrupted,
}

/// Acquire a kernel lock, tolerating poisoning
///
/// Critical sections in this crate never leave shared state half-updated
/// across a panic point, so a poisoned lock still guards consistent data.
#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
