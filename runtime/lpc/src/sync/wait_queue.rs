//! Wait-queue with inspectable waiter set
//!
//! A [`WaitQueue`] is a condition-variable-like object that records *who* is
//! sleeping on it. The waiter set can be inspected without side effects, which
//! the rendezvous protocol uses as its readiness signal: a receiver parked on a
//! queue is live proof that a receiver is waiting.
//!
//! ## Sleeping
//!
//! ```text
//! caller holds guard ──► enqueue waiter ──► release guard ──► park
//!                                                              │
//!            wake(reason) sets the waiter's reason + unpark ◄──┘
//!                                                              │
//! return (guard, reason) ◄── resolve reason ◄── re-acquire guard
//! ```
//!
//! The waiter is placed on the queue *before* the guarding lock is dropped and
//! the wake reason is latched inside the waiter, so a wakeup arriving between
//! "release guard" and "park" is never lost.
//!
//! ## Wake Reasons
//!
//! The first reason recorded for a sleep wins. A waker that finds the reason
//! already set (for example by event delivery) leaves it untouched. A sleeper
//! whose deadline expires removes itself from the queue; if a waker popped it
//! first, the waker's reason is reported instead of `TimedOut`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crossbeam::atomic::AtomicCell;
use crossbeam::sync::{Parker, Unparker};

use super::{lock, WakeReason};

/// Wakeup slot of one thread
///
/// Shared between the sleeping thread, the queues it parks on, and anyone
/// that may deliver an event to it.
pub struct Waiter {
    /// Thread id of the owner (diagnostics only)
    owner: u32,

    /// Reason of the current sleep, latched by the first waker
    reason: AtomicCell<Option<WakeReason>>,

    /// Event delivered while the owner was not sleeping
    event_pending: AtomicBool,

    /// Handle used to wake the owner's parker
    unparker: Unparker,
}

impl Waiter {
    fn new(owner: u32, unparker: Unparker) -> Self {
        Self {
            owner,
            reason: AtomicCell::new(None),
            event_pending: AtomicBool::new(false),
            unparker,
        }
    }

    /// Thread id of the owning thread
    #[inline]
    pub fn owner(&self) -> u32 {
        self.owner
    }

    /// Record `reason` and unpark the owner, unless a reason is already set
    ///
    /// Returns `true` if this call decided the outcome of the sleep.
    pub fn wake(&self, reason: WakeReason) -> bool {
        if self.reason.compare_exchange(None, Some(reason)).is_ok() {
            self.unparker.unpark();
            true
        } else {
            false
        }
    }

    /// Deliver an asynchronous event to the owner
    ///
    /// Interrupts the current sleep if there is one; otherwise the event stays
    /// pending and interrupts the next sleep.
    pub fn deliver_event(&self) {
        self.event_pending.store(true, Ordering::SeqCst);
        self.wake(WakeReason::Interrupted);
    }

    /// Whether an event is waiting to interrupt the next sleep
    #[inline]
    pub fn has_pending_event(&self) -> bool {
        self.event_pending.load(Ordering::SeqCst)
    }

    /// Reset the slot for a new sleep
    ///
    /// Returns `Some(Interrupted)` if a pending event must abort the sleep
    /// before it starts.
    fn arm(&self) -> Option<WakeReason> {
        self.reason.store(None);
        if self.event_pending.swap(false, Ordering::SeqCst) {
            Some(WakeReason::Interrupted)
        } else {
            None
        }
    }

    #[inline]
    fn is_woken(&self) -> bool {
        self.reason.load().is_some()
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("owner", &self.owner)
            .field("reason", &self.reason.load())
            .field("event_pending", &self.has_pending_event())
            .finish()
    }
}

/// The sleeping half of a thread: its parker plus its shared [`Waiter`]
///
/// A `Sleeper` belongs to exactly one OS thread (the parker is not `Sync`);
/// the `Waiter` is handed out to whoever needs to wake that thread.
pub struct Sleeper {
    waiter: Arc<Waiter>,
    parker: Parker,
}

impl Sleeper {
    /// Create the sleeping context of thread `owner`
    pub fn new(owner: u32) -> Self {
        let parker = Parker::new();
        let waiter = Arc::new(Waiter::new(owner, parker.unparker().clone()));
        Self { waiter, parker }
    }

    /// Shared wakeup slot of this thread
    #[inline]
    pub fn waiter(&self) -> &Arc<Waiter> {
        &self.waiter
    }

    /// Park until a reason is latched or `deadline` passes
    fn park(&self, deadline: Option<Instant>) {
        // Parker tokens may be left over from earlier wakeups, so every
        // return from park is re-checked against the latched reason.
        while !self.waiter.is_woken() {
            match deadline {
                None => self.parker.park(),
                Some(at) => {
                    if Instant::now() >= at {
                        return;
                    }
                    self.parker.park_deadline(at);
                }
            }
        }
    }
}

impl fmt::Debug for Sleeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleeper").field("waiter", &self.waiter).finish()
    }
}

/// FIFO queue of sleeping threads
pub struct WaitQueue {
    waiters: spin::Mutex<VecDeque<Arc<Waiter>>>,
}

impl WaitQueue {
    /// Create an empty wait-queue
    pub fn new() -> Self {
        Self {
            waiters: spin::Mutex::new(VecDeque::new()),
        }
    }

    /// Whether at least one thread is sleeping on this queue
    ///
    /// Pure inspection: no waiter is woken or removed.
    #[inline]
    pub fn has_waiters(&self) -> bool {
        !self.waiters.lock().is_empty()
    }

    /// Number of threads sleeping on this queue
    #[inline]
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether no thread is sleeping on this queue
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_waiters()
    }

    /// Sleep on this queue, releasing `guard` for the duration
    ///
    /// # Arguments
    ///
    /// * `mutex` - The lock `guard` was taken from
    /// * `guard` - Guard over the caller's condition; released while asleep
    /// * `sleeper` - Sleeping context of the calling thread
    /// * `deadline` - Latest wakeup time (`None` = sleep until woken)
    ///
    /// # Returns
    ///
    /// The re-acquired guard and the reason the sleep ended.
    pub fn wait<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        sleeper: &Sleeper,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, T>, WakeReason) {
        let waiter = sleeper.waiter();

        if let Some(reason) = waiter.arm() {
            return (guard, reason);
        }

        // Become visible on the queue while the condition is still locked
        self.waiters.lock().push_back(Arc::clone(waiter));
        drop(guard);

        sleeper.park(deadline);

        let guard = lock(mutex);
        let reason = self.resolve(waiter);
        if reason == WakeReason::Interrupted {
            waiter.event_pending.store(false, Ordering::SeqCst);
        }
        (guard, reason)
    }

    /// Take `waiter` off the queue (if still there) and settle its reason
    fn resolve(&self, waiter: &Arc<Waiter>) -> WakeReason {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            waiters.remove(pos);
        }

        // Wakers set the reason while holding the list lock, so a waiter that
        // is no longer listed always has its reason recorded already.
        match waiter.reason.compare_exchange(None, Some(WakeReason::TimedOut)) {
            Ok(_) => WakeReason::TimedOut,
            Err(reason) => reason.unwrap_or(WakeReason::TimedOut),
        }
    }

    /// Wake the longest-sleeping waiter with `reason`
    ///
    /// Returns `true` if a waiter was woken.
    pub fn wake_one(&self, reason: WakeReason) -> bool {
        let mut waiters = self.waiters.lock();
        while let Some(waiter) = waiters.pop_front() {
            if waiter.wake(reason) {
                return true;
            }
        }
        false
    }

    /// Wake every waiter with `reason`
    ///
    /// Returns the number of waiters whose sleep this call ended.
    pub fn wake_all(&self, reason: WakeReason) -> usize {
        let mut waiters = self.waiters.lock();
        let mut woken = 0;
        while let Some(waiter) = waiters.pop_front() {
            if waiter.wake(reason) {
                woken += 1;
            }
        }
        woken
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue").field("waiters", &self.len()).finish()
    }
}
