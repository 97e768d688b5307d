//! Threads, Endpoints and the Thread Table
//!
//! Every thread that takes part in LPC has:
//! - An [`Endpoint`] (its thread id) that other threads address messages to
//! - Exactly one [`MessageQueue`], created with the thread and destroyed with it
//! - A [`Waiter`] through which it can be woken or interrupted
//! - An [`AddressSpace`] that message bodies are copied in from and out to
//!
//! ## Lookup
//!
//! LPC resolves destinations through the [`ThreadDirectory`] capability
//! rather than a global singleton. [`ThreadTable`] is the directory used by
//! the kernel: it owns the coarse thread-table lock, which is only ever held
//! for the duration of a lookup and never across a sleep.
//!
//! ## Thread Lifecycle
//!
//! ```text
//! spawn ──► init_queue ──► (send / recv ...) ──► exit ──► remove ──► destroy_queue
//! ```
//!
//! `exit` unpublishes the thread before tearing its queue down, so a lookup
//! racing with teardown either misses the thread or finds a queue that is
//! marked destroyed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::FIRST_TID;
use crate::error::LpcError;
use crate::ipc::queue::{destroy_queue, init_queue, MessageQueue};
use crate::sync::{lock, Sleeper, Waiter};
use crate::vm::AddressSpace;
use crate::Result;

/// Addressable identity of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint(u32);

impl Endpoint {
    /// Create an endpoint from a thread id
    #[inline]
    pub const fn new(tid: u32) -> Self {
        Self(tid)
    }

    /// Thread id behind this endpoint
    #[inline]
    pub const fn tid(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which pending messages a receive may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    /// Accept a message from any sender
    Any,
    /// Accept only messages sent by this endpoint
    Endpoint(Endpoint),
}

impl SourceFilter {
    /// Whether a message from `sender` passes this filter
    #[inline]
    pub fn matches(&self, sender: Endpoint) -> bool {
        match self {
            SourceFilter::Any => true,
            SourceFilter::Endpoint(ep) => *ep == sender,
        }
    }
}

impl From<Endpoint> for SourceFilter {
    fn from(ep: Endpoint) -> Self {
        SourceFilter::Endpoint(ep)
    }
}

/// Kernel-side state of a thread shared with other threads
pub struct ThreadControl {
    /// Endpoint other threads use to reach this thread
    endpoint: Endpoint,

    /// Incoming message queue
    queue: Arc<MessageQueue>,

    /// Wakeup slot, used for event delivery
    waiter: Arc<Waiter>,

    /// User address space of the thread
    address_space: Arc<dyn AddressSpace>,
}

impl ThreadControl {
    #[inline]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    #[inline]
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    #[inline]
    pub fn waiter(&self) -> &Arc<Waiter> {
        &self.waiter
    }

    #[inline]
    pub fn address_space(&self) -> &Arc<dyn AddressSpace> {
        &self.address_space
    }
}

impl fmt::Debug for ThreadControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadControl")
            .field("endpoint", &self.endpoint)
            .field("queue", &self.queue)
            .finish()
    }
}

/// The calling thread's view of itself
///
/// Owned by the OS thread that runs it: the [`Sleeper`] inside can only park
/// the thread that holds it. Every LPC operation takes the current thread
/// explicitly.
pub struct Thread {
    control: Arc<ThreadControl>,
    sleeper: Sleeper,
}

impl Thread {
    /// Endpoint of this thread
    #[inline]
    pub fn endpoint(&self) -> Endpoint {
        self.control.endpoint
    }

    /// This thread's own message queue
    #[inline]
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.control.queue
    }

    /// This thread's user address space
    #[inline]
    pub fn address_space(&self) -> &dyn AddressSpace {
        self.control.address_space.as_ref()
    }

    /// Sleeping context of this thread
    #[inline]
    pub fn sleeper(&self) -> &Sleeper {
        &self.sleeper
    }

    /// Shared kernel-side state of this thread
    #[inline]
    pub fn control(&self) -> &Arc<ThreadControl> {
        &self.control
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("endpoint", &self.control.endpoint)
            .finish()
    }
}

/// Destination lookup capability used by LPC
pub trait ThreadDirectory: Send + Sync {
    /// Resolve `endpoint` to its message queue
    ///
    /// # Errors
    ///
    /// `NotFound` if the endpoint does not name a live thread.
    fn lookup(&self, endpoint: Endpoint) -> Result<Arc<MessageQueue>>;

    /// Whether `endpoint` still names a live thread
    fn is_alive(&self, endpoint: Endpoint) -> bool;
}

/// Table of live threads, keyed by endpoint
pub struct ThreadTable {
    /// Global thread-table lock
    threads: Mutex<HashMap<Endpoint, Arc<ThreadControl>>>,

    /// Next thread id to hand out
    next_tid: AtomicU32,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            next_tid: AtomicU32::new(FIRST_TID),
        }
    }

    /// Create a thread running in `address_space`
    ///
    /// The thread's message queue is initialized before the thread becomes
    /// visible to lookups.
    pub fn spawn(&self, address_space: Arc<dyn AddressSpace>) -> Thread {
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        let endpoint = Endpoint::new(tid);
        let sleeper = Sleeper::new(tid);

        let control = Arc::new(ThreadControl {
            endpoint,
            queue: init_queue(endpoint),
            waiter: Arc::clone(sleeper.waiter()),
            address_space,
        });

        lock(&self.threads).insert(endpoint, Arc::clone(&control));
        log::debug!("thread {}: created", endpoint);

        Thread { control, sleeper }
    }

    /// Tear down thread `endpoint`
    ///
    /// Removes the thread from the table, then destroys its message queue:
    /// pending messages are freed and every thread blocked on the queue is
    /// woken with `Destroyed`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the thread already exited or never existed.
    pub fn exit(&self, endpoint: Endpoint) -> Result<()> {
        let control = lock(&self.threads)
            .remove(&endpoint)
            .ok_or(LpcError::NotFound { endpoint })?;

        destroy_queue(&control.queue);
        log::debug!("thread {}: exited", endpoint);
        Ok(())
    }

    /// Deliver an asynchronous event to thread `endpoint`
    ///
    /// A blocked LPC call of that thread returns `Interrupted`. If the thread
    /// is not blocked, the event interrupts its next sleep.
    pub fn deliver_event(&self, endpoint: Endpoint) -> Result<()> {
        let control = self.get(endpoint).ok_or(LpcError::NotFound { endpoint })?;
        log::trace!("thread {}: event delivered", endpoint);
        control.waiter.deliver_event();
        Ok(())
    }

    /// Shared state of thread `endpoint`, if alive
    pub fn get(&self, endpoint: Endpoint) -> Option<Arc<ThreadControl>> {
        lock(&self.threads).get(&endpoint).cloned()
    }

    /// Number of live threads
    pub fn len(&self) -> usize {
        lock(&self.threads).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ThreadDirectory for ThreadTable {
    fn lookup(&self, endpoint: Endpoint) -> Result<Arc<MessageQueue>> {
        lock(&self.threads)
            .get(&endpoint)
            .map(|control| Arc::clone(&control.queue))
            .ok_or(LpcError::NotFound { endpoint })
    }

    fn is_alive(&self, endpoint: Endpoint) -> bool {
        lock(&self.threads).contains_key(&endpoint)
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadTable")
            .field("threads", &self.len())
            .field("next_tid", &self.next_tid.load(Ordering::Relaxed))
            .finish()
    }
}
