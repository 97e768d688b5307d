//! Local Process Communication (LPC)
//!
//! Synchronous message passing between threads in different address spaces.
//!
//! ## LPC Model
//!
//! **Synchronous Rendezvous**:
//! - A send only completes once a receiver has taken the message and copied
//!   its body out, never when it is merely queued
//! - A sender with no parked receiver blocks (or fails, when non-blocking)
//! - Every thread has exactly one incoming queue
//!
//! **Operations**:
//! - `send()`: deliver one body to a destination thread
//! - `recv()`: take one body from the caller's own queue, optionally filtered
//!   by sender
//! - `send_and_reply()`: `send()` followed by `recv()` from the same peer,
//!   reusing the caller's buffer for the reply
//!
//! ## Usage
//!
//! ```rust,ignore
//! let lpc = Lpc::new(table.clone(), pool.clone());
//!
//! // Server
//! let client = lpc.recv(&server, SourceFilter::Any, Timeout::Infinite, buf, None)?;
//! lpc.send(&server, client, Timeout::Infinite, buf)?;
//!
//! // Client
//! lpc.send_and_reply(&client, server_ep, buf)?;
//! ```

pub mod call;
pub mod message;
pub mod operations;
pub mod queue;

use std::fmt;
use std::sync::Arc;

use crate::config::LpcConfig;
use crate::heap::{MessageAllocator, MessagePool};
use crate::thread::ThreadDirectory;

pub use message::{Completion, Message, MessageBody};
pub use queue::{destroy_queue, init_queue, MessageQueue};

/// LPC service bound to its collaborators
///
/// Holds the destination lookup capability and the message allocator. All
/// per-thread state lives in the threads and their queues, so one `Lpc` is
/// shared by every thread of the system.
#[derive(Clone)]
pub struct Lpc {
    /// Resolves endpoints to message queues
    directory: Arc<dyn ThreadDirectory>,

    /// Allocates message objects
    allocator: Arc<dyn MessageAllocator>,
}

impl Lpc {
    /// Create an LPC service
    ///
    /// # Arguments
    ///
    /// * `directory` - Thread lookup used to resolve destinations
    /// * `allocator` - Source of message objects
    pub fn new(directory: Arc<dyn ThreadDirectory>, allocator: Arc<dyn MessageAllocator>) -> Self {
        Self {
            directory,
            allocator,
        }
    }

    /// Create an LPC service with a message pool sized from `config`
    ///
    /// Returns the pool alongside so callers can observe message accounting.
    pub fn with_config(
        directory: Arc<dyn ThreadDirectory>,
        config: &LpcConfig,
    ) -> (Self, Arc<MessagePool>) {
        let pool = Arc::new(MessagePool::from_config(config));
        let allocator: Arc<dyn MessageAllocator> = pool.clone();
        (Self::new(directory, allocator), pool)
    }

    #[inline]
    pub(crate) fn directory(&self) -> &dyn ThreadDirectory {
        self.directory.as_ref()
    }

    #[inline]
    pub(crate) fn allocator(&self) -> &Arc<dyn MessageAllocator> {
        &self.allocator
    }
}

impl fmt::Debug for Lpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lpc").finish_non_exhaustive()
    }
}
