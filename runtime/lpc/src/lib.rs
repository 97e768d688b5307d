//! LPC - Local Process Communication
//!
//! # Purpose
//! Synchronous, rendezvous-based message passing between kernel threads.
//! A thread sends a fixed-size body to another thread's endpoint and stays
//! blocked until a receiver has taken the message and copied it into its own
//! address space. `send_and_reply` builds request/response on top.
//!
//! # Integration Points
//! - Depends on: thread lookup ([`ThreadDirectory`]), message allocation
//!   ([`MessageAllocator`]), user memory ([`AddressSpace`])
//! - Provides to: the system-call layer ([`syscall::dispatch`]) and thread
//!   lifecycle ([`init_queue`], [`destroy_queue`])
//!
//! # Architecture
//! Each thread owns one [`MessageQueue`]. Readiness is never a flag: a
//! receiver with nothing to take parks itself on the queue's `receiver_ready`
//! wait-queue, and a sender holding the queue lock reads that wait-queue's
//! waiter set as proof that a receiver is waiting. Every blocking step
//! releases and re-acquires its lock atomically through [`WaitQueue::wait`].
//!
//! # Testing Strategy
//! - Unit tests: each module, beside the code
//! - Integration tests: multi-threaded rendezvous scenarios in `tests/`
//! - Benchmarks: send/receive round trip in `benches/`

pub mod config;
pub mod error;
pub mod heap;
pub mod ipc;
pub mod sync;
pub mod syscall;
pub mod thread;
pub mod timer;
pub mod vm;

pub use config::{LpcConfig, DEFAULT_MESSAGE_LIMIT, FIRST_TID, MSG_BODY_SIZE, MSG_BODY_WORDS};
pub use error::LpcError;
pub use heap::{MessageAllocator, MessagePool};
pub use ipc::{destroy_queue, init_queue, Lpc, MessageBody, MessageQueue};
pub use sync::{Sleeper, WaitQueue, WakeReason};
pub use thread::{Endpoint, SourceFilter, Thread, ThreadDirectory, ThreadTable};
pub use timer::Timeout;
pub use vm::{AddressSpace, UserAddr, UserMemory};

/// Result type for LPC operations
pub type Result<T> = core::result::Result<T, LpcError>;
