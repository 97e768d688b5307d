//! LPC error taxonomy
//!
//! Every failure of `send`, `recv` and `send_and_reply` is recovered into one
//! of these variants and handed back to the caller. The only condition that is
//! not reported this way is an internal-consistency defect (see
//! `strict-liveness`), which panics.
//!
//! ## Status Codes
//!
//! The system-call surface reports results as negative errno values. The
//! mapping follows the kernel's conventions: an expired bounded wait reports
//! `-EAGAIN` just like a non-blocking call that had nothing to do.

use thiserror::Error;

use crate::thread::Endpoint;
use crate::vm::UserAddr;

/// No such entity
pub const ENOENT: i32 = 2;
/// Interrupted by event delivery
pub const EINTR: i32 = 4;
/// Try again
pub const EAGAIN: i32 = 11;
/// Out of memory
pub const ENOMEM: i32 = 12;
/// Bad address
pub const EFAULT: i32 = 14;
/// Invalid argument
pub const EINVAL: i32 = 22;
/// Function not implemented
pub const ENOSYS: i32 = 38;

/// Error types for LPC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LpcError {
    /// A non-blocking call found no counterpart
    #[error("Operation would block")]
    WouldBlock,

    /// A bounded wait expired
    #[error("Timed out waiting for peer")]
    TimedOut,

    /// The destination thread or its queue was destroyed during the operation
    #[error("Destination is gone")]
    DestinationGone,

    /// An event was delivered to the thread while it was blocked
    #[error("Interrupted by event delivery")]
    Interrupted,

    /// The destination endpoint does not name a live thread
    #[error("No such endpoint: {endpoint}")]
    NotFound { endpoint: Endpoint },

    /// A caller-provided address is not mapped
    #[error("Bad user address: {addr}")]
    Fault { addr: UserAddr },

    /// Message allocation failed
    #[error("Out of message memory")]
    OutOfMemory,
}

impl LpcError {
    /// Negative errno reported through the system-call surface
    pub fn errno(&self) -> i32 {
        match self {
            LpcError::WouldBlock | LpcError::TimedOut => -EAGAIN,
            LpcError::DestinationGone | LpcError::NotFound { .. } => -ENOENT,
            LpcError::Interrupted => -EINTR,
            LpcError::Fault { .. } => -EFAULT,
            LpcError::OutOfMemory => -ENOMEM,
        }
    }
}

/// Collapse an operation result into a kernel status code (`0` on success)
pub fn status<T>(result: &crate::Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.errno(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(LpcError::WouldBlock.errno(), -EAGAIN);
        assert_eq!(LpcError::TimedOut.errno(), -EAGAIN);
        assert_eq!(LpcError::DestinationGone.errno(), -ENOENT);
        assert_eq!(LpcError::NotFound { endpoint: Endpoint::new(7) }.errno(), -ENOENT);
        assert_eq!(LpcError::Interrupted.errno(), -EINTR);
        assert_eq!(LpcError::Fault { addr: UserAddr::new(0x10) }.errno(), -EFAULT);
        assert_eq!(LpcError::OutOfMemory.errno(), -ENOMEM);
    }

    #[test]
    fn test_status_of_result() {
        let ok: crate::Result<()> = Ok(());
        assert_eq!(status(&ok), 0);

        let err: crate::Result<()> = Err(LpcError::Interrupted);
        assert_eq!(status(&err), -EINTR);
    }

    #[test]
    fn test_error_display() {
        let e = LpcError::NotFound { endpoint: Endpoint::new(42) };
        assert_eq!(e.to_string(), "No such endpoint: 42");

        let e = LpcError::Fault { addr: UserAddr::new(0x1000) };
        assert_eq!(e.to_string(), "Bad user address: 0x1000");
    }
}
