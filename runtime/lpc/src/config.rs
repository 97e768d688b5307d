//! LPC configuration
//!
//! Compile-time parameters of the message format and thread numbering, plus
//! the runtime configuration used to build an [`Lpc`](crate::Lpc) instance.
//!
//! Cargo features:
//! - `strict-liveness`: a destination that disappears during a bounded send
//!   without waking the sender with `destroyed` panics instead of reporting
//!   [`LpcError::DestinationGone`](crate::LpcError::DestinationGone).

use static_assertions::const_assert;

/// Size of a message body in bytes
///
/// Every message carries exactly this many bytes; the layer never looks
/// inside them.
pub const MSG_BODY_SIZE: usize = 64;

/// Number of 64-bit words in a message body
pub const MSG_BODY_WORDS: usize = MSG_BODY_SIZE / 8;

/// First thread id handed out by the thread table
///
/// Id 0 is reserved as the `RECV_ANY` wildcard on the system-call surface.
pub const FIRST_TID: u32 = 1;

/// Default limit on simultaneously live messages
pub const DEFAULT_MESSAGE_LIMIT: usize = 1024;

const_assert!(MSG_BODY_SIZE > 0);
const_assert!(MSG_BODY_SIZE % 8 == 0);
const_assert!(FIRST_TID > 0);

/// Runtime configuration for an LPC instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpcConfig {
    /// Maximum number of messages alive at once (`None` = unlimited)
    pub message_limit: Option<usize>,
}

impl LpcConfig {
    /// Configuration with no limit on live messages
    pub const fn unlimited() -> Self {
        Self { message_limit: None }
    }

    /// Configuration with an explicit message limit
    pub const fn with_message_limit(limit: usize) -> Self {
        Self {
            message_limit: Some(limit),
        }
    }

    /// Whether liveness violations are fatal in this build
    #[inline]
    pub const fn strict_liveness() -> bool {
        cfg!(feature = "strict-liveness")
    }
}

impl Default for LpcConfig {
    fn default() -> Self {
        Self::with_message_limit(DEFAULT_MESSAGE_LIMIT)
    }
}
