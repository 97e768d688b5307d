//! LPC Message Structure
//!
//! A [`Message`] is the heap envelope that carries one body from a sender to a
//! receiver. It holds:
//! - A private copy of the caller's fixed-size body
//! - The sender's endpoint, captured when the message is allocated
//! - A [`Completion`] the sender sleeps on until the receiver has copied the
//!   body out (or the message is destroyed)
//!
//! ## Ownership
//!
//! ```text
//! send: allocate ──► PUBLISH ──► queue.pending ──► TRY_DEQUEUE ──► recv
//!       (sender owns)            (queue owns)                    (receiver owns)
//! ```
//!
//! A message is a `Box` and therefore sits in at most one queue at a time.
//! Whoever owns it when an operation ends drops it. Dropping a message always
//! broadcasts `Destroyed` on its completion, so a sender can never be left
//! asleep on a message that no longer exists.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::{MSG_BODY_SIZE, MSG_BODY_WORDS};
use crate::error::LpcError;
use crate::heap::{MessageAllocator, MessageLease};
use crate::sync::{lock, Sleeper, WaitQueue, WakeReason};
use crate::thread::Endpoint;
use crate::Result;

/// Fixed-size message body
///
/// Opaque to the LPC layer; helpers view it as bytes or as 64-bit words.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MessageBody([u8; MSG_BODY_SIZE]);

impl MessageBody {
    /// Create a zeroed body
    pub const fn new() -> Self {
        Self([0; MSG_BODY_SIZE])
    }

    /// Create a body from the leading bytes of `bytes`, zero-padded
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut body = Self::new();
        let len = bytes.len().min(MSG_BODY_SIZE);
        body.0[..len].copy_from_slice(&bytes[..len]);
        body
    }

    /// Create a body from 64-bit words (little endian)
    pub fn with_words(words: &[u64]) -> Self {
        let mut body = Self::new();
        for (i, w) in words.iter().take(MSG_BODY_WORDS).enumerate() {
            body.set_word(i, *w);
        }
        body
    }

    /// Body as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Body as mutable bytes
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Read word `index` (little endian)
    pub fn word(&self, index: usize) -> Option<u64> {
        let start = index.checked_mul(8)?;
        let chunk = self.0.get(start..start + 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        Some(u64::from_le_bytes(raw))
    }

    /// Write word `index` (little endian)
    ///
    /// Returns `false` if `index` is outside the body.
    pub fn set_word(&mut self, index: usize, value: u64) -> bool {
        match index.checked_mul(8).and_then(|s| self.0.get_mut(s..s + 8)) {
            Some(chunk) => {
                chunk.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries((0..MSG_BODY_WORDS).filter_map(|i| self.word(i)))
            .finish()
    }
}

/// Completion handshake of one message
///
/// The lock guards a latched outcome: the first signal records it and wakes
/// the sender, and a sender that arrives after the signal sees the outcome
/// without sleeping. Later signals are ignored.
pub struct Completion {
    /// `completion_lock` plus the latched outcome
    outcome: Mutex<Option<WakeReason>>,

    /// Senders sleeping until the outcome is known
    waiters: WaitQueue,
}

impl Completion {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            waiters: WaitQueue::new(),
        }
    }

    /// Record `reason` as the outcome and wake the sender
    ///
    /// Returns `false` if an outcome was already recorded.
    pub fn signal(&self, reason: WakeReason) -> bool {
        let mut outcome = lock(&self.outcome);
        if outcome.is_some() {
            return false;
        }
        *outcome = Some(reason);
        self.waiters.wake_all(reason);
        true
    }

    /// Sleep until an outcome is recorded or an event interrupts the sleep
    ///
    /// Returns the recorded outcome, or `Interrupted`.
    pub fn wait(&self, sleeper: &Sleeper) -> WakeReason {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(reason) = *outcome {
                return reason;
            }

            let (guard, reason) = self.waiters.wait(&self.outcome, outcome, sleeper, None);
            if reason == WakeReason::Interrupted {
                return reason;
            }
            outcome = guard;
        }
    }

    /// Outcome recorded so far
    pub fn outcome(&self) -> Option<WakeReason> {
        *lock(&self.outcome)
    }

    /// Whether a sender is currently sleeping on this completion
    #[inline]
    pub fn has_waiters(&self) -> bool {
        self.waiters.has_waiters()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.outcome())
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

/// One in-flight LPC message
pub struct Message {
    /// Copy of the sender's body
    body: MessageBody,

    /// Endpoint of the sending thread
    sender: Endpoint,

    /// Handshake the sender waits on; shared with the sender so it outlives
    /// the message itself
    completion: Arc<Completion>,

    /// Memory backing this message, returned to the allocator on drop
    _lease: MessageLease,
}

impl Message {
    /// Allocate a message on behalf of `sender`
    ///
    /// The body is zeroed, the message is not linked into any queue and its
    /// completion has no outcome.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the allocator refuses; nothing is allocated then.
    pub fn allocate(sender: Endpoint, allocator: &Arc<dyn MessageAllocator>) -> Result<Box<Self>> {
        let lease = MessageLease::acquire(allocator).ok_or(LpcError::OutOfMemory)?;

        Ok(Box::new(Self {
            body: MessageBody::new(),
            sender,
            completion: Arc::new(Completion::new()),
            _lease: lease,
        }))
    }

    /// Endpoint of the sending thread
    #[inline]
    pub fn sender(&self) -> Endpoint {
        self.sender
    }

    /// Message body
    #[inline]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Mutable message body
    #[inline]
    pub fn body_mut(&mut self) -> &mut MessageBody {
        &mut self.body
    }

    /// Completion handshake of this message
    #[inline]
    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        // No-op if the receiver already released the sender
        self.completion.signal(WakeReason::Destroyed);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sender", &self.sender)
            .field("body", &self.body)
            .field("completion", &self.completion)
            .finish()
    }
}
