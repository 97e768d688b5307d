//! LPC Operations - Send and Receive
//!
//! ## Send
//!
//! ```text
//! LOOKUP ──► allocate ──► WAIT_FOR_RECEIVER ──► PUBLISH ──► WAIT_FOR_COMPLETION
//!   │            │               │                  │              │
//! NotFound   OutOfMemory   WouldBlock/TimedOut    Fault     Released: Ok
//!                          DestinationGone                  Destroyed: DestinationGone
//!                          Interrupted                      Interrupted
//! ```
//!
//! The sender holds the destination queue lock from the readiness check up
//! to and including the publish. It drops the queue lock before waiting for
//! completion, so the receiver can signal completion without it.
//!
//! ## Receive
//!
//! ```text
//! ┌──► ANNOUNCE ──► TRY_DEQUEUE ──found──► COPY_OUT ──► signal Released
//! │                     │
//! │                  nothing
//! │                     ▼
//! └──── Released ◄── WAIT (WouldBlock / TimedOut / Interrupted / DestinationGone)
//! ```
//!
//! The receiver holds its own queue lock throughout, except while asleep.
//! Completion is signalled whether or not the copy-out faulted.
//!
//! ## Message Ownership
//!
//! A message belongs to the sender until PUBLISH, to the queue until
//! TRY_DEQUEUE, and to the receiver afterwards. Every early return drops the
//! message the returning side owns.

use std::sync::Arc;

use log::{trace, warn};

use super::message::{Message, MessageBody};
use super::Lpc;
use crate::config::LpcConfig;
use crate::error::LpcError;
use crate::sync::WakeReason;
use crate::thread::{Endpoint, SourceFilter, Thread};
use crate::timer::Timeout;
use crate::vm::UserAddr;
use crate::Result;

impl Lpc {
    /// Send one message body to `dest` and wait until it is received
    ///
    /// # Arguments
    ///
    /// * `current` - The calling thread
    /// * `dest` - Endpoint of the destination thread
    /// * `timeout` - Wait policy for finding a receiver (`0` / `<0` / `>0` ms)
    /// * `payload` - Address of the body in the caller's address space
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A receiver took the message and copied it out
    /// * `Err(NotFound)` - `dest` names no live thread
    /// * `Err(OutOfMemory)` - No message could be allocated
    /// * `Err(WouldBlock)` - Non-blocking call and no receiver was parked
    /// * `Err(TimedOut)` - No receiver appeared before the deadline
    /// * `Err(Fault)` - `payload` is not mapped
    /// * `Err(DestinationGone)` - The destination was torn down meanwhile
    /// * `Err(Interrupted)` - An event was delivered while blocked
    pub fn send(
        &self,
        current: &Thread,
        dest: Endpoint,
        timeout: impl Into<Timeout>,
        payload: UserAddr,
    ) -> Result<()> {
        let deadline = timeout.into().start();
        let me = current.endpoint();

        // LOOKUP
        let queue = self.directory().lookup(dest)?;

        let mut msg = Message::allocate(me, self.allocator())?;

        // WAIT_FOR_RECEIVER
        let mut state = queue.lock();
        loop {
            if state.is_destroyed() {
                trace!("send {} -> {}: destination destroyed", me, dest);
                return Err(LpcError::DestinationGone);
            }
            if queue.receiver_ready.has_waiters() {
                break;
            }
            if !deadline.may_block() {
                return Err(LpcError::WouldBlock);
            }
            if deadline.expired() {
                return Err(LpcError::TimedOut);
            }

            trace!("send {} -> {}: waiting for receiver", me, dest);
            let (guard, reason) =
                queue
                    .sender_ready
                    .wait(queue.mutex(), state, current.sleeper(), deadline.instant());
            state = guard;

            match reason {
                WakeReason::Released => {
                    if deadline.is_bounded() && !self.directory().is_alive(dest) {
                        return Err(liveness_violation(me, dest));
                    }
                }
                WakeReason::TimedOut => return Err(LpcError::TimedOut),
                WakeReason::Destroyed => return Err(LpcError::DestinationGone),
                WakeReason::Interrupted => return Err(LpcError::Interrupted),
            }
        }

        // PUBLISH
        current
            .address_space()
            .copy_in(payload, msg.body_mut().as_bytes_mut())?;

        let completion = Arc::clone(msg.completion());
        state.push(msg);
        queue.receiver_ready.wake_all(WakeReason::Released);
        drop(state);
        trace!("send {} -> {}: published", me, dest);

        // WAIT_FOR_COMPLETION
        match completion.wait(current.sleeper()) {
            WakeReason::Released => {
                trace!("send {} -> {}: delivered", me, dest);
                Ok(())
            }
            WakeReason::Interrupted => Err(LpcError::Interrupted),
            // Completion waits carry no deadline, so only teardown is left
            reason => {
                debug_assert_eq!(reason, WakeReason::Destroyed);
                Err(LpcError::DestinationGone)
            }
        }
    }

    /// Receive one message body from the calling thread's own queue
    ///
    /// # Arguments
    ///
    /// * `current` - The calling thread
    /// * `source` - Which senders to accept
    /// * `timeout` - Wait policy for a matching message (`0` / `<0` / `>0` ms)
    /// * `buffer` - Where to copy the body in the caller's address space
    /// * `sender_slot` - Optional address to store the sender's endpoint at
    ///   (a little-endian `u32`)
    ///
    /// # Returns
    ///
    /// The endpoint of the sender. On `Err(Fault)` the message is still
    /// consumed and its sender released.
    pub fn recv(
        &self,
        current: &Thread,
        source: SourceFilter,
        timeout: impl Into<Timeout>,
        buffer: UserAddr,
        sender_slot: Option<UserAddr>,
    ) -> Result<Endpoint> {
        let deadline = timeout.into().start();
        let me = current.endpoint();
        let queue = current.queue();

        let mut state = queue.lock();
        let msg = loop {
            if state.is_destroyed() {
                warn!("recv {}: queue destroyed while receiving", me);
                return Err(LpcError::DestinationGone);
            }

            // ANNOUNCE
            queue.sender_ready.wake_all(WakeReason::Released);

            // TRY_DEQUEUE
            if let Some(msg) = state.take_matching(source) {
                break msg;
            }

            if !deadline.may_block() {
                return Err(LpcError::WouldBlock);
            }
            if deadline.expired() {
                return Err(LpcError::TimedOut);
            }

            trace!("recv {}: waiting for {:?}", me, source);
            let (guard, reason) =
                queue
                    .receiver_ready
                    .wait(queue.mutex(), state, current.sleeper(), deadline.instant());
            state = guard;

            match reason {
                WakeReason::Released => {}
                WakeReason::TimedOut => return Err(LpcError::TimedOut),
                WakeReason::Interrupted => return Err(LpcError::Interrupted),
                WakeReason::Destroyed => {
                    warn!("recv {}: woken by teardown of own queue", me);
                    return Err(LpcError::DestinationGone);
                }
            }
        };

        // COPY_OUT
        let sender = msg.sender();
        let copied = copy_out(current, msg.body(), sender, buffer, sender_slot);

        msg.completion().signal(WakeReason::Released);
        drop(state);
        drop(msg);

        trace!("recv {}: took message from {}", me, sender);
        copied.map(|()| sender)
    }
}

/// Copy a received body, and optionally the sender, to the receiver
fn copy_out(
    current: &Thread,
    body: &MessageBody,
    sender: Endpoint,
    buffer: UserAddr,
    sender_slot: Option<UserAddr>,
) -> Result<()> {
    let space = current.address_space();
    space.copy_out(buffer, body.as_bytes())?;
    if let Some(slot) = sender_slot {
        space.copy_out(slot, &sender.tid().to_le_bytes())?;
    }
    Ok(())
}

/// A bounded send woke normally but its destination is no longer alive
///
/// Teardown wakes senders with `Destroyed`, so this means the thread table
/// and the queue disagree.
fn liveness_violation(me: Endpoint, dest: Endpoint) -> LpcError {
    if LpcConfig::strict_liveness() {
        panic!("send {} -> {}: destination vanished without a destroyed wakeup", me, dest);
    }
    warn!("send {} -> {}: destination vanished without a destroyed wakeup", me, dest);
    LpcError::DestinationGone
}
