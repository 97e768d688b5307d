//! LPC system-call surface
//!
//! Decodes raw system-call arguments into LPC operations and collapses the
//! result into an integer status: `0` on success, a negative errno on
//! failure.
//!
//! | Number | Arguments |
//! |---|---|
//! | `SYS_LPC_SEND` | destination, timeout ms, payload address |
//! | `SYS_LPC_RECV` | source (`RECV_ANY` = any), timeout ms, buffer address, sender slot address (`0` = none) |
//! | `SYS_LPC_SEND_AND_REPLY` | destination, buffer address |

use crate::error::{status, ENOSYS, EINVAL};
use crate::ipc::Lpc;
use crate::thread::{Endpoint, SourceFilter, Thread};
use crate::timer::Timeout;
use crate::vm::UserAddr;

/// Send a message body to a thread
pub const SYS_LPC_SEND: u64 = 0x40;

/// Receive a message body from the caller's own queue
pub const SYS_LPC_RECV: u64 = 0x41;

/// Send a request and receive the reply into the same buffer
pub const SYS_LPC_SEND_AND_REPLY: u64 = 0x42;

/// Source argument of `SYS_LPC_RECV` that accepts any sender
pub const RECV_ANY: u64 = 0;

/// Number of argument registers
pub const SYSCALL_ARGS: usize = 6;

/// System-call dispatcher for LPC
///
/// # Arguments
///
/// * `lpc` - The LPC service
/// * `current` - The calling thread
/// * `number` - System-call number
/// * `args` - Raw argument registers
///
/// # Returns
///
/// `0` on success or a negative errno.
pub fn dispatch(lpc: &Lpc, current: &Thread, number: u64, args: &[u64; SYSCALL_ARGS]) -> i64 {
    let result = match number {
        SYS_LPC_SEND => sys_lpc_send(lpc, current, args[0], args[1], args[2]),
        SYS_LPC_RECV => sys_lpc_recv(lpc, current, args[0], args[1], args[2], args[3]),
        SYS_LPC_SEND_AND_REPLY => sys_lpc_send_and_reply(lpc, current, args[0], args[1]),
        _ => {
            log::debug!("syscall: unknown LPC syscall number {:#x}", number);
            -ENOSYS
        }
    };
    i64::from(result)
}

fn sys_lpc_send(lpc: &Lpc, current: &Thread, dest: u64, timeout_ms: u64, payload: u64) -> i32 {
    let Some(dest) = endpoint_arg(dest) else {
        return -EINVAL;
    };
    status(&lpc.send(current, dest, timeout_arg(timeout_ms), UserAddr::new(payload)))
}

fn sys_lpc_recv(
    lpc: &Lpc,
    current: &Thread,
    source: u64,
    timeout_ms: u64,
    buffer: u64,
    sender_slot: u64,
) -> i32 {
    let source = if source == RECV_ANY {
        SourceFilter::Any
    } else {
        match endpoint_arg(source) {
            Some(ep) => SourceFilter::Endpoint(ep),
            None => return -EINVAL,
        }
    };
    let sender_slot = Some(UserAddr::new(sender_slot)).filter(|a| !a.is_null());

    status(&lpc.recv(
        current,
        source,
        timeout_arg(timeout_ms),
        UserAddr::new(buffer),
        sender_slot,
    ))
}

fn sys_lpc_send_and_reply(lpc: &Lpc, current: &Thread, dest: u64, buffer: u64) -> i32 {
    let Some(dest) = endpoint_arg(dest) else {
        return -EINVAL;
    };
    status(&lpc.send_and_reply(current, dest, UserAddr::new(buffer)))
}

/// Decode a thread id register
fn endpoint_arg(raw: u64) -> Option<Endpoint> {
    u32::try_from(raw).ok().map(Endpoint::new)
}

/// Decode a signed millisecond timeout passed in an unsigned register
#[inline]
fn timeout_arg(raw: u64) -> Timeout {
    Timeout::from_millis(raw as i64)
}
