//! Timeouts and Deadlines
//!
//! LPC calls take a timeout in milliseconds with three meanings:
//!
//! | `timeout_ms` | Meaning |
//! |---|---|
//! | `0` | Non-blocking: fail with `WouldBlock` instead of sleeping |
//! | `< 0` | Infinite: sleep until woken |
//! | `> 0` | Bounded: fail with `TimedOut` once the deadline passes |
//!
//! A bounded call fixes its deadline once, on entry. Every sleep inside the
//! operation then waits only for the time that remains, so spurious or
//! unrelated wakeups never extend the total wait.

use std::time::{Duration, Instant};

/// Wait policy of an LPC call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately instead of blocking
    NonBlocking,
    /// Block until woken
    Infinite,
    /// Block for at most this long
    Bounded(Duration),
}

impl Timeout {
    /// Decode a raw millisecond timeout (`0`, `<0`, `>0`)
    pub fn from_millis(timeout_ms: i64) -> Self {
        match timeout_ms {
            0 => Timeout::NonBlocking,
            ms if ms < 0 => Timeout::Infinite,
            ms => Timeout::Bounded(Duration::from_millis(ms as u64)),
        }
    }

    /// Fix the deadline of this timeout relative to `now`
    pub fn deadline_from(&self, now: Instant) -> Deadline {
        match self {
            Timeout::NonBlocking => Deadline::Immediate,
            Timeout::Infinite => Deadline::Never,
            Timeout::Bounded(d) => match now.checked_add(*d) {
                Some(at) => Deadline::At(at),
                None => Deadline::Never,
            },
        }
    }

    /// Fix the deadline of this timeout relative to the current instant
    #[inline]
    pub fn start(&self) -> Deadline {
        self.deadline_from(Instant::now())
    }
}

impl From<i64> for Timeout {
    fn from(timeout_ms: i64) -> Self {
        Timeout::from_millis(timeout_ms)
    }
}

impl From<i32> for Timeout {
    fn from(timeout_ms: i32) -> Self {
        Timeout::from_millis(i64::from(timeout_ms))
    }
}

/// A timeout anchored to a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// The caller refuses to sleep at all
    Immediate,
    /// Sleep without a time limit
    Never,
    /// Sleep until this instant at the latest
    At(Instant),
}

impl Deadline {
    /// Whether the caller is allowed to sleep
    #[inline]
    pub fn may_block(&self) -> bool {
        !matches!(self, Deadline::Immediate)
    }

    /// Instant to hand to the sleep primitive (`None` = no limit)
    #[inline]
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::At(at) => Some(*at),
            _ => None,
        }
    }

    /// Whether a bounded deadline has expired
    pub fn expired(&self) -> bool {
        match self {
            Deadline::Immediate => true,
            Deadline::Never => false,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }

    /// Whether this is a bounded (`> 0`) wait
    #[inline]
    pub fn is_bounded(&self) -> bool {
        matches!(self, Deadline::At(_))
    }
}
