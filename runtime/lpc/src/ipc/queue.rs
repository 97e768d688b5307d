//! Message Queue
//!
//! One queue exists per thread, for the thread's whole lifetime. It holds the
//! messages addressed to that thread that no receiver has taken yet, in the
//! order they were published.
//!
//! ## Readiness Signalling
//!
//! There is no "receiver waiting" flag. The queue carries two wait-queues:
//!
//! | Wait-queue | Who sleeps there | Read as |
//! |---|---|---|
//! | `receiver_ready` | receivers with nothing to take | "a receiver is parked" |
//! | `sender_ready` | senders with no receiver to meet | woken on every receive announce |
//!
//! A sender holding the queue lock inspects `receiver_ready` directly. The
//! receiver enqueues itself there before the queue lock is released, so the
//! check and the sleep cannot race.
//!
//! ## Teardown
//!
//! [`destroy_queue`] marks the queue destroyed, frees every pending message
//! (each free wakes its sender with `Destroyed`) and wakes both wait-queues
//! with `Destroyed`. No thread is left asleep on a destroyed queue and no
//! new message is ever admitted to one.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::message::Message;
use crate::sync::{lock, WaitQueue, WakeReason};
use crate::thread::{Endpoint, SourceFilter};

/// State guarded by the queue lock
pub(crate) struct QueueState {
    /// Undelivered messages in admission order
    pending: VecDeque<Box<Message>>,

    /// Set once by teardown
    destroyed: bool,
}

impl QueueState {
    /// Admit a message at the back of the queue
    #[inline]
    pub(crate) fn push(&mut self, msg: Box<Message>) {
        self.pending.push_back(msg);
    }

    /// Unlink the oldest message that passes `filter`
    pub(crate) fn take_matching(&mut self, filter: SourceFilter) -> Option<Box<Message>> {
        let pos = self
            .pending
            .iter()
            .position(|msg| filter.matches(msg.sender()))?;
        self.pending.remove(pos)
    }

    #[inline]
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Incoming message queue of one thread
pub struct MessageQueue {
    /// Thread this queue belongs to
    owner: Endpoint,

    /// Queue lock
    state: Mutex<QueueState>,

    /// Receivers parked waiting for a matching message
    pub(crate) receiver_ready: WaitQueue,

    /// Senders parked waiting for a receiver
    pub(crate) sender_ready: WaitQueue,
}

impl MessageQueue {
    fn new(owner: Endpoint) -> Self {
        Self {
            owner,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                destroyed: false,
            }),
            receiver_ready: WaitQueue::new(),
            sender_ready: WaitQueue::new(),
        }
    }

    /// Endpoint of the owning thread
    #[inline]
    pub fn owner(&self) -> Endpoint {
        self.owner
    }

    /// The queue lock itself, for sleeping on one of the wait-queues
    #[inline]
    pub(crate) fn mutex(&self) -> &Mutex<QueueState> {
        &self.state
    }

    /// Acquire the queue lock
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }

    /// Number of undelivered messages
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a receiver is parked on this queue
    pub fn has_waiting_receiver(&self) -> bool {
        self.receiver_ready.has_waiters()
    }

    /// Whether a sender is parked waiting for a receiver on this queue
    pub fn has_waiting_sender(&self) -> bool {
        self.sender_ready.has_waiters()
    }

    /// Whether the queue has been torn down
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// Tear the queue down; later calls are no-ops
    fn destroy(&self) {
        let drained: Vec<Box<Message>> = {
            let mut state = self.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;

            let drained = state.pending.drain(..).collect();
            let receivers = self.receiver_ready.wake_all(WakeReason::Destroyed);
            let senders = self.sender_ready.wake_all(WakeReason::Destroyed);
            log::debug!(
                "queue {}: destroyed ({} receivers, {} senders woken)",
                self.owner,
                receivers,
                senders
            );
            drained
        };

        if !drained.is_empty() {
            log::debug!("queue {}: freeing {} pending messages", self.owner, drained.len());
        }
        // Each drop broadcasts `Destroyed` to the message's sender
        drop(drained);
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MessageQueue")
            .field("owner", &self.owner)
            .field("pending", &state.pending.len())
            .field("destroyed", &state.destroyed)
            .field("receiver_ready", &self.receiver_ready)
            .field("sender_ready", &self.sender_ready)
            .finish()
    }
}

/// Create the message queue of a new thread
pub fn init_queue(owner: Endpoint) -> Arc<MessageQueue> {
    log::debug!("queue {}: initialized", owner);
    Arc::new(MessageQueue::new(owner))
}

/// Destroy the message queue of an exiting thread
pub fn destroy_queue(queue: &MessageQueue) {
    queue.destroy();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{MessageAllocator, MessagePool};
    use crate::sync::Sleeper;
    use std::thread;
    use std::time::Duration;

    fn allocator() -> (Arc<MessagePool>, Arc<dyn MessageAllocator>) {
        let pool = Arc::new(MessagePool::new(None));
        let allocator: Arc<dyn MessageAllocator> = pool.clone();
        (pool, allocator)
    }

    fn publish(queue: &MessageQueue, sender: u32, word: u64, allocator: &Arc<dyn MessageAllocator>) {
        let mut msg = Message::allocate(Endpoint::new(sender), allocator).unwrap();
        msg.body_mut().set_word(0, word);
        queue.lock().push(msg);
    }

    #[test]
    fn test_new_queue_is_empty() {
        let q = init_queue(Endpoint::new(1));
        assert_eq!(q.owner(), Endpoint::new(1));
        assert_eq!(q.pending_len(), 0);
        assert!(!q.has_waiting_receiver());
        assert!(!q.has_waiting_sender());
        assert!(!q.is_destroyed());
    }

    #[test]
    fn test_take_matching_is_fifo_per_filter() {
        let (_pool, alloc) = allocator();
        let q = init_queue(Endpoint::new(1));
        publish(&q, 2, 10, &alloc);
        publish(&q, 3, 20, &alloc);
        publish(&q, 2, 30, &alloc);

        let mut state = q.lock();
        let from_3 = state.take_matching(SourceFilter::Endpoint(Endpoint::new(3))).unwrap();
        assert_eq!(from_3.body().word(0), Some(20));

        let any = state.take_matching(SourceFilter::Any).unwrap();
        assert_eq!(any.body().word(0), Some(10));

        assert!(state.take_matching(SourceFilter::Endpoint(Endpoint::new(3))).is_none());
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_destroy_frees_pending_messages() {
        let (pool, alloc) = allocator();
        let q = init_queue(Endpoint::new(1));
        publish(&q, 2, 1, &alloc);
        publish(&q, 3, 2, &alloc);

        let completion = Arc::clone(q.lock().pending[0].completion());
        assert_eq!(pool.in_use(), 2);

        destroy_queue(&q);
        assert!(q.is_destroyed());
        assert_eq!(q.pending_len(), 0);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(completion.outcome(), Some(WakeReason::Destroyed));

        // Idempotent
        destroy_queue(&q);
        assert!(q.is_destroyed());
    }

    #[test]
    fn test_destroy_wakes_parked_receiver() {
        let q = init_queue(Endpoint::new(1));

        let q2 = Arc::clone(&q);
        let receiver = thread::spawn(move || {
            let sleeper = Sleeper::new(1);
            let state = q2.lock();
            let (state, reason) = q2.receiver_ready.wait(q2.mutex(), state, &sleeper, None);
            (reason, state.is_destroyed())
        });

        while !q.has_waiting_receiver() {
            thread::sleep(Duration::from_millis(1));
        }
        destroy_queue(&q);

        assert_eq!(receiver.join().unwrap(), (WakeReason::Destroyed, true));
        assert!(!q.has_waiting_receiver());
    }
}
