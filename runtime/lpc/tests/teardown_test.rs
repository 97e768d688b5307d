//! Queue teardown tests
//!
//! Destroying a thread's queue must wake everyone blocked on it with a
//! failure and free every pending message.

mod common;

use std::sync::Arc;
use std::thread;

use lpc::*;

use common::*;

/// Test teardown with pending messages, blocked senders and a blocked receiver
#[test]
fn test_destroy_with_pending_and_blocked_threads() {
    const N: usize = 3;

    let sys = System::new();
    let (r, _) = sys.spawn();
    let r_ep = r.endpoint();
    let r_queue = Arc::clone(r.queue());

    let lpc = sys.lpc.clone();
    let receiver = thread::spawn(move || {
        let unmatched = Endpoint::new(u32::MAX);
        lpc.recv(&r, SourceFilter::Endpoint(unmatched), -1, BUF, None)
    });
    wait_until("receiver to park", || r_queue.has_waiting_receiver());

    let mut senders = Vec::new();
    for i in 0..N {
        let (t, _) = sys.spawn();
        let lpc = sys.lpc.clone();
        senders.push(thread::spawn(move || lpc.send(&t, r_ep, -1, BUF)));
        wait_until("message to be published", || r_queue.pending_len() == i + 1);
    }
    assert_eq!(sys.pool.in_use(), N);

    sys.table.exit(r_ep).unwrap();

    assert_eq!(receiver.join().unwrap(), Err(LpcError::DestinationGone));
    for h in senders {
        assert_eq!(h.join().unwrap(), Err(LpcError::DestinationGone));
    }
    assert!(r_queue.is_destroyed());
    assert_eq!(r_queue.pending_len(), 0);
    assert_eq!(sys.pool.in_use(), 0);
}

/// Test a sender waiting for a receiver fails when the destination exits
#[test]
fn test_destroy_wakes_sender_waiting_for_receiver() {
    let sys = System::new();
    let (a, _) = sys.spawn();
    let (b, _) = sys.spawn();
    let b_ep = b.endpoint();
    let b_queue = Arc::clone(b.queue());

    let lpc = sys.lpc.clone();
    let sender = thread::spawn(move || lpc.send(&a, b_ep, -1, BUF));
    wait_until("sender to park", || b_queue.has_waiting_sender());

    sys.table.exit(b_ep).unwrap();

    assert_eq!(sender.join().unwrap(), Err(LpcError::DestinationGone));
    assert!(!b_queue.has_waiting_sender());
    assert_eq!(sys.pool.in_use(), 0);
}

/// Test a bounded sender is also released by teardown
#[test]
fn test_destroy_wakes_bounded_sender() {
    let sys = System::new();
    let (a, _) = sys.spawn();
    let (b, _) = sys.spawn();
    let b_ep = b.endpoint();
    let b_queue = Arc::clone(b.queue());

    let lpc = sys.lpc.clone();
    let sender = thread::spawn(move || lpc.send(&a, b_ep, 10_000, BUF));
    wait_until("sender to park", || b_queue.has_waiting_sender());

    sys.table.exit(b_ep).unwrap();
    assert_eq!(sender.join().unwrap(), Err(LpcError::DestinationGone));
    assert_eq!(sys.pool.in_use(), 0);
}

/// Test sending to an exited thread
#[test]
fn test_send_after_exit() {
    let sys = System::new();
    let (a, _) = sys.spawn();
    let (b, _) = sys.spawn();
    let b_ep = b.endpoint();

    sys.table.exit(b_ep).unwrap();

    assert_eq!(
        sys.lpc.send(&a, b_ep, -1, BUF),
        Err(LpcError::NotFound { endpoint: b_ep })
    );
    assert_eq!(sys.pool.allocated(), 0);
}

/// Test a send that resolved the queue before teardown but locked it after
#[test]
fn test_send_to_destroyed_queue() {
    struct Stale(Arc<MessageQueue>);

    impl ThreadDirectory for Stale {
        fn lookup(&self, _endpoint: Endpoint) -> lpc::Result<Arc<MessageQueue>> {
            Ok(Arc::clone(&self.0))
        }

        fn is_alive(&self, _endpoint: Endpoint) -> bool {
            true
        }
    }

    let sys = System::new();
    let (a, _) = sys.spawn();
    let (b, _) = sys.spawn();
    let stale_queue = Arc::clone(b.queue());
    sys.table.exit(b.endpoint()).unwrap();

    let pool = Arc::new(MessagePool::new(None));
    let lpc = Lpc::new(Arc::new(Stale(stale_queue)), pool.clone());

    assert_eq!(
        lpc.send(&a, b.endpoint(), -1, BUF),
        Err(LpcError::DestinationGone)
    );
    assert_eq!(pool.in_use(), 0);
}

/// Directory that still resolves a queue but reports its owner as gone
struct Vanished(Arc<MessageQueue>);

impl ThreadDirectory for Vanished {
    fn lookup(&self, _endpoint: Endpoint) -> lpc::Result<Arc<MessageQueue>> {
        Ok(Arc::clone(&self.0))
    }

    fn is_alive(&self, _endpoint: Endpoint) -> bool {
        false
    }
}

/// Park a bounded sender on a destination whose owner vanished, then let a
/// non-blocking receive announce
fn announce_to_vanished_destination() -> (thread::JoinHandle<lpc::Result<()>>, Arc<MessagePool>) {
    let sys = System::new();
    let (a, _) = sys.spawn();
    let (b, _) = sys.spawn();
    let b_ep = b.endpoint();
    let b_queue = Arc::clone(b.queue());

    let pool = Arc::new(MessagePool::new(None));
    let lpc = Lpc::new(Arc::new(Vanished(Arc::clone(&b_queue))), pool.clone());

    let sender_lpc = lpc.clone();
    let sender = thread::spawn(move || sender_lpc.send(&a, b_ep, 5_000, BUF));
    wait_until("sender to park", || b_queue.has_waiting_sender());

    let unmatched = SourceFilter::Endpoint(Endpoint::new(9999));
    assert_eq!(lpc.recv(&b, unmatched, 0, BUF, None), Err(LpcError::WouldBlock));

    (sender, pool)
}

/// Test a bounded sender released by a destination that is no longer alive
#[cfg(not(feature = "strict-liveness"))]
#[test]
fn test_bounded_send_to_vanished_destination() {
    let (sender, pool) = announce_to_vanished_destination();

    assert_eq!(sender.join().unwrap(), Err(LpcError::DestinationGone));
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.allocated(), 1);
}

/// Test that strict liveness turns the same wakeup into a panic
#[cfg(feature = "strict-liveness")]
#[test]
#[should_panic]
fn test_vanished_destination_panics_when_strict() {
    let (sender, _pool) = announce_to_vanished_destination();
    let _ = sender.join().unwrap();
}
