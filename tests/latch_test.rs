/*!
 * Count-Down Latch Integration Tests
 */

use queue_sync::{CountDownLatch, SyncError, ThreadHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_waiters_released_after_three_count_downs() {
    let latch = CountDownLatch::new(3).unwrap();
    let passed = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let latch = latch.clone();
            let passed = passed.clone();
            thread::spawn(move || {
                latch.wait().unwrap();
                passed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while latch.queue_length() < 2 {
        assert!(Instant::now() < deadline);
        thread::yield_now();
    }

    for expected in [2, 1] {
        latch.count_down();
        assert_eq!(latch.count(), expected);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(passed.load(Ordering::SeqCst), 0, "gate opened early");
    }

    latch.count_down();
    for w in waiters {
        w.join().unwrap();
    }
    assert_eq!(passed.load(Ordering::SeqCst), 2);
    assert!(!latch.has_queued_threads());
}

#[test]
fn test_zero_is_terminal() {
    let latch = CountDownLatch::new(1).unwrap();
    latch.count_down();
    latch.count_down();
    latch.count_down();
    assert_eq!(latch.count(), 0);
    latch.wait().unwrap();
    assert!(latch.wait_for(Duration::from_millis(1)).unwrap());
}

#[test]
fn test_zero_count_never_blocks() {
    let latch = CountDownLatch::new(0).unwrap();
    let start = Instant::now();
    latch.wait().unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_negative_count_rejected() {
    assert!(matches!(
        CountDownLatch::new(-1),
        Err(SyncError::InvalidArgument(_))
    ));
}

#[test]
fn test_wait_for_times_out() {
    let latch = CountDownLatch::new(2).unwrap();
    let start = Instant::now();
    assert!(!latch.wait_for(Duration::from_millis(40)).unwrap());
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(latch.queue_length(), 0);
    assert_eq!(latch.count(), 2);
}

#[test]
fn test_wait_is_interruptible() {
    let latch = CountDownLatch::new(1).unwrap();
    let (tx, rx) = mpsc::channel();
    let waiter = {
        let latch = latch.clone();
        thread::spawn(move || {
            tx.send(ThreadHandle::current()).unwrap();
            latch.wait()
        })
    };
    let handle = rx.recv().unwrap();
    while latch.queue_length() == 0 {
        thread::yield_now();
    }
    handle.interrupt();
    assert_eq!(waiter.join().unwrap(), Err(SyncError::Interrupted));
    assert_eq!(latch.count(), 1);
}

#[test]
fn test_many_waiters_all_released() {
    let latch = CountDownLatch::new(1).unwrap();
    let waiters: Vec<_> = (0..16)
        .map(|_| {
            let latch = latch.clone();
            thread::spawn(move || latch.wait_for(Duration::from_secs(10)).unwrap())
        })
        .collect();
    thread::sleep(Duration::from_millis(30));
    latch.count_down();
    for w in waiters {
        assert!(w.join().unwrap());
    }
}
