/*!
 * Semaphore Integration Tests
 */

use queue_sync::{Semaphore, SyncError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for_queue(sem: &Semaphore, len: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while sem.queue_length() < len {
        assert!(Instant::now() < deadline, "waiters never queued");
        thread::yield_now();
    }
}

#[test]
fn test_permits_never_oversubscribed() {
    let sem = Semaphore::new(3);
    let in_use = Arc::new(AtomicI64::new(0));
    let peak = Arc::new(AtomicI64::new(0));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let sem = sem.clone();
            let in_use = in_use.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    sem.acquire().unwrap();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    in_use.fetch_sub(1, Ordering::SeqCst);
                    sem.release().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(sem.available_permits(), 3);
}

#[test]
fn test_release_many_wakes_every_waiter() {
    let sem = Semaphore::new(0);
    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let sem = sem.clone();
            thread::spawn(move || sem.try_acquire_for(Duration::from_secs(10)).unwrap())
        })
        .collect();
    wait_for_queue(&sem, 5);

    sem.release_many(5).unwrap();
    for w in waiters {
        assert!(w.join().unwrap());
    }
    assert_eq!(sem.available_permits(), 0);
    assert!(!sem.has_queued_threads());
}

#[test]
fn test_bulk_acquire_waits_for_enough_permits() {
    let sem = Semaphore::new(1);
    let bulk = {
        let sem = sem.clone();
        thread::spawn(move || sem.acquire_many(3))
    };
    wait_for_queue(&sem, 1);

    sem.release().unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sem.queue_length(), 1, "two permits are not enough");

    sem.release().unwrap();
    bulk.join().unwrap().unwrap();
    assert_eq!(sem.available_permits(), 0);
}

#[test]
fn test_fair_semaphore_serves_in_arrival_order() {
    let sem = Semaphore::with_fairness(0, true);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let thread_sem = sem.clone();
        let order = order.clone();
        handles.push(thread::spawn(move || {
            thread_sem.acquire().unwrap();
            order.lock().push(i);
        }));
        wait_for_queue(&sem, i + 1);
    }

    for _ in 0..4 {
        sem.release().unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_fair_try_acquire_still_barges() {
    let sem = Semaphore::with_fairness(0, true);
    let waiter = {
        let sem = sem.clone();
        thread::spawn(move || sem.try_acquire_for(Duration::from_millis(300)).unwrap())
    };
    wait_for_queue(&sem, 1);
    sem.release().unwrap();
    // Either the queued waiter or this untimed attempt gets the single permit
    let barged = sem.try_acquire().unwrap();
    let waited = waiter.join().unwrap();
    assert!(barged ^ waited);
}

#[test]
fn test_timeout_leaves_permits_untouched() {
    let sem = Semaphore::new(1);
    let start = Instant::now();
    assert!(!sem.try_acquire_many_for(2, Duration::from_millis(30)).unwrap());
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(sem.available_permits(), 1);
    assert_eq!(sem.queue_length(), 0);
}

#[test]
fn test_negative_arguments_rejected() {
    let sem = Semaphore::new(1);
    assert!(matches!(sem.acquire_many(-1), Err(SyncError::InvalidArgument(_))));
    assert!(matches!(sem.release_many(-2), Err(SyncError::InvalidArgument(_))));
    assert!(matches!(sem.reduce_permits(-1), Err(SyncError::InvalidArgument(_))));
    assert_eq!(sem.available_permits(), 1);
}

#[test]
fn test_drain_and_reduce() {
    let sem = Semaphore::new(5);
    sem.reduce_permits(2).unwrap();
    assert_eq!(sem.available_permits(), 3);
    assert_eq!(sem.drain_permits(), 3);
    assert_eq!(sem.available_permits(), 0);
    assert!(!sem.try_acquire().unwrap());
}
