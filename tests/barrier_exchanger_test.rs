/*!
 * Barrier and Exchanger Integration Tests
 */

use queue_sync::{CyclicBarrier, Exchanger, SyncError, ThreadHandle};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::yield_now();
    }
}

#[test]
fn test_five_parties_get_distinct_indices() {
    let barrier = Arc::new(CyclicBarrier::new(5).unwrap());
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait().unwrap())
        })
        .collect();

    let indices: BTreeSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(indices, (0..5).collect());
    assert_eq!(barrier.number_waiting().unwrap(), 0);
}

#[test]
fn test_action_runs_once_per_trip() {
    let trips = Arc::new(AtomicUsize::new(0));
    let counted = trips.clone();
    let barrier = Arc::new(
        CyclicBarrier::with_action(3, move || {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap(),
    );

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    barrier.wait().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(trips.load(Ordering::SeqCst), 10);
}

#[test]
fn test_interrupt_breaks_barrier_for_others() {
    let barrier = Arc::new(CyclicBarrier::new(3).unwrap());
    let (tx, rx) = mpsc::channel();

    let victim = {
        let barrier = barrier.clone();
        thread::spawn(move || {
            tx.send(ThreadHandle::current()).unwrap();
            barrier.wait()
        })
    };
    let bystander = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait())
    };

    let handle = rx.recv().unwrap();
    wait_until(|| barrier.number_waiting().unwrap() == 2);
    handle.interrupt();

    assert_eq!(victim.join().unwrap(), Err(SyncError::Interrupted));
    assert_eq!(bystander.join().unwrap(), Err(SyncError::BrokenBarrier));
    assert!(barrier.is_broken().unwrap());
    assert_eq!(barrier.wait(), Err(SyncError::BrokenBarrier));

    barrier.reset().unwrap();
    assert!(!barrier.is_broken().unwrap());
}

#[test]
fn test_reset_breaks_current_waiters() {
    let barrier = Arc::new(CyclicBarrier::new(2).unwrap());
    let waiter = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait())
    };
    wait_until(|| barrier.number_waiting().unwrap() == 1);

    barrier.reset().unwrap();
    assert_eq!(waiter.join().unwrap(), Err(SyncError::BrokenBarrier));
    assert!(!barrier.is_broken().unwrap());

    // Usable again after the reset
    let partner = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait().unwrap())
    };
    let mine = barrier.wait().unwrap();
    let theirs = partner.join().unwrap();
    assert_eq!(mine + theirs, 1);
}

#[test]
fn test_panicking_action_breaks_barrier() {
    let barrier = Arc::new(CyclicBarrier::with_action(2, || panic!("action failed")).unwrap());
    let waiter = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait())
    };
    wait_until(|| barrier.number_waiting().unwrap() == 1);

    let tripper = {
        let barrier = barrier.clone();
        thread::spawn(move || barrier.wait())
    };
    assert!(tripper.join().is_err(), "action panic propagates to the tripping party");
    assert_eq!(waiter.join().unwrap(), Err(SyncError::BrokenBarrier));
    assert!(barrier.is_broken().unwrap());
}

#[test]
fn test_exchanger_swaps_sets() {
    let exchanger = Arc::new(Exchanger::<BTreeSet<&'static str>>::new().unwrap());
    let other = {
        let exchanger = exchanger.clone();
        thread::spawn(move || exchanger.exchange(["a", "b", "c"].into_iter().collect()).unwrap())
    };
    let received = exchanger.exchange(["x", "y"].into_iter().collect()).unwrap();
    let sent_back = other.join().unwrap();

    assert_eq!(received, ["a", "b", "c"].into_iter().collect());
    assert_eq!(sent_back, ["x", "y"].into_iter().collect());
}

#[test]
fn test_exchanger_pairs_many_threads() {
    let exchanger = Arc::new(Exchanger::<usize>::new().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let exchanger = exchanger.clone();
            thread::spawn(move || (i, exchanger.exchange_for(i, Duration::from_secs(10)).unwrap()))
        })
        .collect();

    let pairs: Vec<(usize, usize)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for &(mine, got) in &pairs {
        assert_ne!(mine, got);
        // Exchanges are symmetric
        assert!(pairs.contains(&(got, mine)));
    }
}

#[test]
fn test_exchanger_timeout_then_reuse() {
    let exchanger = Arc::new(Exchanger::<u32>::new().unwrap());
    assert!(matches!(
        exchanger.exchange_for(1, Duration::from_millis(20)),
        Err(SyncError::Timeout(_))
    ));

    let other = {
        let exchanger = exchanger.clone();
        thread::spawn(move || exchanger.exchange(2).unwrap())
    };
    assert_eq!(exchanger.exchange(3).unwrap(), 2);
    assert_eq!(other.join().unwrap(), 3);
}
