/*!
 * Read/Write Lock Integration Tests
 */

use queue_sync::locks::{Lock, RwLock};
use queue_sync::CountDownLatch;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
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
fn test_readers_hold_concurrently() {
    let rw = RwLock::new();
    let all_in = CountDownLatch::new(4).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let rw = rw.clone();
            let all_in = all_in.clone();
            thread::spawn(move || {
                rw.read_lock().lock().unwrap();
                all_in.count_down();
                // Only returns if every reader got in at the same time
                let together = all_in.wait_for(Duration::from_secs(10)).unwrap();
                rw.read_lock().unlock().unwrap();
                together
            })
        })
        .collect();
    for r in readers {
        assert!(r.join().unwrap());
    }
    assert_eq!(rw.read_lock_count(), 0);
}

#[test]
fn test_writer_excludes_readers_and_writers() {
    let rw = RwLock::new();
    let value = Arc::new(AtomicI64::new(0));

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let rw = rw.clone();
            let value = value.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    rw.write_lock().lock().unwrap();
                    // Readers must never observe the odd intermediate value
                    value.fetch_add(1, Ordering::SeqCst);
                    value.fetch_add(1, Ordering::SeqCst);
                    rw.write_lock().unlock().unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let rw = rw.clone();
            let value = value.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    rw.read_lock().lock().unwrap();
                    assert_eq!(value.load(Ordering::SeqCst) % 2, 0);
                    rw.read_lock().unlock().unwrap();
                }
            })
        })
        .collect();

    for h in writers.into_iter().chain(readers) {
        h.join().unwrap();
    }
    assert_eq!(value.load(Ordering::SeqCst), 2000);
    assert!(!rw.is_write_locked());
    assert_eq!(rw.read_lock_count(), 0);
}

#[test]
fn test_queued_writer_blocks_new_readers() {
    let rw = RwLock::new();
    rw.read_lock().lock().unwrap();

    let writer = {
        let rw = rw.clone();
        thread::spawn(move || {
            rw.write_lock().lock().unwrap();
            rw.write_lock().unlock().unwrap();
        })
    };
    wait_until(|| rw.queued_writer_threads().len() == 1);

    // A fresh reader must not overtake the queued writer
    let newcomer = {
        let rw = rw.clone();
        thread::spawn(move || rw.read_lock().try_lock().unwrap())
    };
    assert!(!newcomer.join().unwrap());

    // The current reader may still reenter
    assert!(rw.read_lock().try_lock().unwrap());
    assert_eq!(rw.read_hold_count(), 2);

    rw.read_lock().unlock().unwrap();
    rw.read_lock().unlock().unwrap();
    writer.join().unwrap();
    assert!(!rw.has_queued_threads());
}

#[test]
fn test_writer_release_wakes_all_queued_readers() {
    let rw = RwLock::new();
    rw.write_lock().lock().unwrap();

    let readers: Vec<_> = (0..5)
        .map(|_| {
            let rw = rw.clone();
            thread::spawn(move || {
                let got = rw.read_lock().try_lock_for(Duration::from_secs(10)).unwrap();
                if got {
                    rw.read_lock().unlock().unwrap();
                }
                got
            })
        })
        .collect();
    wait_until(|| rw.queued_reader_threads().len() == 5);

    rw.write_lock().unlock().unwrap();
    for r in readers {
        assert!(r.join().unwrap());
    }
}

#[test]
fn test_fair_writer_waits_behind_queued_reader() {
    let rw = RwLock::with_fairness(true);
    assert!(rw.is_fair());
    rw.write_lock().lock().unwrap();

    let reader = {
        let rw = rw.clone();
        thread::spawn(move || {
            rw.read_lock().lock().unwrap();
            rw.read_lock().unlock().unwrap();
        })
    };
    wait_until(|| rw.queue_length() == 1);

    rw.write_lock().unlock().unwrap();
    // A queued reader exists or has just been admitted; a fair try_lock_for
    // from a new writer queues behind it and still succeeds eventually
    let writer = {
        let rw = rw.clone();
        thread::spawn(move || {
            let got = rw.write_lock().try_lock_for(Duration::from_secs(10)).unwrap();
            if got {
                rw.write_lock().unlock().unwrap();
            }
            got
        })
    };
    reader.join().unwrap();
    assert!(writer.join().unwrap());
}

#[test]
fn test_write_condition_round_trip() {
    let rw = RwLock::new();
    let cond = Arc::new(rw.write_lock().new_condition().unwrap());

    let waiter = {
        let rw = rw.clone();
        let cond = cond.clone();
        thread::spawn(move || {
            rw.write_lock().lock().unwrap();
            rw.write_lock().lock().unwrap();
            let signalled = cond.wait_for(Duration::from_secs(10)).unwrap();
            let holds = rw.write_hold_count();
            rw.write_lock().unlock().unwrap();
            rw.write_lock().unlock().unwrap();
            (signalled, holds)
        })
    };

    wait_until(|| {
        rw.write_lock().lock().unwrap();
        let waiting = cond.has_waiters().unwrap();
        rw.write_lock().unlock().unwrap();
        waiting
    });
    rw.write_lock().lock().unwrap();
    cond.signal().unwrap();
    rw.write_lock().unlock().unwrap();

    assert_eq!(waiter.join().unwrap(), (true, 2));
}
