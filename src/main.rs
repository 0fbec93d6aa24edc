/*!
 * Queue Sync Demo - Main Entry Point
 *
 * Replays the classic usage scenarios on top of the synchronizer:
 * - mutex: many threads incrementing a shared counter
 * - latch: business threads waiting for initialization workers
 * - semaphore: a bounded connection pool
 * - barrier: parties meeting at a barrier whose action collects results
 * - exchange: two threads swapping data sets
 */

use anyhow::{bail, Context, Result};
use queue_sync::core::sync::SyncConfig;
use queue_sync::monitoring::span_operation;
use queue_sync::{
    init_tracing, set_default_config, CountDownLatch, CyclicBarrier, Exchanger, Lock, Mutex,
    Semaphore,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

const SCENARIOS: &[&str] = &["mutex", "latch", "semaphore", "barrier", "exchange"];

fn main() -> Result<()> {
    init_tracing();

    let config = SyncConfig::from_env();
    info!(strategy = ?config.select_strategy(), "parking configuration");
    set_default_config(config);

    let requested: Vec<String> = std::env::args().skip(1).collect();
    let scenarios: Vec<&str> = if requested.is_empty() {
        SCENARIOS.to_vec()
    } else {
        requested.iter().map(String::as_str).collect()
    };

    for name in scenarios {
        let span = span_operation(name);
        let _entered = span.enter();
        let result = match name {
            "mutex" => mutex_demo(),
            "latch" => latch_demo(),
            "semaphore" => semaphore_demo(),
            "barrier" => barrier_demo(),
            "exchange" => exchange_demo(),
            other => bail!("unknown scenario '{}', expected one of {:?}", other, SCENARIOS),
        };
        span.record_result(result.is_ok());
        result.with_context(|| format!("scenario '{}' failed", name))?;
    }

    Ok(())
}

fn join_all<T>(handles: Vec<thread::JoinHandle<T>>) -> Result<Vec<T>> {
    handles
        .into_iter()
        .map(|h| h.join().map_err(|_| anyhow::anyhow!("worker thread panicked")))
        .collect()
}

fn mutex_demo() -> Result<()> {
    const THREADS: usize = 50;
    const INCREMENTS: usize = 1000;

    let mutex = Mutex::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            thread::spawn(move || -> Result<()> {
                for _ in 0..INCREMENTS {
                    let _guard = mutex.guard()?;
                    // Unsynchronized read-modify-write, made safe by the mutex
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();
    join_all(handles)?.into_iter().collect::<Result<()>>()?;

    let total = counter.load(Ordering::Relaxed);
    let snapshot = serde_json::to_string(&mutex.synchronizer().snapshot())?;
    info!(total, expected = THREADS * INCREMENTS, %snapshot, "mutex counter finished");
    if total != THREADS * INCREMENTS {
        bail!("lost updates: {} != {}", total, THREADS * INCREMENTS);
    }
    Ok(())
}

fn latch_demo() -> Result<()> {
    const INIT_WORKERS: i64 = 3;

    let latch = CountDownLatch::new(INIT_WORKERS)?;

    let business: Vec<_> = (0..2)
        .map(|i| {
            let latch = latch.clone();
            thread::spawn(move || -> Result<()> {
                info!(worker = i, "business thread waiting for initialization");
                latch.wait()?;
                info!(worker = i, "business thread running");
                Ok(())
            })
        })
        .collect();

    let init: Vec<_> = (0..INIT_WORKERS)
        .map(|i| {
            let latch = latch.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20 * (i as u64 + 1)));
                info!(worker = i, remaining = latch.count() - 1, "initialization step done");
                latch.count_down();
            })
        })
        .collect();

    join_all(init)?;
    join_all(business)?.into_iter().collect::<Result<()>>()?;
    info!(count = latch.count(), "latch released all business threads");
    Ok(())
}

fn semaphore_demo() -> Result<()> {
    const POOL_SIZE: i64 = 3;
    const CLIENTS: usize = 10;

    let pool = Semaphore::with_fairness(POOL_SIZE, true);
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CLIENTS)
        .map(|client| {
            let pool = pool.clone();
            let in_use = in_use.clone();
            let peak = peak.clone();
            thread::spawn(move || -> Result<()> {
                pool.acquire()?;
                let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                info!(client, in_use = now, "connection acquired");
                thread::sleep(Duration::from_millis(10));
                in_use.fetch_sub(1, Ordering::SeqCst);
                pool.release()?;
                Ok(())
            })
        })
        .collect();
    join_all(handles)?.into_iter().collect::<Result<()>>()?;

    let peak = peak.load(Ordering::SeqCst);
    info!(peak, available = pool.available_permits(), "connection pool drained");
    if peak as i64 > POOL_SIZE {
        bail!("pool oversubscribed: peak {} > {}", peak, POOL_SIZE);
    }
    Ok(())
}

fn barrier_demo() -> Result<()> {
    const PARTIES: usize = 5;

    let results = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let collected = results.clone();
    let barrier = Arc::new(CyclicBarrier::with_action(PARTIES, move || {
        let sum: usize = collected.lock().iter().sum();
        info!(sum, "barrier action collected results");
    })?);

    let handles: Vec<_> = (0..PARTIES)
        .map(|party| {
            let barrier = barrier.clone();
            let results = results.clone();
            thread::spawn(move || -> Result<usize> {
                results.lock().push(party * 10);
                let index = barrier.wait()?;
                info!(party, arrival_index = index, "party passed barrier");
                Ok(index)
            })
        })
        .collect();

    let mut indices = join_all(handles)?.into_iter().collect::<Result<Vec<_>>>()?;
    indices.sort_unstable();
    if indices != (0..PARTIES).collect::<Vec<_>>() {
        bail!("unexpected arrival indices {:?}", indices);
    }
    Ok(())
}

fn exchange_demo() -> Result<()> {
    let exchanger = Arc::new(Exchanger::<BTreeSet<String>>::new()?);

    let producer = {
        let exchanger = exchanger.clone();
        thread::spawn(move || -> Result<BTreeSet<String>> {
            let set: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
            Ok(exchanger.exchange(set)?)
        })
    };

    let set: BTreeSet<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
    let received = exchanger.exchange(set)?;
    let sent_back = producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer panicked"))??;

    info!(?received, ?sent_back, "sets exchanged");
    if received.len() != 3 || sent_back.len() != 2 {
        bail!("exchange delivered the wrong sets");
    }
    Ok(())
}
