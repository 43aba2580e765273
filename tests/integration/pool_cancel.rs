//! Pool-wide cooperative cancellation: every admitted source is accounted
//! for, no events trail in after the pool stops, and resources release.

mod util;

use std::time::{Duration, Instant};

use folio::{BackgroundLoader, PoolConfig, PoolEvent, Priority};
use util::{registry_of, ScriptedLoader};

#[test]
fn cancel_all_accounts_for_every_admission() {
    // Each source would take ~10 x 100 ms to load; cancellation after
    // 50 ms catches everything mid-flight or queued.
    let pool = BackgroundLoader::new(
        registry_of(ScriptedLoader::slow(
            vec![b"x".to_vec(); 10],
            Duration::from_millis(100),
        )),
        PoolConfig {
            max_workers: 4,
            ..PoolConfig::default()
        },
    );
    let events = pool.events();
    let sources: Vec<String> = (0..100).map(|i| format!("mem:{i}.txt")).collect();
    for source in &sources {
        pool.add(source, Priority::Normal);
    }
    pool.start();

    std::thread::sleep(Duration::from_millis(50));
    pool.cancel_all();
    pool.stop(); // blocks until in-flight workers observe cancellation

    let mut loaded = 0;
    let mut failed = 0;
    let mut cancelled = 0;
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PoolEvent::FileLoaded { .. } => loaded += 1,
            PoolEvent::FileFailed { .. } => failed += 1,
            PoolEvent::FileCancelled { .. } => cancelled += 1,
            PoolEvent::Finished => finished = true,
            _ => {}
        }
    }

    assert_eq!(loaded + failed + cancelled, 100, "every source accounted");
    assert!(cancelled >= 96, "most sources never got to run");
    assert!(finished, "dispatcher signalled shutdown");

    // No stragglers after the grace period: the pool is quiescent.
    std::thread::sleep(Duration::from_millis(150));
    assert!(events.try_recv().is_err(), "no events after stop");
    let stats = pool.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.completed, stats.total);
}

#[test]
fn stop_without_cancel_drains_gracefully() {
    let pool = BackgroundLoader::new(
        registry_of(ScriptedLoader::new(vec![b"quick".to_vec()])),
        PoolConfig::default(),
    );
    let events = pool.events();
    for i in 0..5 {
        pool.add(&format!("mem:{i}.txt"), Priority::Normal);
    }
    pool.start();

    // Wait for all five to complete, then stop.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let PoolEvent::BatchProgress { completed, total } =
            events.recv_timeout(remaining).expect("pool event")
        {
            if completed == total && total >= 5 {
                break;
            }
        }
    }
    pool.stop();

    // Nothing failed and nothing was cancelled on the graceful path.
    let mut bad = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(
            event,
            PoolEvent::FileFailed { .. } | PoolEvent::FileCancelled { .. }
        ) {
            bad += 1;
        }
    }
    assert_eq!(bad, 0);
    assert_eq!(pool.stats().completed, 5);
}

#[test]
fn reset_progress_clears_counters() {
    let pool = BackgroundLoader::new(
        registry_of(ScriptedLoader::new(vec![b"x".to_vec()])),
        PoolConfig::default(),
    );
    let events = pool.events();
    pool.add("mem:a.txt", Priority::Normal);
    pool.start();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let PoolEvent::BatchProgress { completed, total } =
            events.recv_timeout(remaining).expect("pool event")
        {
            if completed == total {
                break;
            }
        }
    }
    pool.reset_progress();
    let stats = pool.stats();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.total, 0);
    pool.stop();
}
