//! Worker retry with exponential backoff driven through the pool.

mod util;

use std::time::{Duration, Instant};

use folio::{BackgroundLoader, PoolConfig, PoolEvent};
use util::{registry_of, ScriptedLoader};

#[test]
fn transient_failures_recover_within_worker_retries() {
    // Fails the first two attempts, succeeds on the third. With a 10 ms
    // backoff base the worker sleeps 10 ms + 20 ms between attempts.
    let pool = BackgroundLoader::new(
        registry_of(ScriptedLoader::flaky(vec![b"recovered".to_vec()], 2)),
        PoolConfig {
            max_retries: 3,
            backoff_base: Duration::from_millis(10),
            ..PoolConfig::default()
        },
    );
    let events = pool.events();
    let started = Instant::now();
    pool.add("mem:flaky.txt", folio::Priority::Normal);
    pool.start();

    let mut loaded = 0;
    let mut failed = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining).expect("pool event") {
            PoolEvent::FileLoaded { result, .. } => {
                assert_eq!(result.text(), "recovered");
                loaded += 1;
            }
            PoolEvent::FileFailed { .. } => failed += 1,
            PoolEvent::BatchProgress { completed, total } if completed == total => break,
            _ => {}
        }
    }
    pool.stop();

    assert_eq!(loaded, 1, "file_loaded fires exactly once");
    assert_eq!(failed, 0, "no file_failed for a recovered source");
    assert!(
        started.elapsed() >= Duration::from_millis(30),
        "backoff delays must be observed"
    );
}

#[test]
fn batch_progress_is_monotonic() {
    let pool = BackgroundLoader::new(
        registry_of(ScriptedLoader::new(vec![b"ok".to_vec()])),
        PoolConfig::default(),
    );
    let events = pool.events();
    let sources: Vec<String> = (0..20).map(|i| format!("mem:{i}.txt")).collect();
    for source in &sources {
        pool.add(source, folio::Priority::Normal);
    }
    pool.start();

    let mut last_completed = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let PoolEvent::BatchProgress { completed, total } =
            events.recv_timeout(remaining).expect("pool event")
        {
            assert!(completed >= last_completed, "progress must not regress");
            assert!(completed <= total);
            last_completed = completed;
            if completed == total && total >= 20 {
                break;
            }
        }
    }
    pool.stop();
    assert_eq!(pool.stats().completed, 20);
}
