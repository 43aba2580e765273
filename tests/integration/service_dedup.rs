//! Service-level in-flight deduplication and progress fan-out.

mod util;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use folio::model::{CompleteCallback, ProgressCallback};
use folio::{DocumentLoader, DocumentService, LoaderRegistry, ServiceConfig};
use util::ScriptedLoader;

#[test]
fn ten_concurrent_loads_share_one_loader_invocation() {
    let loader = Arc::new(ScriptedLoader::slow(
        vec![b"big chunk ".to_vec(); 8],
        Duration::from_millis(15),
    ));
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::clone(&loader) as Arc<dyn DocumentLoader>);
    let service = DocumentService::with_registry(ServiceConfig::default(), registry);

    let (tx, rx) = crossbeam_channel::unbounded();
    for _ in 0..10 {
        let tx = tx.clone();
        let on_complete: CompleteCallback = Arc::new(move |result| {
            let _ = tx.send((
                result.text(),
                result
                    .metadata
                    .clone()
                    .and_then(|m| m.checksum_sha256),
            ));
        });
        service
            .load_async("mem:big.txt", None, Some(on_complete), None)
            .expect("submit");
    }

    let mut outcomes = Vec::new();
    for _ in 0..10 {
        outcomes.push(
            rx.recv_timeout(Duration::from_secs(10))
                .expect("completion callback"),
        );
    }

    // All ten callers observed the same bytes and the same fingerprint,
    // and only one loader invocation happened.
    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    assert!(outcomes[0].1.is_some());
    assert_eq!(loader.open_count(), 1);
    service.shutdown();
}

#[test]
fn progress_snapshots_fan_out_to_all_subscribers() {
    let loader = ScriptedLoader::slow(vec![b"x".to_vec(); 30], Duration::from_millis(10));
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::new(loader));
    let service = DocumentService::with_registry(ServiceConfig::default(), registry);

    let counters: Vec<Arc<AtomicUsize>> =
        (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let (tx, rx) = crossbeam_channel::unbounded();
    for counter in &counters {
        let counter = Arc::clone(counter);
        let on_progress: ProgressCallback = Arc::new(move |_progress| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let tx = tx.clone();
        let on_complete: CompleteCallback = Arc::new(move |_result| {
            let _ = tx.send(());
        });
        service
            .load_async("mem:shared", Some(on_progress), Some(on_complete), None)
            .expect("submit");
    }
    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(10)).expect("complete");
    }

    // Every subscriber saw at least the mandatory final snapshot.
    for counter in &counters {
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
    service.shutdown();
}

#[test]
fn is_loading_tracks_inflight_state() {
    let loader = ScriptedLoader::slow(vec![b"x".to_vec(); 50], Duration::from_millis(10));
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::new(loader));
    let service = DocumentService::with_registry(ServiceConfig::default(), registry);

    let (tx, rx) = crossbeam_channel::bounded(1);
    let on_complete: CompleteCallback = Arc::new(move |_result| {
        let _ = tx.send(());
    });
    service
        .load_async("mem:tracked", None, Some(on_complete), None)
        .expect("submit");
    std::thread::sleep(Duration::from_millis(30));
    assert!(service.is_loading("mem:tracked"));
    assert_eq!(service.active_operations().len(), 1);

    rx.recv_timeout(Duration::from_secs(10)).expect("complete");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while service.is_loading("mem:tracked") {
        assert!(std::time::Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(service.active_operations().is_empty());
    service.shutdown();
}

#[test]
fn preview_respects_byte_budget() {
    // One huge line: the line budget never triggers, the byte budget must.
    let chunk = vec![b'a'; 4096];
    let loader = ScriptedLoader::new(vec![chunk; 64]);
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::new(loader));
    let service = DocumentService::with_registry(
        ServiceConfig {
            preview_max_bytes: 16 * 1024,
            ..ServiceConfig::default()
        },
        registry,
    );

    let preview = service.get_preview("mem:huge", 50).expect("preview");
    assert!(preview.len() <= 16 * 1024 + 4096, "preview stops near budget");
    service.shutdown();
}
