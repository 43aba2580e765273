//! Virtualized row model over a real directory: batch faulting, prefetch
//! idempotence, and metadata-column sorting.

mod util;

use folio::rows::{CellValue, Column, RowModel, RowModelConfig};

fn populated_dir(files: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..files {
        std::fs::write(
            dir.path().join(format!("doc_{i:04}.txt")),
            "x".repeat((i % 37) + 1),
        )
        .expect("write");
    }
    dir
}

#[test]
fn large_directory_enumerates_without_stat() {
    let dir = populated_dir(500);
    let mut model = RowModel::new(RowModelConfig::default());
    model.set_root(dir.path()).expect("set_root");
    assert_eq!(model.row_count(), 500);
    assert_eq!(model.total_batches(), 10);
    // Names are available immediately; nothing was stat'ed yet.
    assert_eq!(model.name(0), Some("doc_0000.txt"));
    assert_eq!(model.stats().entries, 0);
}

#[test]
fn scrolling_faults_batches_on_demand() {
    let dir = populated_dir(200);
    let mut model = RowModel::new(RowModelConfig {
        batch_size: 50,
        ..RowModelConfig::default()
    });
    model.set_root(dir.path()).expect("set_root");

    // A non-name cell far down the listing starts as a placeholder.
    assert_eq!(model.data(130, Column::Size), CellValue::Loading);
    assert_eq!(model.load_pending(), 1);
    assert!(matches!(model.data(130, Column::Size), CellValue::Text(_)));

    // Only the covering batch loaded.
    let stats = model.stats();
    assert_eq!(stats.loaded_batches, 1);
    assert!(stats.entries <= 50);
}

#[test]
fn prefetch_around_viewport_is_idempotent() {
    let dir = populated_dir(200);
    let mut model = RowModel::new(RowModelConfig {
        batch_size: 50,
        fetch_distance: 5,
        ..RowModelConfig::default()
    });
    model.set_root(dir.path()).expect("set_root");

    model.prefetch(45, 55); // rows 40..=60 -> batches 0 and 1
    let stats = model.stats();
    assert_eq!(stats.loaded_batches, 2);
    let entries = stats.entries;

    // Same range again: fully covered, no additional work.
    model.prefetch(45, 55);
    let stats = model.stats();
    assert_eq!(stats.loaded_batches, 2);
    assert_eq!(stats.entries, entries);
}

#[test]
fn sort_by_modified_orders_entire_listing() {
    let dir = populated_dir(60);
    let mut model = RowModel::new(RowModelConfig {
        batch_size: 25,
        ..RowModelConfig::default()
    });
    model.set_root(dir.path()).expect("set_root");

    model.sort(Column::Size, false);
    // Smallest first; sizes cycle with period 37, so the smallest is 1 byte.
    let info = model.file_info(0).expect("info");
    assert_eq!(info.size_bytes, 1);
    let last = model.file_info(model.row_count() - 1).expect("info");
    assert_eq!(last.size_bytes, 37);
}

#[test]
fn hit_rate_reflects_cache_usage() {
    let dir = populated_dir(20);
    let mut model = RowModel::new(RowModelConfig {
        batch_size: 10,
        ..RowModelConfig::default()
    });
    model.set_root(dir.path()).expect("set_root");

    assert_eq!(model.data(3, Column::Kind), CellValue::Loading); // miss
    model.load_pending();
    for _ in 0..4 {
        assert!(matches!(model.data(3, Column::Kind), CellValue::Text(_)));
    }
    let stats = model.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 4);
    assert!((stats.hit_rate - 0.8).abs() < 1e-9);
}
