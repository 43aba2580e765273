//! Cache statistics and their optional on-disk record.
//!
//! Only counters are ever persisted — never content. The on-disk format is
//! a self-describing JSON record `{created_at, stats{…}}`; load and save
//! are best effort and must not fail the process.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Monotonic counters plus current occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_accesses: u64,
    pub total_loaded_bytes: u64,
    pub total_saved_bytes: u64,
    pub current_bytes: u64,
    pub current_count: u64,
}

impl CacheStats {
    /// `hits / max(total_accesses, 1)` as a ratio in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        self.hits as f64 / (self.total_accesses.max(1)) as f64
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StatsRecord {
    created_at: String,
    stats: CacheStats,
}

fn rfc3339_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Best-effort load of a persisted stats record. Occupancy fields are
/// reset; only the monotonic counters carry over.
pub(crate) fn load_stats(path: &Path) -> Option<CacheStats> {
    if !path.exists() {
        return None;
    }
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to read cache stats");
            return None;
        }
    };
    match serde_json::from_str::<StatsRecord>(&data) {
        Ok(record) => {
            let mut stats = record.stats;
            stats.current_bytes = 0;
            stats.current_count = 0;
            Some(stats)
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to parse cache stats");
            None
        }
    }
}

/// Best-effort save of the stats record.
pub(crate) fn save_stats(path: &Path, stats: &CacheStats) {
    let record = StatsRecord {
        created_at: rfc3339_now(),
        stats: stats.clone(),
    };
    let json = match serde_json::to_string_pretty(&record) {
        Ok(json) => json,
        Err(err) => {
            warn!(%err, "failed to serialize cache stats");
            return;
        }
    };
    if let Err(err) = std::fs::write(path, json) {
        warn!(path = %path.display(), %err, "failed to write cache stats");
    }
}
