//! Periodic progress snapshots for live observability. The ledgers stay
//! authoritative for crash recovery; the snapshot is for watching a run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::HarvestError;
use crate::health::FingerprintHealth;
use crate::ledger::LedgerSet;
use crate::registry::{HealthRegistry, Stats};

pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct ProxySnapshot {
    pub success_count: u64,
    pub consecutive_failures: u32,
    pub blacklisted: bool,
    pub recent_errors: usize,
}

#[derive(Debug, Serialize)]
pub struct RateLimitSnapshot {
    pub proxyless_rate_limited: bool,
    pub recheck_in_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ProgressSnapshot {
    pub timestamp: DateTime<Utc>,
    pub stats: Stats,
    pub fingerprints: BTreeMap<String, FingerprintHealth>,
    pub blacklisted: Vec<String>,
    pub proxies: BTreeMap<String, ProxySnapshot>,
    pub rate_limit: RateLimitSnapshot,
}

pub fn write_snapshot(
    registry: &HealthRegistry,
    ledgers: &LedgerSet,
    path: &Path,
) -> Result<(), HarvestError> {
    let snapshot = registry.snapshot();
    std::fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
    ledgers.flush_json()?;
    Ok(())
}

/// Spawn the background flusher. Aborted by the caller once the run is
/// done; the dispatcher writes a final snapshot itself.
pub fn spawn_flusher(
    registry: Arc<HealthRegistry>,
    ledgers: Arc<LedgerSet>,
    path: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FLUSH_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so startup does
        // not race directory creation.
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(e) = write_snapshot(&registry, &ledgers, &path) {
                warn!("failed to flush progress snapshot: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_counters_and_maps() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HealthRegistry::open(
            dir.path().join("never_success_tls.json"),
            dir.path().join("impersonate_health.json"),
            vec!["http://10.0.0.9:3128".to_string()],
        )
        .unwrap();
        let ledgers = LedgerSet::open(dir.path().join("lists")).unwrap();
        registry.record_total();
        registry.record_success_unit();

        let path = dir.path().join("progress_stats.json");
        write_snapshot(&registry, &ledgers, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["stats"]["total"], 1);
        assert_eq!(value["stats"]["success"], 1);
        assert!(value["proxies"]["http://10.0.0.9:3128"].is_object());
        assert_eq!(value["rate_limit"]["proxyless_rate_limited"], false);
        assert!(value["timestamp"].is_string());
    }
}
