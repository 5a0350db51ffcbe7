//! The health registry: one lock over fingerprint health, proxy health,
//! the proxyless rate-limit gate and the global counters.
//!
//! The lock is held for counter updates only, never across I/O; file
//! persistence serializes under the lock and writes after releasing it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::HarvestError;
use crate::health::{FingerprintHealth, ProxyHealth, RateLimitState};
use crate::metrics_constants::PROXIES_BLACKLISTED;
use crate::outcome::Outcome;
use crate::profiles::TlsProfile;
use crate::progress::{ProgressSnapshot, ProxySnapshot, RateLimitSnapshot};

/// A profile that has never succeeded and failed this many times in a row
/// is demoted for the rest of the run (but not blacklisted on disk).
const DEMOTE_STREAK: u32 = 10;

/// Global run counters, flushed into the progress snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub success: u64,
    pub fail: u64,
    pub blocked: u64,
    pub exception: u64,
    pub retries: u64,
    pub skipped: u64,
}

#[derive(Debug)]
struct Inner {
    active: Vec<TlsProfile>,
    fingerprints: HashMap<String, FingerprintHealth>,
    blacklist: BTreeSet<String>,
    proxies: Vec<ProxyHealth>,
    rate_limit: RateLimitState,
    stats: Stats,
}

#[derive(Debug)]
pub struct HealthRegistry {
    inner: Mutex<Inner>,
    blacklist_path: PathBuf,
    health_path: PathBuf,
}

impl HealthRegistry {
    /// Load persisted fingerprint state and seed the proxy pool. Fails
    /// when every known profile is already blacklisted; the operator has
    /// to delete the blacklist file to recover.
    pub fn open(
        blacklist_path: PathBuf,
        health_path: PathBuf,
        proxies: Vec<String>,
    ) -> Result<Self, HarvestError> {
        let blacklist = load_blacklist(&blacklist_path)?;
        let fingerprints = load_health(&health_path)?;

        let active: Vec<TlsProfile> = TlsProfile::ALL
            .iter()
            .copied()
            .filter(|profile| !blacklist.contains(profile.as_str()))
            .collect();

        if active.is_empty() {
            return Err(HarvestError::FingerprintPoolEmpty(blacklist_path));
        }

        if !blacklist.is_empty() {
            info!(
                blacklisted = blacklist.len(),
                active = active.len(),
                "loaded fingerprint blacklist"
            );
        }

        let proxies = proxies.into_iter().map(ProxyHealth::new).collect();

        Ok(Self {
            inner: Mutex::new(Inner {
                active,
                fingerprints,
                blacklist,
                proxies,
                rate_limit: RateLimitState::default(),
                stats: Stats::default(),
            }),
            blacklist_path,
            health_path,
        })
    }

    /// Uniform pick over the active pool. Errors when the pool has been
    /// emptied by blacklisting and demotion; that is process-fatal.
    pub fn pick_fingerprint(&self) -> Result<TlsProfile, HarvestError> {
        let inner = self.inner.lock().expect("health registry lock poisoned");
        inner
            .active
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or_else(|| HarvestError::FingerprintPoolEmpty(self.blacklist_path.clone()))
    }

    pub fn report_fingerprint(&self, profile: TlsProfile, outcome: &Outcome) {
        let mut inner = self.inner.lock().expect("health registry lock poisoned");
        let health = inner
            .fingerprints
            .entry(profile.as_str().to_string())
            .or_default();
        health.record(outcome);

        let demote =
            !health.ever_succeeded && health.consecutive_failures >= DEMOTE_STREAK;
        if demote && inner.active.len() > 1 {
            inner.active.retain(|p| *p != profile);
            warn!(profile = %profile, "demoted fingerprint for this run");
        }
    }

    /// Permanently exclude a profile the backend cannot emit. The pool is
    /// updated and the on-disk blacklist rewritten before returning, so
    /// no later pick can observe the stale pool.
    pub fn blacklist_fingerprint(&self, profile: TlsProfile) -> Result<(), HarvestError> {
        let (blacklist_json, health_json) = {
            let mut inner = self.inner.lock().expect("health registry lock poisoned");
            inner.active.retain(|p| *p != profile);
            inner.blacklist.insert(profile.as_str().to_string());
            (
                serde_json::to_vec_pretty(&inner.blacklist)?,
                serde_json::to_vec_pretty(&ordered(&inner.fingerprints))?,
            )
        };
        warn!(profile = %profile, "blacklisted fingerprint (ClientHello unsupported)");
        std::fs::write(&self.blacklist_path, blacklist_json)?;
        std::fs::write(&self.health_path, health_json)?;
        Ok(())
    }

    /// Write the blacklist and health counters out. Called at shutdown;
    /// `blacklist_fingerprint` also writes eagerly.
    pub fn persist(&self) -> Result<(), HarvestError> {
        let (blacklist_json, health_json) = {
            let inner = self.inner.lock().expect("health registry lock poisoned");
            (
                serde_json::to_vec_pretty(&inner.blacklist)?,
                serde_json::to_vec_pretty(&ordered(&inner.fingerprints))?,
            )
        };
        std::fs::write(&self.blacklist_path, blacklist_json)?;
        std::fs::write(&self.health_path, health_json)?;
        Ok(())
    }

    /// Pick a proxy: skip blacklisted and recently-noisy endpoints,
    /// prefer ones that have delivered before. None when the pool is
    /// exhausted; the caller falls back to proxyless.
    pub fn pick_proxy(&self) -> Option<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("health registry lock poisoned");

        let mut proven: Vec<usize> = Vec::new();
        let mut unproven: Vec<usize> = Vec::new();
        for (idx, proxy) in inner.proxies.iter_mut().enumerate() {
            if !proxy.is_selectable(now) {
                continue;
            }
            if proxy.success_count > 0 {
                proven.push(idx);
            } else {
                unproven.push(idx);
            }
        }

        let pool = if proven.is_empty() { &unproven } else { &proven };
        let idx = pool.choose(&mut rand::thread_rng()).copied()?;
        Some(inner.proxies[idx].url.clone())
    }

    pub fn report_proxy(&self, url: &str, outcome: &Outcome) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("health registry lock poisoned");
        let Some(proxy) = inner.proxies.iter_mut().find(|p| p.url == url) else {
            return;
        };
        match outcome {
            Outcome::Success(_) => proxy.record_success(),
            Outcome::TransportError { code } if code.is_connection_failure() => {
                proxy.record_failure(now);
                proxy.blacklisted = true;
                metrics::counter!(PROXIES_BLACKLISTED).increment(1);
                warn!(proxy = url, code = code.as_curl_code(), "blacklisted proxy");
            }
            Outcome::FingerprintUnsupported => {}
            _ => proxy.record_failure(now),
        }
    }

    /// True while the proxyless path is believed rate limited and the
    /// recheck interval has not elapsed.
    pub fn proxyless_blocked(&self, now: Instant) -> bool {
        let inner = self.inner.lock().expect("health registry lock poisoned");
        inner.rate_limit.proxyless_blocked(now)
    }

    pub fn set_proxyless_rate_limited(&self, recheck_at: Instant) {
        let mut inner = self.inner.lock().expect("health registry lock poisoned");
        inner.rate_limit.proxyless_rate_limited = true;
        inner.rate_limit.next_recheck = Some(recheck_at);
    }

    pub fn clear_proxyless_rate_limited(&self) {
        let mut inner = self.inner.lock().expect("health registry lock poisoned");
        inner.rate_limit.proxyless_rate_limited = false;
        inner.rate_limit.next_recheck = None;
    }

    pub fn record_total(&self) {
        self.with_stats(|s| s.total += 1);
    }

    pub fn record_success_unit(&self) {
        self.with_stats(|s| s.success += 1);
    }

    pub fn record_failed_unit(&self) {
        self.with_stats(|s| s.fail += 1);
    }

    pub fn record_blocked_unit(&self) {
        self.with_stats(|s| s.blocked += 1);
    }

    pub fn record_exception_unit(&self) {
        self.with_stats(|s| s.exception += 1);
    }

    pub fn record_retry(&self) {
        self.with_stats(|s| s.retries += 1);
    }

    pub fn record_skipped(&self) {
        self.with_stats(|s| s.skipped += 1);
    }

    pub fn stats(&self) -> Stats {
        let inner = self.inner.lock().expect("health registry lock poisoned");
        inner.stats.clone()
    }

    /// Pool view helpers, used by the engine and by tests.
    pub fn active_profiles(&self) -> Vec<TlsProfile> {
        let inner = self.inner.lock().expect("health registry lock poisoned");
        inner.active.clone()
    }

    pub fn is_blacklisted(&self, label: &str) -> bool {
        let inner = self.inner.lock().expect("health registry lock poisoned");
        inner.blacklist.contains(label)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("health registry lock poisoned");

        let fingerprints: BTreeMap<String, FingerprintHealth> = ordered(&inner.fingerprints);
        let blacklisted: Vec<String> = inner.blacklist.iter().cloned().collect();
        let rate_limit = RateLimitSnapshot {
            proxyless_rate_limited: inner.rate_limit.proxyless_rate_limited,
            recheck_in_secs: inner
                .rate_limit
                .next_recheck
                .and_then(|at| at.checked_duration_since(now))
                .map(|d| d.as_secs()),
        };
        let stats = inner.stats.clone();

        let proxies: BTreeMap<String, ProxySnapshot> = inner
            .proxies
            .iter_mut()
            .map(|proxy| {
                let snapshot = ProxySnapshot {
                    success_count: proxy.success_count,
                    consecutive_failures: proxy.consecutive_failures,
                    blacklisted: proxy.blacklisted,
                    recent_errors: proxy.errors_in_window(now),
                };
                (proxy.url.clone(), snapshot)
            })
            .collect();

        ProgressSnapshot {
            timestamp: chrono::Utc::now(),
            stats,
            fingerprints,
            blacklisted,
            proxies,
            rate_limit,
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut Stats)) {
        let mut inner = self.inner.lock().expect("health registry lock poisoned");
        f(&mut inner.stats);
    }
}

fn ordered(map: &HashMap<String, FingerprintHealth>) -> BTreeMap<String, FingerprintHealth> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn load_blacklist(path: &Path) -> Result<BTreeSet<String>, HarvestError> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn load_health(path: &Path) -> Result<HashMap<String, FingerprintHealth>, HarvestError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::TransportCode;

    fn registry_in(dir: &std::path::Path, proxies: Vec<String>) -> HealthRegistry {
        HealthRegistry::open(
            dir.join("never_success_tls.json"),
            dir.join("impersonate_health.json"),
            proxies,
        )
        .unwrap()
    }

    #[test]
    fn blacklisted_profile_is_never_picked_again() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), vec![]);

        registry
            .blacklist_fingerprint(TlsProfile::Chrome120)
            .unwrap();

        assert!(registry.is_blacklisted("chrome120"));
        for _ in 0..200 {
            assert_ne!(registry.pick_fingerprint().unwrap(), TlsProfile::Chrome120);
        }

        // The exclusion must survive a restart.
        let reloaded = registry_in(dir.path(), vec![]);
        assert!(reloaded.is_blacklisted("chrome120"));
        assert!(!reloaded.active_profiles().contains(&TlsProfile::Chrome120));
    }

    #[test]
    fn empty_pool_is_fatal_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let labels: Vec<&str> = TlsProfile::ALL.iter().map(|p| p.as_str()).collect();
        std::fs::write(
            dir.path().join("never_success_tls.json"),
            serde_json::to_vec(&labels).unwrap(),
        )
        .unwrap();

        let err = HealthRegistry::open(
            dir.path().join("never_success_tls.json"),
            dir.path().join("impersonate_health.json"),
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, HarvestError::FingerprintPoolEmpty(_)));
    }

    #[test]
    fn demotion_removes_a_never_successful_profile_from_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), vec![]);

        for _ in 0..DEMOTE_STREAK {
            registry.report_fingerprint(TlsProfile::Edge99, &Outcome::Blocked);
        }

        assert!(!registry.active_profiles().contains(&TlsProfile::Edge99));
        // Demotion is run-local: nothing lands on the blacklist file.
        assert!(!registry.is_blacklisted("edge99"));
    }

    #[test]
    fn connection_failures_blacklist_the_proxy_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), vec!["http://127.0.0.1:9999".into()]);

        registry.report_proxy(
            "http://127.0.0.1:9999",
            &Outcome::TransportError {
                code: TransportCode::CouldntConnect,
            },
        );
        assert_eq!(registry.pick_proxy(), None);
    }

    #[test]
    fn two_strikes_without_success_exclude_a_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), vec!["http://10.0.0.1:3128".into()]);

        registry.report_proxy("http://10.0.0.1:3128", &Outcome::Timeout);
        assert!(registry.pick_proxy().is_some());
        registry.report_proxy("http://10.0.0.1:3128", &Outcome::Blocked);
        assert_eq!(registry.pick_proxy(), None);
    }

    #[test]
    fn proven_proxies_are_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(
            dir.path(),
            vec![
                "http://10.0.0.1:3128".into(),
                "http://10.0.0.2:3128".into(),
            ],
        );

        registry.report_proxy("http://10.0.0.2:3128", &Outcome::Success(b"{}".to_vec()));
        for _ in 0..50 {
            assert_eq!(
                registry.pick_proxy().as_deref(),
                Some("http://10.0.0.2:3128")
            );
        }
    }

    #[test]
    fn proxyless_gate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path(), vec![]);
        let now = Instant::now();

        assert!(!registry.proxyless_blocked(now));
        registry.set_proxyless_rate_limited(now + std::time::Duration::from_secs(60));
        assert!(registry.proxyless_blocked(now));
        registry.clear_proxyless_rate_limited();
        assert!(!registry.proxyless_blocked(now));
    }
}
