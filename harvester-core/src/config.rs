use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HarvestError;

/// Engine knobs shared by both stages. The stage binaries build one of
/// these from their env/flag config; see `Config::to_engine_config` in
/// each binary crate.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrency ceiling: at most this many requests in flight.
    pub workers: usize,
    /// Attempt budget per unit. Unsupported-fingerprint attempts do not
    /// count against it.
    pub max_retries: u32,
    /// Per-attempt clock on the HTTP request.
    pub request_timeout: Duration,
    /// Random inter-attempt delay bounds, sampled before every attempt.
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Whether the proxy rotation policy applies (detail stage).
    pub use_proxies: bool,
    /// When set, transient backoff is `attempt * step` (list stage);
    /// otherwise a sampled range is used.
    pub linear_backoff_step: Option<Duration>,
    /// Sleep bounds after an explicit rate limit (429 or 1015-style 403).
    pub rate_limit_backoff: (Duration, Duration),
    /// Sleep bounds after a plain 403 or an interstitial block.
    pub block_backoff: (Duration, Duration),
    /// Site origin for the `Origin`/`Referer` headers, when known.
    pub origin: Option<String>,
    /// Dual-write every record to `records/{id}.json` alongside the database.
    pub write_record_files: bool,
}

impl EngineConfig {
    pub const DEFAULT_LIST_WORKERS: usize = 10;
    pub const DEFAULT_DETAIL_WORKERS: usize = 50;
    pub const LIST_MAX_RETRIES: u32 = 4;
    pub const DETAIL_MAX_RETRIES: u32 = 3;

    /// Stock defaults for the paginated list sweep: proxyless, linear
    /// transient backoff.
    pub fn list_defaults(origin: Option<String>) -> Self {
        Self {
            workers: Self::DEFAULT_LIST_WORKERS,
            max_retries: Self::LIST_MAX_RETRIES,
            request_timeout: Duration::from_secs(45),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2000),
            use_proxies: false,
            linear_backoff_step: Some(Duration::from_secs(5)),
            rate_limit_backoff: (Duration::from_secs(30), Duration::from_secs(60)),
            block_backoff: (Duration::from_secs(5), Duration::from_secs(10)),
            origin,
            write_record_files: false,
        }
    }

    /// Defaults for the per-id detail stage: proxy rotation on, sampled
    /// transient backoff.
    pub fn detail_defaults(origin: Option<String>) -> Self {
        Self {
            workers: Self::DEFAULT_DETAIL_WORKERS,
            max_retries: Self::DETAIL_MAX_RETRIES,
            use_proxies: true,
            linear_backoff_step: None,
            write_record_files: true,
            ..Self::list_defaults(origin)
        }
    }
}

/// Everything the engine writes lives under one output root.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    root: PathBuf,
}

impl OutputPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("records.db")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    pub fn lists_dir(&self) -> PathBuf {
        self.root.join("lists")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join("progress_stats.json")
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.root.join("never_success_tls.json")
    }

    pub fn fingerprint_health_path(&self) -> PathBuf {
        self.root.join("impersonate_health.json")
    }

    pub fn page_dump_path(&self, page: u64, limit: u64) -> PathBuf {
        self.pages_dir().join(format!("dump-page-{page}-{limit}.json"))
    }

    /// Create the output tree, failing fast when the root is unwritable.
    pub fn ensure(&self) -> Result<(), HarvestError> {
        for dir in [
            self.root.clone(),
            self.lists_dir(),
            self.raw_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                HarvestError::Startup(format!(
                    "output directory {} is not writable: {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(())
    }
}
