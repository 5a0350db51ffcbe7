use std::time::Duration;

use envconfig::Envconfig;
use harvester_core::EngineConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Root of the paginated endpoint; pages are fetched as
    /// `{BASE_URL}?page={p}&limit={l}`.
    pub base_url: String,

    /// Site origin for the Origin/Referer headers, when known.
    pub origin: Option<String>,

    #[envconfig(default = "output")]
    pub output_dir: String,

    /// Known size of the collection; the default `--end` is derived from
    /// this and the page size.
    #[envconfig(default = "500000")]
    pub total_records: u64,

    #[envconfig(default = "45")]
    pub request_timeout_seconds: u64,

    #[envconfig(default = "500")]
    pub min_delay_ms: u64,

    #[envconfig(default = "2000")]
    pub max_delay_ms: u64,

    /// Mirror each page payload into `pages/dump-page-{p}-{l}.json`.
    #[envconfig(default = "true")]
    pub write_page_files: bool,
}

impl Config {
    pub fn to_engine_config(&self, workers: usize) -> EngineConfig {
        let mut engine = EngineConfig::list_defaults(self.origin.clone());
        engine.workers = workers;
        engine.request_timeout = Duration::from_secs(self.request_timeout_seconds);
        engine.min_delay = Duration::from_millis(self.min_delay_ms);
        engine.max_delay = Duration::from_millis(self.max_delay_ms);
        engine
    }
}
