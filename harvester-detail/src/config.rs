use std::time::Duration;

use envconfig::Envconfig;
use harvester_core::EngineConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Root of the record endpoint; documents are fetched as
    /// `{BASE_URL}/{id}`.
    pub base_url: String,

    /// Site origin for the Origin/Referer headers, when known.
    pub origin: Option<String>,

    #[envconfig(default = "output")]
    pub output_dir: String,

    /// Id-column export produced by the list-stage consumer. Mandatory:
    /// without it there is nothing to fetch.
    #[envconfig(default = "contract_ids.csv")]
    pub ids_file: String,

    #[envconfig(default = "50")]
    pub workers: usize,

    #[envconfig(default = "45")]
    pub request_timeout_seconds: u64,

    #[envconfig(default = "500")]
    pub min_delay_ms: u64,

    #[envconfig(default = "2000")]
    pub max_delay_ms: u64,

    /// Mirror each record into `records/{id}.json` alongside the db.
    #[envconfig(default = "true")]
    pub write_record_files: bool,

    #[envconfig(default = "free_proxies.json")]
    pub proxy_file: String,

    #[envconfig(default = "premium_proxies.json")]
    pub premium_proxy_file: String,
}

impl Config {
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::detail_defaults(self.origin.clone());
        engine.workers = self.workers;
        engine.request_timeout = Duration::from_secs(self.request_timeout_seconds);
        engine.min_delay = Duration::from_millis(self.min_delay_ms);
        engine.max_delay = Duration::from_millis(self.max_delay_ms);
        engine.write_record_files = self.write_record_files;
        engine
    }
}
