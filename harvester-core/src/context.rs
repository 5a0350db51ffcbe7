use std::sync::Arc;

use crate::client::ClientFactory;
use crate::config::{EngineConfig, OutputPaths};
use crate::error::HarvestError;
use crate::ledger::LedgerSet;
use crate::registry::HealthRegistry;
use crate::sink::RecordSink;

/// Everything a worker needs to process a unit. Built once per run and
/// shared behind an `Arc`.
pub struct EngineContext {
    pub config: EngineConfig,
    pub paths: OutputPaths,
    pub factory: Arc<dyn ClientFactory>,
    pub registry: Arc<HealthRegistry>,
    pub sink: RecordSink,
    pub ledgers: Arc<LedgerSet>,
}

impl EngineContext {
    pub async fn create(
        config: EngineConfig,
        paths: OutputPaths,
        factory: Arc<dyn ClientFactory>,
        proxies: Vec<String>,
    ) -> Result<Self, HarvestError> {
        paths.ensure()?;

        let registry = Arc::new(HealthRegistry::open(
            paths.blacklist_path(),
            paths.fingerprint_health_path(),
            proxies,
        )?);

        let records_dir = config.write_record_files.then(|| paths.records_dir());
        let sink = RecordSink::connect(&paths.db_path(), records_dir).await?;
        let ledgers = Arc::new(LedgerSet::open(paths.lists_dir())?);

        Ok(Self {
            config,
            paths,
            factory,
            registry,
            sink,
            ledgers,
        })
    }
}
