use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use harvester_core::{
    BrowserClientFactory, ClientBuildError, ClientFactory, EngineConfig, EngineContext,
    OutputPaths, TlsProfile, Unit,
};

/// Engine config with every sleep zeroed so scenarios run instantly.
pub fn fast_config(workers: usize, max_retries: u32, use_proxies: bool) -> EngineConfig {
    EngineConfig {
        workers,
        max_retries,
        request_timeout: Duration::from_secs(5),
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        use_proxies,
        linear_backoff_step: Some(Duration::ZERO),
        rate_limit_backoff: (Duration::ZERO, Duration::ZERO),
        block_backoff: (Duration::ZERO, Duration::ZERO),
        origin: None,
        write_record_files: false,
    }
}

pub async fn test_context(
    dir: &Path,
    config: EngineConfig,
    proxies: Vec<String>,
) -> Arc<EngineContext> {
    let factory = Arc::new(BrowserClientFactory::new(config.request_timeout, None));
    test_context_with_factory(dir, config, factory, proxies).await
}

pub async fn test_context_with_factory(
    dir: &Path,
    config: EngineConfig,
    factory: Arc<dyn ClientFactory>,
    proxies: Vec<String>,
) -> Arc<EngineContext> {
    Arc::new(
        EngineContext::create(config, OutputPaths::new(dir), factory, proxies)
            .await
            .expect("failed to create engine context"),
    )
}

pub fn unit(id: &str, url: String) -> Unit {
    Unit {
        id: id.to_string(),
        url,
        dump_path: None,
    }
}

/// A factory that refuses every profile except one, standing in for a
/// TLS backend that cannot emit most ClientHello shapes.
pub struct SingleProfileFactory {
    supported: TlsProfile,
    inner: BrowserClientFactory,
}

impl SingleProfileFactory {
    pub fn new(supported: TlsProfile, timeout: Duration) -> Self {
        Self {
            supported,
            inner: BrowserClientFactory::new(timeout, None),
        }
    }
}

impl ClientFactory for SingleProfileFactory {
    fn build(
        &self,
        profile: TlsProfile,
        proxy: Option<&str>,
    ) -> Result<reqwest::Client, ClientBuildError> {
        if profile != self.supported {
            return Err(ClientBuildError::UnsupportedProfile(profile.as_str()));
        }
        self.inner.build(profile, proxy)
    }
}
