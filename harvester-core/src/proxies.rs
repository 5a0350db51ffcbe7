//! Proxy-list input. An external process maintains the files; we read
//! them at startup. A missing primary list just means an empty pool (the
//! proxy policy falls back to proxyless), but a malformed file is loud.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::error::HarvestError;

pub fn load_proxy_lists(
    primary: &Path,
    premium: Option<&Path>,
) -> Result<Vec<String>, HarvestError> {
    let mut proxies = read_list(primary)?;
    if let Some(path) = premium {
        proxies.extend(read_list(path)?);
    }

    let mut seen = HashSet::new();
    proxies.retain(|url| seen.insert(url.clone()));

    info!(count = proxies.len(), "loaded proxy pool");
    Ok(proxies)
}

fn read_list(path: &Path) -> Result<Vec<String>, HarvestError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)?;
    let urls: Vec<String> = serde_json::from_slice(&bytes)?;
    Ok(urls)
}
