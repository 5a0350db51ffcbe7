use std::path::PathBuf;

use thiserror::Error;

/// Process-fatal errors. Everything recoverable (rate limits, blocks,
/// transport hiccups) is absorbed inside the worker retry loop as an
/// [`crate::Outcome`] and never surfaces here.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(
        "no usable TLS profiles remain; delete {0} to re-enable blacklisted profiles \
         or upgrade the TLS backend"
    )]
    FingerprintPoolEmpty(PathBuf),

    // We failed doing some kind of setup, like an unwritable output
    // directory or a missing mandatory input file.
    #[error("error during startup: {0}")]
    Startup(String),
}
