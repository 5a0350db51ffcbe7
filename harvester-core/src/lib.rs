// We do this pattern (privately use a module, then re-export parts of it)
// so we can refactor the internals without breaking the stage binaries.

// Outcomes and classification
mod classify;
mod outcome;
pub use classify::{classify_response, classify_transport, error_chain_text};
pub use outcome::{Outcome, TransportCode};

// TLS profiles and client construction
mod client;
mod profiles;
pub use client::{rotating_headers, BrowserClientFactory, ClientBuildError, ClientFactory};
pub use profiles::TlsProfile;

// Health tracking
mod health;
mod registry;
pub use health::{FingerprintHealth, ProxyHealth, RateLimitState};
pub use registry::{HealthRegistry, Stats};

// Work model
mod queue;
pub use queue::{Unit, WorkQueue};

// Persistence
mod ledger;
mod sink;
pub use ledger::{write_raw_dump, Category, LedgerSet};
pub use sink::RecordSink;

// Progress snapshots
mod progress;
pub use progress::{write_snapshot, ProgressSnapshot, ProxySnapshot, RateLimitSnapshot};

// Engine
mod context;
mod dispatcher;
mod worker;
pub use context::EngineContext;
pub use dispatcher::run_engine;

// Inputs and configuration
mod config;
mod proxies;
pub use config::{EngineConfig, OutputPaths};
pub use proxies::load_proxy_lists;

pub mod metrics_constants;

// Errors
mod error;
pub use error::HarvestError;
