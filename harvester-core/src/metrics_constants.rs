// Metric names
pub const WORKER_SATURATION: &str = "harvester_worker_saturation_percent";
pub const UNITS_COMPLETED: &str = "harvester_units_completed";
pub const UNITS_SKIPPED: &str = "harvester_units_skipped";
pub const ATTEMPTS_TOTAL: &str = "harvester_attempts_total";
pub const ATTEMPT_DURATION: &str = "harvester_attempt_duration_seconds";
pub const RETRIES_TOTAL: &str = "harvester_retries_total";
pub const FINGERPRINTS_BLACKLISTED: &str = "harvester_fingerprints_blacklisted";
pub const PROXIES_BLACKLISTED: &str = "harvester_proxies_blacklisted";

// Label keys
pub const OUTCOME_LABEL: &str = "outcome";
pub const TERMINAL_LABEL: &str = "terminal";
