//! Per-resource health state: fingerprint counters (persisted across
//! runs) and proxy counters (memory-only, one process run).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::outcome::{Outcome, TransportCode};

/// Rolling error window consulted by proxy selection.
pub const PROXY_ERROR_WINDOW: Duration = Duration::from_secs(30);
/// More errors than this inside the window makes a proxy unselectable.
pub const PROXY_ERROR_WINDOW_LIMIT: usize = 3;
/// Unproven proxies get this many consecutive failures before blacklist.
pub const PROXY_STRIKE_LIMIT: u32 = 2;

/// Lifetime counters for one TLS profile. Serialized as-is into
/// `impersonate_health.json` and reloaded at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintHealth {
    pub success_count: u64,
    pub fail_count: u64,
    pub consecutive_failures: u32,
    pub ever_succeeded: bool,
    pub block: u64,
    pub exception: u64,
    pub timeout: u64,
    pub rate_limited: u64,
    pub curl_7: u64,
    pub curl_35: u64,
    pub curl_56: u64,
}

impl FingerprintHealth {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success(_) => {
                self.success_count += 1;
                self.consecutive_failures = 0;
                self.ever_succeeded = true;
            }
            Outcome::RateLimited { .. } => {
                self.fail_count += 1;
                self.consecutive_failures += 1;
                self.rate_limited += 1;
            }
            Outcome::Blocked => {
                self.fail_count += 1;
                self.consecutive_failures += 1;
                self.block += 1;
            }
            Outcome::Timeout => {
                self.fail_count += 1;
                self.consecutive_failures += 1;
                self.timeout += 1;
            }
            Outcome::TransportError { code } => {
                self.fail_count += 1;
                self.consecutive_failures += 1;
                match code {
                    TransportCode::CouldntConnect => self.curl_7 += 1,
                    TransportCode::TlsHandshake => self.curl_35 += 1,
                    TransportCode::ConnectionReset => self.curl_56 += 1,
                    TransportCode::Other => self.exception += 1,
                }
            }
            Outcome::PermanentFailure { .. } => {
                self.fail_count += 1;
                self.consecutive_failures += 1;
                self.exception += 1;
            }
            // Counted at the pool level (blacklist), not per attempt.
            Outcome::FingerprintUnsupported => {}
        }
    }
}

/// Runtime state for one proxy endpoint. Never persisted.
#[derive(Debug)]
pub struct ProxyHealth {
    pub url: String,
    recent_errors: VecDeque<Instant>,
    pub consecutive_failures: u32,
    pub success_count: u64,
    pub blacklisted: bool,
}

impl ProxyHealth {
    pub fn new(url: String) -> Self {
        Self {
            url,
            recent_errors: VecDeque::new(),
            consecutive_failures: 0,
            success_count: 0,
            blacklisted: false,
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.recent_errors.push_back(now);
        self.trim_window(now);
        // Two strikes with nothing ever delivered: not worth a third try.
        if self.consecutive_failures >= PROXY_STRIKE_LIMIT && self.success_count == 0 {
            self.blacklisted = true;
        }
    }

    pub fn errors_in_window(&mut self, now: Instant) -> usize {
        self.trim_window(now);
        self.recent_errors.len()
    }

    pub fn is_selectable(&mut self, now: Instant) -> bool {
        if self.blacklisted {
            return false;
        }
        if self.consecutive_failures >= PROXY_STRIKE_LIMIT && self.success_count == 0 {
            self.blacklisted = true;
            return false;
        }
        self.errors_in_window(now) <= PROXY_ERROR_WINDOW_LIMIT
    }

    fn trim_window(&mut self, now: Instant) {
        while let Some(oldest) = self.recent_errors.front() {
            if now.duration_since(*oldest) > PROXY_ERROR_WINDOW {
                self.recent_errors.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Whether proxyless requests are currently believed to be rate limited,
/// and when it is worth probing without a proxy again.
#[derive(Debug, Default)]
pub struct RateLimitState {
    pub proxyless_rate_limited: bool,
    pub next_recheck: Option<Instant>,
}

impl RateLimitState {
    /// True while proxyless attempts should be withheld.
    pub fn proxyless_blocked(&self, now: Instant) -> bool {
        if !self.proxyless_rate_limited {
            return false;
        }
        match self.next_recheck {
            Some(recheck) => now < recheck,
            None => true,
        }
    }
}
