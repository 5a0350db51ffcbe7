use serde::{Deserialize, Serialize};

/// Transport-layer failure buckets, named after the libcurl error codes the
/// CDN ecosystem reports them as. Anything in the connection-failure set
/// gets the proxy that produced it blacklisted on the spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCode {
    /// Could not reach the origin at all (curl 7).
    CouldntConnect,
    /// TLS handshake failed (curl 35).
    TlsHandshake,
    /// Connection dropped mid-transfer (curl 56).
    ConnectionReset,
    /// Any other transport-level failure.
    Other,
}

impl TransportCode {
    pub fn as_curl_code(&self) -> u32 {
        match self {
            TransportCode::CouldntConnect => 7,
            TransportCode::TlsHandshake => 35,
            TransportCode::ConnectionReset => 56,
            TransportCode::Other => 0,
        }
    }

    /// The codes that indicate the connection itself is broken, as opposed
    /// to the origin misbehaving once reached.
    pub fn is_connection_failure(&self) -> bool {
        !matches!(self, TransportCode::Other)
    }
}

/// The classified result of a single fetch attempt. The retry loop is a
/// flat state machine over these; no attempt outcome is ever raised as an
/// error past the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 200 with a JSON object body and no interstitial markers.
    Success(Vec<u8>),
    /// Explicit rate limiting: 429, or a 403 carrying CDN block markers.
    RateLimited { status: u16 },
    /// Anti-bot interstitial without an explicit rate-limit status.
    Blocked,
    /// Transport-level failure that is not a timeout.
    TransportError { code: TransportCode },
    /// The attempt ran out its per-request clock.
    Timeout,
    /// The runtime cannot emit the ClientHello for the chosen profile.
    /// Retry-free: the profile is blacklisted and the attempt is not
    /// counted against the unit's budget.
    FingerprintUnsupported,
    /// A status the origin will keep returning; retrying is pointless.
    PermanentFailure { status: u16, snippet: String },
}

impl Outcome {
    /// Short label for ledgers, metrics and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::RateLimited { .. } => "rate_limited",
            Outcome::Blocked => "blocked",
            Outcome::TransportError { .. } => "transport_error",
            Outcome::Timeout => "timeout",
            Outcome::FingerprintUnsupported => "fingerprint_unsupported",
            Outcome::PermanentFailure { .. } => "permanent_failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
