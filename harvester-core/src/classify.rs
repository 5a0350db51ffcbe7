//! Pure classification of fetch attempts into [`Outcome`]s.
//!
//! Both functions here are pure: identical inputs always map to identical
//! outcomes. The worker converts `reqwest` errors to text before calling
//! in, so the rules stay testable without a live transport.

use http::StatusCode;

use crate::outcome::{Outcome, TransportCode};

/// Body fragments the CDN substitutes for the real JSON when it suspects
/// automation. Matched case-insensitively, under any status code.
const INTERSTITIAL_MARKERS: &[&str] = &["just a moment", "error code: 1015", "rate limited", "1015"];

/// Error-text fragments for a ClientHello profile the runtime cannot emit.
const UNSUPPORTED_MARKERS: &[&str] = &["not supported", "unknown impersonate target"];

const CONNECT_MARKERS: &[&str] = &[
    "error trying to connect",
    "connection refused",
    "failed to connect",
    "couldn't connect",
    "dns error",
];

const TLS_MARKERS: &[&str] = &["tls", "ssl", "handshake", "certificate"];

const RESET_MARKERS: &[&str] = &["connection reset", "reset by peer", "broken pipe"];

const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout"];

/// Maximum body prefix carried into a `PermanentFailure` for the raw dump.
const SNIPPET_LEN: usize = 500;

/// Classify a transport-level failure from its rendered error chain.
///
/// `timed_out` carries the client's own timeout flag, since some backends
/// report timeouts with text that never mentions the word.
pub fn classify_transport(error_text: &str, timed_out: bool) -> Outcome {
    let lower = error_text.to_ascii_lowercase();

    if contains_any(&lower, UNSUPPORTED_MARKERS) {
        return Outcome::FingerprintUnsupported;
    }

    // TLS before generic connect: a failed handshake usually renders as
    // "error trying to connect: ... tls ..." and must land in curl-35.
    if contains_any(&lower, TLS_MARKERS) {
        return Outcome::TransportError {
            code: TransportCode::TlsHandshake,
        };
    }
    if contains_any(&lower, RESET_MARKERS) {
        return Outcome::TransportError {
            code: TransportCode::ConnectionReset,
        };
    }
    if contains_any(&lower, CONNECT_MARKERS) {
        return Outcome::TransportError {
            code: TransportCode::CouldntConnect,
        };
    }

    if timed_out || contains_any(&lower, TIMEOUT_MARKERS) {
        return Outcome::Timeout;
    }

    Outcome::TransportError {
        code: TransportCode::Other,
    }
}

/// Classify a completed HTTP exchange.
pub fn classify_response(status: StatusCode, body: &[u8]) -> Outcome {
    let text = String::from_utf8_lossy(body);
    let has_markers = contains_any(&text.to_ascii_lowercase(), INTERSTITIAL_MARKERS);

    if status == StatusCode::OK {
        if has_markers {
            return Outcome::Blocked;
        }
        if is_json_object(body) {
            Outcome::Success(body.to_vec())
        } else {
            // A 200 that is not the JSON document is an interstitial
            // even when the known markers are absent.
            Outcome::Blocked
        }
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Outcome::RateLimited {
            status: status.as_u16(),
        }
    } else if status == StatusCode::FORBIDDEN {
        if has_markers {
            // The CDN serves its block page under 403; treat it as a
            // rate signal rather than a plain block.
            Outcome::RateLimited {
                status: status.as_u16(),
            }
        } else {
            Outcome::Blocked
        }
    } else {
        Outcome::PermanentFailure {
            status: status.as_u16(),
            snippet: snippet(&text),
        }
    }
}

/// Render an error and its source chain into one searchable line.
pub fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn is_json_object(body: &[u8]) -> bool {
    matches!(
        serde_json::from_slice::<serde_json::Value>(body),
        Ok(serde_json::Value::Object(_))
    )
}

fn snippet(text: &str) -> String {
    let mut end = text.len().min(SNIPPET_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
