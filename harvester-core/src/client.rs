//! Client construction, keyed on `(profile, proxy)`.
//!
//! Clients are cheap to build and are not pooled beyond the connection
//! reuse `reqwest` gives a single request. The factory is a trait so the
//! engine can run against a backend with real ClientHello impersonation,
//! or against a stub in tests; the default implementation expresses each
//! profile as far as `reqwest` can (header shape, user agent, content
//! encodings, TLS floor).

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use thiserror::Error;

use crate::profiles::TlsProfile;

#[derive(Error, Debug)]
pub enum ClientBuildError {
    /// The backend cannot emit the ClientHello for this profile. The
    /// worker maps this to [`crate::Outcome::FingerprintUnsupported`].
    #[error("profile {0} is not supported by this TLS backend")]
    UnsupportedProfile(&'static str),

    #[error("invalid proxy url {url}: {source}")]
    InvalidProxy {
        url: String,
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        profile: TlsProfile,
        proxy: Option<&str>,
    ) -> Result<reqwest::Client, ClientBuildError>;
}

/// Factory over `reqwest` with per-profile browser headers.
pub struct BrowserClientFactory {
    timeout: Duration,
    origin: Option<String>,
}

impl BrowserClientFactory {
    pub fn new(timeout: Duration, origin: Option<String>) -> Self {
        Self { timeout, origin }
    }

    fn constant_headers(&self, profile: TlsProfile) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-site"));
        if let Some(origin) = &self.origin {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert(header::ORIGIN, value);
            }
        }
        if let Some(brands) = profile.sec_ch_ua() {
            headers.insert("Sec-Ch-Ua", HeaderValue::from_static(brands));
            headers.insert("Sec-Ch-Ua-Mobile", HeaderValue::from_static("?0"));
        }
        headers
    }
}

impl ClientFactory for BrowserClientFactory {
    fn build(
        &self,
        profile: TlsProfile,
        proxy: Option<&str>,
    ) -> Result<reqwest::Client, ClientBuildError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(profile.user_agent())
            .default_headers(self.constant_headers(profile))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .timeout(self.timeout);

        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url).map_err(|source| {
                ClientBuildError::InvalidProxy {
                    url: url.to_string(),
                    source,
                }
            })?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(ClientBuildError::Build)
    }
}

/// The identity headers rotated per request, independent of the profile.
const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-US,en;q=0.9,fil;q=0.7",
    "en-PH,en;q=0.9",
    "en-GB,en-US;q=0.9,en;q=0.8",
];

const REFERER_PATHS: &[&str] = &["/", "/projects", "/search"];

/// Build the per-request header set: a randomly chosen `Accept-Language`
/// and, when the site origin is known, a randomly chosen `Referer`.
pub fn rotating_headers<R: Rng + ?Sized>(origin: Option<&str>, rng: &mut R) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let language = ACCEPT_LANGUAGES
        .choose(rng)
        .copied()
        .expect("accept-language set is non-empty");
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(language));

    if let Some(origin) = origin {
        let path = REFERER_PATHS
            .choose(rng)
            .copied()
            .expect("referer set is non-empty");
        let referer = format!("{}{}", origin.trim_end_matches('/'), path);
        if let Ok(value) = HeaderValue::from_str(&referer) {
            headers.insert(header::REFERER, value);
        }
    }

    headers
}
