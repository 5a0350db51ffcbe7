//! The closed set of browser builds the client factory can present itself
//! as. Labels follow the impersonation-library convention (family +
//! version, lowercase) so the on-disk blacklist stays portable across
//! backends.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsProfile {
    Chrome110,
    Chrome116,
    Chrome119,
    Chrome120,
    Chrome123,
    Edge99,
    Edge101,
    Safari15_3,
    Safari15_5,
    Safari17_0,
}

impl TlsProfile {
    pub const ALL: [TlsProfile; 10] = [
        TlsProfile::Chrome110,
        TlsProfile::Chrome116,
        TlsProfile::Chrome119,
        TlsProfile::Chrome120,
        TlsProfile::Chrome123,
        TlsProfile::Edge99,
        TlsProfile::Edge101,
        TlsProfile::Safari15_3,
        TlsProfile::Safari15_5,
        TlsProfile::Safari17_0,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsProfile::Chrome110 => "chrome110",
            TlsProfile::Chrome116 => "chrome116",
            TlsProfile::Chrome119 => "chrome119",
            TlsProfile::Chrome120 => "chrome120",
            TlsProfile::Chrome123 => "chrome123",
            TlsProfile::Edge99 => "edge99",
            TlsProfile::Edge101 => "edge101",
            TlsProfile::Safari15_3 => "safari15_3",
            TlsProfile::Safari15_5 => "safari15_5",
            TlsProfile::Safari17_0 => "safari17_0",
        }
    }

    pub fn from_label(label: &str) -> Option<TlsProfile> {
        TlsProfile::ALL
            .iter()
            .copied()
            .find(|profile| profile.as_str() == label)
    }

    /// The User-Agent presented alongside the profile's ClientHello. The
    /// header shape and the TLS shape have to agree or the CDN scores the
    /// request as automation.
    pub fn user_agent(&self) -> &'static str {
        match self {
            TlsProfile::Chrome110 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36"
            }
            TlsProfile::Chrome116 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36"
            }
            TlsProfile::Chrome119 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36"
            }
            TlsProfile::Chrome120 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            }
            TlsProfile::Chrome123 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36"
            }
            TlsProfile::Edge99 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/99.0.4844.51 Safari/537.36 Edg/99.0.1150.36"
            }
            TlsProfile::Edge101 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/101.0.4951.64 Safari/537.36 Edg/101.0.1210.47"
            }
            TlsProfile::Safari15_3 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/15.3 Safari/605.1.15"
            }
            TlsProfile::Safari15_5 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/15.5 Safari/605.1.15"
            }
            TlsProfile::Safari17_0 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.0 Safari/605.1.15"
            }
        }
    }

    /// Chromium builds send client-hint brand headers; Safari does not.
    pub fn sec_ch_ua(&self) -> Option<&'static str> {
        match self {
            TlsProfile::Chrome110 => {
                Some(r#""Chromium";v="110", "Not A(Brand";v="24", "Google Chrome";v="110""#)
            }
            TlsProfile::Chrome116 => {
                Some(r#""Chromium";v="116", "Not)A;Brand";v="24", "Google Chrome";v="116""#)
            }
            TlsProfile::Chrome119 => {
                Some(r#""Google Chrome";v="119", "Chromium";v="119", "Not?A_Brand";v="24""#)
            }
            TlsProfile::Chrome120 => {
                Some(r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#)
            }
            TlsProfile::Chrome123 => {
                Some(r#""Google Chrome";v="123", "Not:A-Brand";v="8", "Chromium";v="123""#)
            }
            TlsProfile::Edge99 => {
                Some(r#"" Not A;Brand";v="99", "Chromium";v="99", "Microsoft Edge";v="99""#)
            }
            TlsProfile::Edge101 => {
                Some(r#"" Not A;Brand";v="99", "Chromium";v="101", "Microsoft Edge";v="101""#)
            }
            TlsProfile::Safari15_3 | TlsProfile::Safari15_5 | TlsProfile::Safari17_0 => None,
        }
    }
}

impl fmt::Display for TlsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for profile in TlsProfile::ALL {
            assert_eq!(TlsProfile::from_label(profile.as_str()), Some(profile));
        }
        assert_eq!(TlsProfile::from_label("netscape4"), None);
    }

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<&str> = TlsProfile::ALL.iter().map(|p| p.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), TlsProfile::ALL.len());
    }
}
