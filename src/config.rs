use std::{net::IpAddr, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{core::device::DeepLinkStyle, poller::PollPolicy};

/// Behaviour of one [OrderController](crate::controller::OrderController).
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FlowConfig {
    /// Delay between two `collect` calls.
    pub poll_interval_ms: u64,
    /// Total time an order may stay pending before it is cancelled.
    pub timeout_secs: u64,
    /// How often the QR code is re-rendered.
    pub qr_refresh_ms: u64,
    /// Consecutive transport failures tolerated while polling. `0` fails fast.
    pub max_transport_retries: u32,
    /// First segment of the QR payload.
    pub provider_id: String,
    pub deep_link: DeepLinkStyle,
    /// Where the BankID app returns after a mobile order, `null` when unset.
    pub redirect: Option<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            timeout_secs: 120,
            qr_refresh_ms: 1_000,
            max_transport_retries: 0,
            provider_id: "bankid".into(),
            deep_link: DeepLinkStyle::Scheme,
            redirect: None,
        }
    }
}

impl FlowConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn qr_refresh(&self) -> Duration {
        Duration::from_millis(self.qr_refresh_ms)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval(),
            timeout: self.timeout(),
            max_transport_retries: self.max_transport_retries,
        }
    }
}

/// Connection to the backend function proxying the relying-party API.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// The function's URL, e.g. `https://<project>.supabase.co/functions/v1/bankid/`.
    pub base: BaseUrl,
    /// Used when a request does not carry the user's address itself.
    pub end_user_ip: Option<IpAddr>,
    /// Sent as `apikey` and bearer token.
    pub api_key: Option<String>,
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl std::str::FromStr for BaseUrl {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_owned().try_into()
    }
}
