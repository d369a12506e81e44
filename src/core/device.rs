use std::fmt::Debug;

use serde::Deserialize;
use url::Url;

const MOBILE_MARKERS: [&str; 5] = ["Android", "iPhone", "iPad", "iPod", "Mobile"];

/// Whether the BankID app is expected on the same device as the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    Mobile,
    #[default]
    Desktop,
}

impl DeviceClass {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if MOBILE_MARKERS
            .iter()
            .any(|marker| user_agent.contains(marker))
        {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Which kind of link opens the BankID app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepLinkStyle {
    /// `bankid:///?autostarttoken=…`
    #[default]
    Scheme,
    /// `https://app.bankid.com/?autostarttoken=…`, preferred on iOS.
    UniversalLink,
}

impl DeepLinkStyle {
    fn base(self) -> &'static str {
        match self {
            DeepLinkStyle::Scheme => "bankid:///",
            DeepLinkStyle::UniversalLink => "https://app.bankid.com/",
        }
    }
}

/// Build the link that auto-starts the BankID app for an order.
///
/// Without a `redirect` the app is told not to return anywhere (`redirect=null`).
pub fn auto_start_link(
    auto_start_token: &str,
    style: DeepLinkStyle,
    redirect: Option<&str>,
) -> Result<Url, url::ParseError> {
    let mut link = Url::parse(style.base())?;
    link.query_pairs_mut()
        .append_pair("autostarttoken", auto_start_token)
        .append_pair("redirect", redirect.unwrap_or("null"));
    Ok(link)
}

/// Opens the BankID app.
///
/// Launching is fire-and-forget: there is no way to learn whether the app
/// actually opened. Implementations must not navigate the current page away
/// (use a hidden frame or an OS intent).
pub trait AppLauncher: Debug + Send + Sync {
    /// Attempt to open `link`. Returns `false` when no attempt could be made,
    /// in which case the controller falls back to a QR code.
    fn launch(&self, link: &Url) -> bool;
}

/// A launcher that never makes an attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLauncher;

impl AppLauncher for NoLauncher {
    fn launch(&self, _link: &Url) -> bool {
        false
    }
}
