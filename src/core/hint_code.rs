use std::fmt;

use serde::{Deserialize, Serialize};

use super::ui_state::Presentation;

const OUTSTANDING_TRANSACTION: &str = "outstandingTransaction";
const NO_CLIENT: &str = "noClient";
const STARTED: &str = "started";
const USER_MRTD: &str = "userMrtd";
const USER_CALL_CONFIRM: &str = "userCallConfirm";
const USER_SIGN: &str = "userSign";
const USER_CANCEL: &str = "userCancel";
const CANCELLED: &str = "cancelled";
const EXPIRED_TRANSACTION: &str = "expiredTransaction";
const CERTIFICATE_ERR: &str = "certificateErr";
const START_FAILED: &str = "startFailed";

/// Provider sub-status explaining a `pending` or `failed` order.
///
/// This is an open enumeration: codes introduced by the provider after this
/// library was written are kept in [HintCode::Unrecognized].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HintCode {
    OutstandingTransaction,
    NoClient,
    Started,
    UserMrtd,
    UserCallConfirm,
    UserSign,
    UserCancel,
    Cancelled,
    ExpiredTransaction,
    CertificateErr,
    StartFailed,
    Unrecognized(String),
}

impl From<String> for HintCode {
    fn from(s: String) -> Self {
        match s.as_str() {
            OUTSTANDING_TRANSACTION => HintCode::OutstandingTransaction,
            NO_CLIENT => HintCode::NoClient,
            STARTED => HintCode::Started,
            USER_MRTD => HintCode::UserMrtd,
            USER_CALL_CONFIRM => HintCode::UserCallConfirm,
            USER_SIGN => HintCode::UserSign,
            USER_CANCEL => HintCode::UserCancel,
            CANCELLED => HintCode::Cancelled,
            EXPIRED_TRANSACTION => HintCode::ExpiredTransaction,
            CERTIFICATE_ERR => HintCode::CertificateErr,
            START_FAILED => HintCode::StartFailed,
            _ => HintCode::Unrecognized(s),
        }
    }
}

impl From<&str> for HintCode {
    fn from(s: &str) -> Self {
        s.to_owned().into()
    }
}

impl From<HintCode> for String {
    fn from(hint: HintCode) -> Self {
        match hint {
            HintCode::Unrecognized(s) => s,
            known => known.as_str().into(),
        }
    }
}

impl HintCode {
    pub fn as_str(&self) -> &str {
        match self {
            HintCode::OutstandingTransaction => OUTSTANDING_TRANSACTION,
            HintCode::NoClient => NO_CLIENT,
            HintCode::Started => STARTED,
            HintCode::UserMrtd => USER_MRTD,
            HintCode::UserCallConfirm => USER_CALL_CONFIRM,
            HintCode::UserSign => USER_SIGN,
            HintCode::UserCancel => USER_CANCEL,
            HintCode::Cancelled => CANCELLED,
            HintCode::ExpiredTransaction => EXPIRED_TRANSACTION,
            HintCode::CertificateErr => CERTIFICATE_ERR,
            HintCode::StartFailed => START_FAILED,
            HintCode::Unrecognized(s) => s,
        }
    }
}

impl fmt::Display for HintCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// Recommended user messages from the BankID relying-party guidelines.
pub const RFA1: &str = "Start your BankID app.";
pub const RFA3: &str = "Action cancelled. Please try again.";
pub const RFA4: &str =
    "An identification or signing for this personal number is already started. Please try again.";
pub const RFA5: &str = "Internal error. Please try again.";
pub const RFA6: &str = "Action cancelled.";
pub const RFA8: &str = "The BankID app is not responding. Please check that it's started and that you have internet access. If you don't have a valid BankID you can get one from your bank. Try again.";
pub const RFA9: &str = "Enter your security code in the BankID app and select Identify or Sign.";
pub const RFA13: &str = "Trying to start your BankID app.";
pub const RFA14: &str = "Searching for BankID, it may take a little while. If a few seconds have passed and still no BankID has been found, you probably don't have a BankID which can be used for this identification/signing on this device.";
pub const RFA16: &str = "The BankID you are trying to use is blocked or too old. Please use another BankID or get a new one from your bank.";
pub const RFA17: &str = "The BankID app couldn't be found on your computer or mobile device. Please install it and get a BankID from your bank. Install the app from your app store or https://install.bankid.com.";
pub const RFA21: &str = "Identification or signing in progress.";
pub const RFA22: &str = "Unknown error. Please try again.";
pub const RFA23: &str = "Process your machine-readable travel document using the BankID app.";

/// Message shown while an order is `pending`.
///
/// Unknown hint codes fall back to a generic "in progress" message.
pub fn pending_message(hint: Option<&HintCode>, presentation: Presentation) -> &'static str {
    match (hint, presentation) {
        (None | Some(HintCode::OutstandingTransaction), Presentation::App) => RFA13,
        (None | Some(HintCode::OutstandingTransaction), Presentation::QrCode) => RFA1,
        (Some(HintCode::NoClient), _) => RFA1,
        (Some(HintCode::Started), _) => RFA14,
        (Some(HintCode::UserMrtd), _) => RFA23,
        (Some(HintCode::UserSign | HintCode::UserCallConfirm), _) => RFA9,
        _ => RFA21,
    }
}

/// Message shown once an order has `failed`.
pub fn failed_message(hint: Option<&HintCode>) -> &'static str {
    match hint {
        Some(HintCode::UserCancel) => RFA6,
        Some(HintCode::Cancelled) => RFA3,
        Some(HintCode::ExpiredTransaction) => RFA8,
        Some(HintCode::CertificateErr) => RFA16,
        Some(HintCode::StartFailed) => RFA17,
        _ => RFA22,
    }
}
