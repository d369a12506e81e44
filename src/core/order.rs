use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::hint_code::HintCode;

/// Opaque reference to an order held by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRef(pub String);

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OrderRef {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Body returned by the `auth` and `sign` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub order_ref: OrderRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_start_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_start_secret: Option<String>,
}

/// Body returned by the `cancel` endpoint.
///
/// The relying-party API answers with an empty object, the proxy adds `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    #[serde(default = "accepted")]
    pub success: bool,
}

fn accepted() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Authenticate,
    Sign,
}

/// One identification or signing attempt accepted by the provider.
///
/// Immutable once created. The creation instant is the reference point for the
/// animated QR code and for the polling budget.
#[derive(Clone)]
pub struct Order {
    order_ref: OrderRef,
    kind: OrderKind,
    auto_start_token: Option<String>,
    qr_start_token: Option<String>,
    qr_start_secret: Option<String>,
    created_at: Instant,
}

impl Order {
    pub fn new(kind: OrderKind, response: StartResponse) -> Self {
        let StartResponse {
            order_ref,
            auto_start_token,
            qr_start_token,
            qr_start_secret,
        } = response;

        Self {
            order_ref,
            kind,
            auto_start_token,
            qr_start_token,
            qr_start_secret,
            created_at: Instant::now(),
        }
    }

    pub fn order_ref(&self) -> &OrderRef {
        &self.order_ref
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn auto_start_token(&self) -> Option<&str> {
        self.auto_start_token.as_deref()
    }

    /// The `(qrStartToken, qrStartSecret)` pair, if the provider issued both.
    pub fn qr_start(&self) -> Option<(&str, &str)> {
        Some((
            self.qr_start_token.as_deref()?,
            self.qr_start_secret.as_deref()?,
        ))
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("order_ref", &self.order_ref)
            .field("kind", &self.kind)
            .field("auto_start_token", &self.auto_start_token)
            .field("qr_start_token", &self.qr_start_token)
            .field(
                "qr_start_secret",
                &self.qr_start_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Coarse order status reported by `collect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectState {
    Pending,
    Complete,
    Failed,
}

/// Snapshot of an order as returned by one `collect` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    pub order_ref: OrderRef,
    pub status: CollectState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_code: Option<HintCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_data: Option<CompletionData>,
}

impl OrderStatus {
    pub fn pending(order_ref: OrderRef, hint_code: Option<HintCode>) -> Self {
        Self {
            order_ref,
            status: CollectState::Pending,
            hint_code,
            completion_data: None,
        }
    }

    pub fn complete(order_ref: OrderRef, completion_data: CompletionData) -> Self {
        Self {
            order_ref,
            status: CollectState::Complete,
            hint_code: None,
            completion_data: Some(completion_data),
        }
    }

    pub fn failed(order_ref: OrderRef, hint_code: Option<HintCode>) -> Self {
        Self {
            order_ref,
            status: CollectState::Failed,
            hint_code,
            completion_data: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != CollectState::Pending
    }
}

/// Result of a completed identification or signature.
///
/// Passed through to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_id_issue_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_up: Option<StepUp>,
    /// Base64 encoded XML signature.
    pub signature: String,
    /// Base64 encoded OCSP response for the user's certificate.
    pub ocsp_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub personal_number: String,
    pub name: String,
    pub given_name: String,
    pub surname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uhi: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUp {
    pub mrtd: bool,
}
