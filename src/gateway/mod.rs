//! The relying-party gateway: the provider API as seen through the backend proxy.

use std::fmt::Debug;

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

use crate::core::{
    order::{CancelResponse, OrderRef, OrderStatus, StartResponse},
    request::{AuthRequest, SignRequest},
};

pub mod proxy;
pub mod scripted;

pub use proxy::ProxyGateway;
pub use scripted::ScriptedGateway;

/// A failed call to the gateway.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider or the proxy answered with a non-success status.
    #[error("provider rejected the request (status {status}): {}", .code.as_deref().unwrap_or("no error code"))]
    Rejected {
        status: StatusCode,
        code: Option<String>,
        details: Option<String>,
    },
    /// The request never produced a response.
    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),
    #[error("unable to decode provider response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
    #[error("order {0} completed without completion data")]
    MissingCompletionData(OrderRef),
}

impl ProviderError {
    /// Error code reported by the provider, e.g. `alreadyInProgress`.
    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Start, collect and cancel orders.
#[async_trait]
pub trait Gateway: Debug + Send + Sync {
    async fn start_auth(&self, request: &AuthRequest) -> Result<StartResponse, ProviderError>;

    async fn start_sign(&self, request: &SignRequest) -> Result<StartResponse, ProviderError>;

    async fn collect(&self, order_ref: &OrderRef) -> Result<OrderStatus, ProviderError>;

    async fn cancel(&self, order_ref: &OrderRef) -> Result<CancelResponse, ProviderError>;
}
