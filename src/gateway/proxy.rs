use std::fmt::Debug;

use anyhow::Context;
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{
    config::ProxyConfig,
    core::{
        order::{CancelResponse, OrderRef, OrderStatus, StartResponse},
        request::{AuthRequest, SignRequest},
        util::{json_request, AsyncHttpClient},
    },
};

use super::{Gateway, ProviderError};

const AUTH: &str = "auth";
const SIGN: &str = "sign";
const COLLECT: &str = "collect";
const CANCEL: &str = "cancel";

/// Error body returned by the relying-party API and forwarded by the proxy.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: Option<String>,
    details: Option<String>,
}

/// A [Gateway] reaching the provider through the backend function over HTTP.
#[derive(Debug)]
pub struct ProxyGateway<C> {
    http_client: C,
    config: ProxyConfig,
}

impl<C> ProxyGateway<C>
where
    C: AsyncHttpClient + Debug + Send + Sync,
{
    pub fn new(http_client: C, config: ProxyConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn http_client(&self) -> &C {
        &self.http_client
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self
            .config
            .base
            .join(endpoint)
            .with_context(|| format!("invalid endpoint '{endpoint}'"))
            .map_err(ProviderError::Transport)?;

        let body = serde_json::to_vec(body)
            .context("failed to encode request body")
            .map_err(ProviderError::Transport)?;

        let mut builder = json_request().uri(url.as_str());
        if let Some(api_key) = &self.config.api_key {
            builder = builder
                .header("apikey", api_key)
                .header(AUTHORIZATION, format!("Bearer {api_key}"));
        }
        let request = builder
            .body(body)
            .context("failed to construct request")
            .map_err(ProviderError::Transport)?;

        debug!(%url, "calling provider proxy");
        let response = self
            .http_client
            .execute(request)
            .await
            .with_context(|| format!("{endpoint} request failed"))
            .map_err(ProviderError::Transport)?;

        let status = response.status();
        let body = response.into_body();

        if !status.is_success() {
            let ErrorBody {
                error_code,
                details,
            } = serde_json::from_slice(&body).unwrap_or_default();
            return Err(ProviderError::Rejected {
                status,
                code: error_code,
                details: details.or_else(|| {
                    Some(String::from_utf8_lossy(&body).into_owned()).filter(|s| !s.is_empty())
                }),
            });
        }

        serde_json::from_slice(&body).map_err(ProviderError::InvalidResponse)
    }
}

#[async_trait]
impl<C> Gateway for ProxyGateway<C>
where
    C: AsyncHttpClient + Debug + Send + Sync,
{
    async fn start_auth(&self, request: &AuthRequest) -> Result<StartResponse, ProviderError> {
        let mut request = request.clone();
        request.end_user_ip = request.end_user_ip.or(self.config.end_user_ip);
        self.post(AUTH, &request).await
    }

    async fn start_sign(&self, request: &SignRequest) -> Result<StartResponse, ProviderError> {
        let mut request = request.clone();
        request.end_user_ip = request.end_user_ip.or(self.config.end_user_ip);
        self.post(SIGN, &request).await
    }

    async fn collect(&self, order_ref: &OrderRef) -> Result<OrderStatus, ProviderError> {
        self.post(COLLECT, &json!({ "orderRef": order_ref })).await
    }

    async fn cancel(&self, order_ref: &OrderRef) -> Result<CancelResponse, ProviderError> {
        self.post(CANCEL, &json!({ "orderRef": order_ref })).await
    }
}
