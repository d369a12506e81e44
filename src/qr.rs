//! Animated QR codes for orders completed on another device.
//!
//! The payload shown to the user changes every second:
//!
//! ```text
//! <provider id>.<qrStartToken>.<seconds since order start>.<auth code>
//! ```
//!
//! The auth code is derived from the `qrStartSecret` which never leaves this
//! process. How it is derived is up to the provider, see [QrAuthCode].

use std::{fmt, sync::Arc};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::core::order::Order;

/// Derives the secret-bound part of a QR payload.
pub trait QrAuthCode: fmt::Debug + Send + Sync {
    fn auth_code(&self, qr_start_secret: &str, elapsed_secs: u64) -> String;
}

/// Hex encoded HMAC-SHA256 of the elapsed seconds, keyed with the start secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256AuthCode;

impl QrAuthCode for HmacSha256AuthCode {
    fn auth_code(&self, qr_start_secret: &str, elapsed_secs: u64) -> String {
        // HMAC accepts keys of any length.
        Hmac::<Sha256>::new_from_slice(qr_start_secret.as_bytes())
            .map(|mut mac| {
                mac.update(elapsed_secs.to_string().as_bytes());
                hex::encode(mac.finalize().into_bytes())
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct QrCodeRenderer {
    provider_id: String,
    qr_start_token: String,
    qr_start_secret: String,
    auth_code: Arc<dyn QrAuthCode>,
}

impl QrCodeRenderer {
    pub fn new(
        provider_id: impl Into<String>,
        qr_start_token: impl Into<String>,
        qr_start_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            qr_start_token: qr_start_token.into(),
            qr_start_secret: qr_start_secret.into(),
            auth_code: Arc::new(HmacSha256AuthCode),
        }
    }

    /// `None` if the provider did not issue QR start data for the order.
    pub fn for_order(order: &Order, provider_id: &str) -> Option<Self> {
        let (token, secret) = order.qr_start()?;
        Some(Self::new(provider_id, token, secret))
    }

    pub fn with_auth_code(mut self, auth_code: Arc<dyn QrAuthCode>) -> Self {
        self.auth_code = auth_code;
        self
    }

    /// The payload to display `elapsed_secs` whole seconds after the order started.
    pub fn payload_at(&self, elapsed_secs: u64) -> String {
        format!(
            "{}.{}.{}.{}",
            self.provider_id,
            self.qr_start_token,
            elapsed_secs,
            self.auth_code.auth_code(&self.qr_start_secret, elapsed_secs)
        )
    }

    /// Payloads for second 0, 1, 2, … Never ends; call again to restart.
    pub fn payloads(&self) -> QrPayloads<'_> {
        QrPayloads {
            renderer: self,
            next: 0,
        }
    }
}

impl fmt::Debug for QrCodeRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QrCodeRenderer")
            .field("provider_id", &self.provider_id)
            .field("qr_start_token", &self.qr_start_token)
            .field("auth_code", &self.auth_code)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct QrPayloads<'a> {
    renderer: &'a QrCodeRenderer,
    next: u64,
}

impl Iterator for QrPayloads<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let payload = self.renderer.payload_at(self.next);
        self.next += 1;
        Some(payload)
    }
}
