use std::net::IpAddr;

use base64::prelude::*;
use serde::Serialize;
use thiserror::Error;

use super::{order::OrderKind, personal_number::PersonalNumber};

/// Upper bound on the base64 encoded `userVisibleData`.
pub const MAX_USER_VISIBLE_DATA_LEN: usize = 40_000;

/// Value of `userVisibleDataFormat` enabling the provider's markdown subset.
pub const SIMPLE_MARKDOWN_V1: &str = "simpleMarkdownV1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("a signing request needs text for the user to sign")]
    EmptyConsentText,
    #[error("encoded consent text is {0} characters, the limit is {MAX_USER_VISIBLE_DATA_LEN}")]
    ConsentTextTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purpose {
    Authenticate,
    /// Sign the given human-readable consent text.
    Sign { consent_text: String },
}

/// Conditions the provider enforces on the user completing the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_number: Option<PersonalNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_code: Option<bool>,
}

impl Requirement {
    pub fn is_empty(&self) -> bool {
        self.personal_number.is_none() && self.pin_code.is_none()
    }
}

/// What a call site asks the controller to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    purpose: Purpose,
    requirement: Requirement,
    end_user_ip: Option<IpAddr>,
    markdown: bool,
}

impl StartRequest {
    pub fn authenticate() -> Self {
        Self::new(Purpose::Authenticate)
    }

    pub fn sign(consent_text: impl Into<String>) -> Self {
        Self::new(Purpose::Sign {
            consent_text: consent_text.into(),
        })
    }

    fn new(purpose: Purpose) -> Self {
        Self {
            purpose,
            requirement: Requirement::default(),
            end_user_ip: None,
            markdown: false,
        }
    }

    /// Only this person may complete the order.
    pub fn with_personal_number(mut self, personal_number: PersonalNumber) -> Self {
        self.requirement.personal_number = Some(personal_number);
        self
    }

    pub fn with_pin_code(mut self, required: bool) -> Self {
        self.requirement.pin_code = Some(required);
        self
    }

    /// Address of the user's device. Defaults to the gateway's configured address.
    pub fn with_end_user_ip(mut self, ip: IpAddr) -> Self {
        self.end_user_ip = Some(ip);
        self
    }

    /// Render the consent text with the provider's markdown subset.
    pub fn with_markdown(mut self) -> Self {
        self.markdown = true;
        self
    }

    pub fn purpose(&self) -> &Purpose {
        &self.purpose
    }

    pub fn kind(&self) -> OrderKind {
        match self.purpose {
            Purpose::Authenticate => OrderKind::Authenticate,
            Purpose::Sign { .. } => OrderKind::Sign,
        }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if let Purpose::Sign { consent_text } = &self.purpose {
            if consent_text.trim().is_empty() {
                return Err(RequestError::EmptyConsentText);
            }
            let encoded_len = consent_text.len().div_ceil(3) * 4;
            if encoded_len > MAX_USER_VISIBLE_DATA_LEN {
                return Err(RequestError::ConsentTextTooLong(encoded_len));
            }
        }
        Ok(())
    }

    pub fn auth_request(&self) -> AuthRequest {
        AuthRequest {
            end_user_ip: self.end_user_ip,
            requirement: self.requirement.clone(),
        }
    }

    /// The wire form of a signing request, `None` for identification.
    pub fn sign_request(&self) -> Option<SignRequest> {
        let Purpose::Sign { consent_text } = &self.purpose else {
            return None;
        };
        Some(SignRequest {
            end_user_ip: self.end_user_ip,
            user_visible_data: BASE64_STANDARD.encode(consent_text),
            user_visible_data_format: self.markdown.then(|| SIMPLE_MARKDOWN_V1.to_owned()),
            requirement: self.requirement.clone(),
        })
    }
}

/// Body of the `auth` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_user_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Requirement::is_empty")]
    pub requirement: Requirement,
}

/// Body of the `sign` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_user_ip: Option<IpAddr>,
    /// Base64 encoded UTF-8 consent text.
    pub user_visible_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_visible_data_format: Option<String>,
    #[serde(skip_serializing_if = "Requirement::is_empty")]
    pub requirement: Requirement,
}
