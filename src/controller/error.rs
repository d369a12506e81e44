use std::time::Duration;

use thiserror::Error;

use crate::{
    core::{
        hint_code::{self, HintCode},
        request::RequestError,
    },
    gateway::ProviderError,
};

/// Why an order did not complete.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid start request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error(transparent)]
    Provider(ProviderError),
    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),
    #[error("no terminal status within {0:?}")]
    Timeout(Duration),
    /// The user pressed cancel in the BankID app (`userCancel`).
    #[error("the user declined in the BankID app")]
    UserDeclined,
    /// The order was cancelled, typically because another order was started for
    /// the same person (`cancelled`).
    #[error("the order was cancelled")]
    UserCancelled,
    #[error("order failed ({})", .hint.as_ref().map_or("no hint code", HintCode::as_str))]
    Failed { hint: Option<HintCode> },
    /// `cancel()` or a newer `start()` overtook a start still waiting for the provider.
    #[error("start was superseded before the provider answered")]
    Superseded,
}

impl From<ProviderError> for FlowError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Transport(e) => FlowError::Transport(e),
            e => FlowError::Provider(e),
        }
    }
}

impl FlowError {
    pub fn from_hint(hint: Option<HintCode>) -> Self {
        match hint {
            Some(HintCode::UserCancel) => FlowError::UserDeclined,
            Some(HintCode::Cancelled) => FlowError::UserCancelled,
            hint => FlowError::Failed { hint },
        }
    }

    /// Text to show the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            FlowError::InvalidRequest(_) => hint_code::RFA22,
            FlowError::Provider(e) => match e.code() {
                Some("alreadyInProgress") => hint_code::RFA4,
                Some("requestTimeout" | "maintenance" | "internalError") => hint_code::RFA5,
                _ => hint_code::RFA22,
            },
            FlowError::Transport(_) => hint_code::RFA5,
            FlowError::Timeout(_) => hint_code::RFA8,
            FlowError::UserDeclined => hint_code::RFA6,
            FlowError::UserCancelled | FlowError::Superseded => hint_code::RFA3,
            FlowError::Failed { hint } => hint_code::failed_message(hint.as_ref()),
        }
    }
}
