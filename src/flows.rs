//! The places in the wizard that ask for BankID, as thin configurations of one
//! shared [OrderController](crate::controller::OrderController).

use std::fmt;

use crate::{
    controller::{FlowError, FlowListener},
    core::{
        order::CompletionData, personal_number::PersonalNumber, request::StartRequest,
        ui_state::UiState,
    },
};

/// What the user is identifying or signing for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningPurpose {
    /// Identify with BankID on the phone before continuing.
    PhoneAuthentication,
    /// Confirm an uploaded document, e.g. the estate inventory.
    Document { title: String },
    /// One heir approving the distribution.
    HeirApproval {
        heir_name: String,
        deceased_name: String,
    },
    /// The signature that finalizes the settlement.
    FinalSignature {
        deceased_name: String,
        heir_count: usize,
    },
}

impl SigningPurpose {
    /// Text shown in the BankID app, `None` for identification.
    pub fn consent_text(&self) -> Option<String> {
        match self {
            SigningPurpose::PhoneAuthentication => None,
            SigningPurpose::Document { title } => Some(format!(
                "Jag intygar att jag har tagit del av dokumentet \"{title}\" och att uppgifterna i det är korrekta."
            )),
            SigningPurpose::HeirApproval {
                heir_name,
                deceased_name,
            } => Some(format!(
                "Jag, {heir_name}, godkänner arvsskiftet efter {deceased_name} och den fördelning av tillgångar och skulder som framgår av arvsskifteshandlingen."
            )),
            SigningPurpose::FinalSignature {
                deceased_name,
                heir_count,
            } => Some(format!(
                "Jag undertecknar arvsskifteshandlingen efter {deceased_name}. Handlingen är godkänd av samtliga {heir_count} delägare."
            )),
        }
    }

    /// The request for this purpose, optionally locked to one person.
    pub fn request(&self, personal_number: Option<PersonalNumber>) -> StartRequest {
        let request = match self.consent_text() {
            Some(text) => StartRequest::sign(text),
            None => StartRequest::authenticate(),
        };
        match personal_number {
            Some(pn) => request.with_personal_number(pn),
            None => request,
        }
    }
}

type StateHandler = Box<dyn Fn(UiState, &str) + Send + Sync>;
type QrHandler = Box<dyn Fn(&str) + Send + Sync>;

/// A [FlowListener] made of closures.
///
/// Failures reach `on_failure` as the message to show the user.
pub struct CallbackListener {
    on_success: Box<dyn Fn(CompletionData) + Send + Sync>,
    on_failure: Box<dyn Fn(String) + Send + Sync>,
    on_state: Option<StateHandler>,
    on_qr_payload: Option<QrHandler>,
}

impl CallbackListener {
    pub fn new(
        on_success: impl Fn(CompletionData) + Send + Sync + 'static,
        on_failure: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
            on_state: None,
            on_qr_payload: None,
        }
    }

    pub fn with_state_handler(
        mut self,
        on_state: impl Fn(UiState, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_state = Some(Box::new(on_state));
        self
    }

    pub fn with_qr_handler(mut self, on_qr_payload: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_qr_payload = Some(Box::new(on_qr_payload));
        self
    }
}

impl FlowListener for CallbackListener {
    fn on_state(&self, state: UiState, message: &str) {
        if let Some(handler) = &self.on_state {
            handler(state, message);
        }
    }

    fn on_qr_payload(&self, payload: &str) {
        if let Some(handler) = &self.on_qr_payload {
            handler(payload);
        }
    }

    fn on_complete(&self, completion: CompletionData) {
        (self.on_success)(completion);
    }

    fn on_failure(&self, error: FlowError) {
        (self.on_failure)(error.user_message().to_owned());
    }
}

impl fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackListener")
            .field("on_state", &self.on_state.is_some())
            .field("on_qr_payload", &self.on_qr_payload.is_some())
            .finish_non_exhaustive()
    }
}
