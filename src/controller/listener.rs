use crate::core::{order::CompletionData, ui_state::UiState};

use super::FlowError;

/// Receives everything the user should see about an order.
///
/// Callbacks run while the controller's state is locked, they must not block.
/// For every order exactly one of [FlowListener::on_complete] and
/// [FlowListener::on_failure] is called, unless the order is cancelled first.
pub trait FlowListener: Send + Sync {
    fn on_state(&self, state: UiState, message: &str) {
        let _ = (state, message);
    }

    /// A new QR payload replaces the one on screen.
    fn on_qr_payload(&self, payload: &str) {
        let _ = payload;
    }

    fn on_complete(&self, completion: CompletionData);

    fn on_failure(&self, error: FlowError);
}
