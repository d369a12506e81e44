use std::{fmt, time::Duration};

use super::{
    hint_code::HintCode,
    order::{CollectState, OrderStatus},
};

/// How the user was sent to the BankID app for the current order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// The app was launched on this device through a deep link.
    App,
    /// An animated QR code is shown for the user to scan with another device.
    QrCode,
}

/// Presentation state of an [OrderController](crate::controller::OrderController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiState {
    #[default]
    Idle,
    Starting,
    WaitingForApp,
    AwaitingQrScan,
    AwaitingSignature,
    Complete,
    Failed,
    TimedOut,
}

impl UiState {
    /// Derive the state of an accepted order.
    ///
    /// `status` is the latest collect snapshot, `None` before the first poll
    /// answered. Provider terminal statuses take precedence over the timeout
    /// budget; hint codes only refine the pending state.
    pub fn derive(
        status: Option<&OrderStatus>,
        elapsed: Duration,
        budget: Duration,
        presentation: Presentation,
    ) -> Self {
        match status.map(|s| s.status) {
            Some(CollectState::Complete) => return UiState::Complete,
            Some(CollectState::Failed) => return UiState::Failed,
            Some(CollectState::Pending) | None => {}
        }

        if elapsed >= budget {
            return UiState::TimedOut;
        }

        let waiting = match presentation {
            Presentation::App => UiState::WaitingForApp,
            Presentation::QrCode => UiState::AwaitingQrScan,
        };

        match status.and_then(|s| s.hint_code.as_ref()) {
            Some(HintCode::UserSign) => UiState::AwaitingSignature,
            Some(HintCode::Started | HintCode::UserMrtd | HintCode::UserCallConfirm) => {
                UiState::WaitingForApp
            }
            _ => waiting,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UiState::Complete | UiState::Failed | UiState::TimedOut
        )
    }
}

impl fmt::Display for UiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiState::Idle => "idle",
            UiState::Starting => "starting",
            UiState::WaitingForApp => "waitingForApp",
            UiState::AwaitingQrScan => "awaitingQRScan",
            UiState::AwaitingSignature => "awaitingSignature",
            UiState::Complete => "complete",
            UiState::Failed => "failed",
            UiState::TimedOut => "timedOut",
        }
        .fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::order::OrderRef;

    const BUDGET: Duration = Duration::from_secs(120);

    fn pending(hint: Option<HintCode>) -> OrderStatus {
        OrderStatus::pending(OrderRef::from("ref"), hint)
    }

    #[test]
    fn waiting_state_follows_presentation() {
        let status = pending(Some(HintCode::OutstandingTransaction));
        assert_eq!(
            UiState::derive(Some(&status), Duration::ZERO, BUDGET, Presentation::QrCode),
            UiState::AwaitingQrScan
        );
        assert_eq!(
            UiState::derive(None, Duration::ZERO, BUDGET, Presentation::App),
            UiState::WaitingForApp
        );
    }

    #[test]
    fn hints_refine_pending() {
        let sign = pending(Some(HintCode::UserSign));
        assert_eq!(
            UiState::derive(Some(&sign), Duration::from_secs(3), BUDGET, Presentation::QrCode),
            UiState::AwaitingSignature
        );

        let started = pending(Some(HintCode::Started));
        assert_eq!(
            UiState::derive(Some(&started), Duration::from_secs(3), BUDGET, Presentation::QrCode),
            UiState::WaitingForApp
        );

        let unknown = pending(Some("brandNewHint".into()));
        assert_eq!(
            UiState::derive(Some(&unknown), Duration::from_secs(3), BUDGET, Presentation::App),
            UiState::WaitingForApp
        );
    }

    #[test]
    fn budget_exhaustion_times_out_pending_orders_only() {
        let status = pending(Some(HintCode::UserSign));
        assert_eq!(
            UiState::derive(Some(&status), BUDGET, BUDGET, Presentation::App),
            UiState::TimedOut
        );

        let failed = OrderStatus::failed(OrderRef::from("ref"), Some(HintCode::UserCancel));
        assert_eq!(
            UiState::derive(Some(&failed), BUDGET * 2, BUDGET, Presentation::App),
            UiState::Failed
        );
    }
}
