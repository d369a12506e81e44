use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{
    hint_code::HintCode,
    order::{CancelResponse, CompletionData, Device, OrderRef, OrderStatus, StartResponse, User},
    request::{AuthRequest, SignRequest},
};

use super::{Gateway, ProviderError};

/// A call received by a [ScriptedGateway].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    StartAuth(AuthRequest),
    StartSign(SignRequest),
    Collect(OrderRef),
    Cancel(OrderRef),
}

#[derive(Debug)]
enum Step {
    Status(Option<HintCode>, Outcome),
    Error(ProviderError),
    /// Answer for an order nobody asked about.
    Foreign,
}

#[derive(Debug)]
enum Outcome {
    Pending,
    Complete(Box<CompletionData>),
    Failed,
}

#[derive(Debug, Default)]
struct Script {
    start_delays: VecDeque<Duration>,
    start_failures: VecDeque<ProviderError>,
    steps: VecDeque<(Duration, Step)>,
    calls: Vec<GatewayCall>,
}

/// A gateway answering from a script. Not for production use!
///
/// # Warning
/// This gateway never talks to the provider. Once the script is exhausted every
/// `collect` answers `pending` with `outstandingTransaction`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, delay: Duration, step: Step) -> Self {
        self.script().steps.push_back((delay, step));
        self
    }

    pub fn then_pending(self, hint: impl Into<HintCode>) -> Self {
        self.then_pending_after(Duration::ZERO, hint)
    }

    /// Answer `pending`, but only after `delay` has passed.
    pub fn then_pending_after(self, delay: Duration, hint: impl Into<HintCode>) -> Self {
        self.push(delay, Step::Status(Some(hint.into()), Outcome::Pending))
    }

    pub fn then_complete(self, completion: CompletionData) -> Self {
        self.then_complete_after(Duration::ZERO, completion)
    }

    /// Answer `complete`, but only after `delay` has passed.
    pub fn then_complete_after(self, delay: Duration, completion: CompletionData) -> Self {
        self.push(
            delay,
            Step::Status(None, Outcome::Complete(Box::new(completion))),
        )
    }

    pub fn then_failed(self, hint: impl Into<HintCode>) -> Self {
        self.push(Duration::ZERO, Step::Status(Some(hint.into()), Outcome::Failed))
    }

    pub fn then_error(self, error: ProviderError) -> Self {
        self.push(Duration::ZERO, Step::Error(error))
    }

    /// Answer with a status for some other order.
    pub fn then_foreign_order(self) -> Self {
        self.push(Duration::ZERO, Step::Foreign)
    }

    /// Hold the answer to the next start call for `delay`.
    pub fn delay_next_start(self, delay: Duration) -> Self {
        self.script().start_delays.push_back(delay);
        self
    }

    /// Reject the next start call.
    pub fn fail_next_start(self, error: ProviderError) -> Self {
        self.script().start_failures.push_back(error);
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.script().calls.clone()
    }

    pub fn collect_count(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::Collect(_)))
    }

    pub fn cancel_count(&self) -> usize {
        self.count(|call| matches!(call, GatewayCall::Cancel(_)))
    }

    fn count(&self, f: impl Fn(&GatewayCall) -> bool) -> usize {
        self.script().calls.iter().filter(|call| f(call)).count()
    }

    async fn start(&self, call: GatewayCall) -> Result<StartResponse, ProviderError> {
        let delay = {
            let mut script = self.script();
            script.calls.push(call);
            script.start_delays.pop_front()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.script().start_failures.pop_front() {
            return Err(error);
        }
        Ok(StartResponse {
            order_ref: OrderRef(Uuid::new_v4().to_string()),
            auto_start_token: Some(Uuid::new_v4().to_string()),
            qr_start_token: Some(Uuid::new_v4().to_string()),
            qr_start_secret: Some(Uuid::new_v4().to_string()),
        })
    }

    /// A plausible completion for a test person.
    pub fn sample_completion() -> CompletionData {
        CompletionData {
            user: User {
                personal_number: "198112189876".into(),
                name: "Karl Karlsson".into(),
                given_name: "Karl".into(),
                surname: "Karlsson".into(),
            },
            device: Some(Device {
                ip_address: "192.0.2.10".into(),
                uhi: None,
            }),
            bank_id_issue_date: Some("2020-02-01".into()),
            step_up: None,
            signature: "PD94bWwgdmVyc2lvbj0iMS4wIiBlbmNvZGluZz0iVVRGLTgiPz4=".into(),
            ocsp_response: "MIIHfgoBAKCCB3cwggdzBgkrBgEFBQcwAQEEggdkMIIHYDCCAT".into(),
        }
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn start_auth(&self, request: &AuthRequest) -> Result<StartResponse, ProviderError> {
        self.start(GatewayCall::StartAuth(request.clone())).await
    }

    async fn start_sign(&self, request: &SignRequest) -> Result<StartResponse, ProviderError> {
        self.start(GatewayCall::StartSign(request.clone())).await
    }

    async fn collect(&self, order_ref: &OrderRef) -> Result<OrderStatus, ProviderError> {
        let (delay, step) = {
            let mut script = self.script();
            script.calls.push(GatewayCall::Collect(order_ref.clone()));
            script.steps.pop_front().unwrap_or((
                Duration::ZERO,
                Step::Status(Some(HintCode::OutstandingTransaction), Outcome::Pending),
            ))
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let order_ref = order_ref.clone();
        match step {
            Step::Status(hint, Outcome::Pending) => Ok(OrderStatus::pending(order_ref, hint)),
            Step::Status(_, Outcome::Complete(completion)) => {
                Ok(OrderStatus::complete(order_ref, *completion))
            }
            Step::Status(hint, Outcome::Failed) => Ok(OrderStatus::failed(order_ref, hint)),
            Step::Error(error) => Err(error),
            Step::Foreign => Ok(OrderStatus::complete(
                OrderRef(Uuid::new_v4().to_string()),
                Self::sample_completion(),
            )),
        }
    }

    async fn cancel(&self, order_ref: &OrderRef) -> Result<CancelResponse, ProviderError> {
        self.script().calls.push(GatewayCall::Cancel(order_ref.clone()));
        Ok(CancelResponse { success: true })
    }
}
