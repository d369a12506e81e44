//! One BankID identification or signing attempt, end to end.

use std::{
    fmt,
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::{bail, Result};
use tokio::{
    runtime::Handle,
    sync::Mutex,
    task::{AbortHandle, JoinHandle},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::FlowConfig,
    core::{
        device::{auto_start_link, AppLauncher, DeviceClass, NoLauncher},
        hint_code::pending_message,
        order::{Order, OrderRef, OrderStatus},
        request::StartRequest,
        ui_state::{Presentation, UiState},
    },
    gateway::Gateway,
    poller::{PollOutcome, PollStep, StatusPoller},
    qr::QrCodeRenderer,
};

mod error;
mod listener;

pub use error::FlowError;
pub use listener::FlowListener;

const STARTING: &str = "Starting BankID.";

/// Owns at most one order at a time and reports its progress to a [FlowListener].
///
/// ```ignore
/// let controller = OrderController::builder()
///     .with_gateway(Arc::new(ProxyGateway::new(ReqwestClient::new()?, proxy_config)))
///     .with_listener(listener)
///     .with_device(DeviceClass::from_user_agent(user_agent))
///     .build()?;
///
/// controller.start(StartRequest::sign("Jag godkänner arvsskiftet.")).await?;
/// ```
pub struct OrderController {
    shared: Arc<Shared>,
}

struct Shared {
    gateway: Arc<dyn Gateway>,
    listener: Arc<dyn FlowListener>,
    launcher: Arc<dyn AppLauncher>,
    device: DeviceClass,
    config: FlowConfig,
    inner: Mutex<Inner>,
    /// Mirrors the active order's tasks so they can be stopped without `inner`.
    running: StdMutex<Option<Running>>,
}

struct Running {
    order_ref: OrderRef,
    tasks: Vec<AbortHandle>,
}

impl Shared {
    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct Inner {
    state: UiState,
    message: &'static str,
    /// Bumped by every `cancel()`; tasks and starts holding an older value are stale.
    generation: u64,
    active: Option<ActiveOrder>,
}

/// The order being tracked and the tasks working on it.
///
/// Dropping it stops polling and QR refreshes.
struct ActiveOrder {
    generation: u64,
    order: Order,
    presentation: Presentation,
    last_status: Option<OrderStatus>,
    poll_task: Option<JoinHandle<()>>,
    qr_task: Option<JoinHandle<()>>,
}

impl Drop for ActiveOrder {
    fn drop(&mut self) {
        for task in [self.poll_task.take(), self.qr_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

impl Inner {
    fn set_state(&mut self, listener: &dyn FlowListener, state: UiState, message: &'static str) {
        if self.state == state && self.message == message {
            return;
        }
        debug!(from = %self.state, to = %state, "state changed");
        self.state = state;
        self.message = message;
        listener.on_state(state, message);
    }

    fn active_mut(&mut self, generation: u64) -> Option<&mut ActiveOrder> {
        self.active
            .as_mut()
            .filter(|active| active.generation == generation)
    }

    fn take_active(&mut self, generation: u64) -> Option<ActiveOrder> {
        self.active_mut(generation)?;
        self.active.take()
    }
}

impl OrderController {
    pub fn builder() -> OrderControllerBuilder {
        OrderControllerBuilder::default()
    }

    /// Start a new order, cancelling the current one first.
    ///
    /// Polling starts right away. On a mobile device the BankID app is launched,
    /// otherwise (or if no launch attempt could be made) QR payloads are published.
    /// A rejected start is returned to the caller and never retried.
    pub async fn start(&self, request: StartRequest) -> Result<Order, FlowError> {
        request.validate()?;
        self.cancel().await;

        let shared = &self.shared;
        let generation = {
            let mut inner = shared.inner.lock().await;
            inner.set_state(&*shared.listener, UiState::Starting, STARTING);
            inner.generation
        };

        let started = match request.sign_request() {
            Some(sign) => shared.gateway.start_sign(&sign).await,
            None => shared.gateway.start_auth(&request.auth_request()).await,
        };

        let mut inner = shared.inner.lock().await;
        if inner.generation != generation {
            drop(inner);
            if let Ok(response) = started {
                debug!(order_ref = %response.order_ref, "start superseded, cancelling order");
                if let Err(e) = shared.gateway.cancel(&response.order_ref).await {
                    warn!(order_ref = %response.order_ref, "failed to cancel superseded order: {e}");
                }
            }
            return Err(FlowError::Superseded);
        }

        let response = match started {
            Ok(response) => response,
            Err(e) => {
                warn!("provider rejected start: {e}");
                inner.set_state(&*shared.listener, UiState::Idle, "");
                return Err(e.into());
            }
        };

        let order = Order::new(request.kind(), response);
        let presentation = self.present(&order);
        info!(
            order_ref = %order.order_ref(),
            kind = ?order.kind(),
            ?presentation,
            "order started"
        );

        inner.set_state(
            &*shared.listener,
            UiState::derive(None, Duration::ZERO, Duration::MAX, presentation),
            pending_message(None, presentation),
        );

        let mut active = ActiveOrder {
            generation,
            order: order.clone(),
            presentation,
            last_status: None,
            poll_task: None,
            qr_task: None,
        };

        if presentation == Presentation::QrCode {
            match QrCodeRenderer::for_order(&order, &shared.config.provider_id) {
                Some(renderer) => {
                    shared.listener.on_qr_payload(&renderer.payload_at(0));
                    active.qr_task = Some(tokio::spawn(refresh_qr(
                        shared.clone(),
                        generation,
                        renderer,
                    )));
                }
                None => warn!(order_ref = %order.order_ref(), "order has no QR start data"),
            }
        }

        let poller = StatusPoller::new(
            shared.gateway.clone(),
            &order,
            shared.config.poll_policy(),
        );
        active.poll_task = Some(tokio::spawn(drive(shared.clone(), generation, poller)));
        *shared.running() = Some(Running {
            order_ref: order.order_ref().clone(),
            tasks: [&active.poll_task, &active.qr_task]
                .into_iter()
                .flatten()
                .map(JoinHandle::abort_handle)
                .collect(),
        });
        inner.active = Some(active);

        Ok(order)
    }

    /// Stop tracking the current order and ask the provider to cancel it.
    ///
    /// Safe to call in any state and any number of times. Responses for the
    /// cancelled order that arrive later are dropped.
    pub async fn cancel(&self) {
        let shared = &self.shared;
        let active = {
            let mut inner = shared.inner.lock().await;
            inner.generation += 1;
            let active = inner.active.take();
            shared.running().take();
            inner.set_state(&*shared.listener, UiState::Idle, "");
            active
        };

        let Some(active) = active else {
            return;
        };
        let order_ref = active.order.order_ref().clone();
        drop(active);

        info!(%order_ref, "cancelling order");
        if let Err(e) = shared.gateway.cancel(&order_ref).await {
            warn!(%order_ref, "provider cancel failed: {e}");
        }
    }

    pub async fn state(&self) -> UiState {
        self.shared.inner.lock().await.state
    }

    /// The message accompanying the current state.
    pub async fn message(&self) -> &'static str {
        self.shared.inner.lock().await.message
    }

    pub async fn active_order(&self) -> Option<Order> {
        let inner = self.shared.inner.lock().await;
        inner.active.as_ref().map(|active| active.order.clone())
    }

    /// Latest snapshot of the active order.
    pub async fn last_status(&self) -> Option<OrderStatus> {
        let inner = self.shared.inner.lock().await;
        inner.active.as_ref()?.last_status.clone()
    }

    fn present(&self, order: &Order) -> Presentation {
        let shared = &self.shared;
        if shared.device != DeviceClass::Mobile {
            return Presentation::QrCode;
        }

        let Some(token) = order.auto_start_token() else {
            warn!(order_ref = %order.order_ref(), "order has no auto start token");
            return Presentation::QrCode;
        };

        match auto_start_link(token, shared.config.deep_link, shared.config.redirect.as_deref()) {
            Ok(link) if shared.launcher.launch(&link) => Presentation::App,
            Ok(_) => {
                debug!("no launch attempt possible, falling back to QR code");
                Presentation::QrCode
            }
            Err(e) => {
                warn!("unable to build auto start link: {e}");
                Presentation::QrCode
            }
        }
    }
}

impl Drop for OrderController {
    fn drop(&mut self) {
        // Tasks hold the shared state, so stop them explicitly. A task may be
        // holding `inner` right now; aborting takes effect at its next await.
        let Some(Running { order_ref, tasks }) = self.shared.running().take() else {
            return;
        };
        for task in tasks {
            task.abort();
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(%order_ref, "controller dropped outside a runtime, order not cancelled");
            return;
        };
        let gateway = self.shared.gateway.clone();
        runtime.spawn(async move {
            info!(%order_ref, "controller dropped, cancelling order");
            if let Err(e) = gateway.cancel(&order_ref).await {
                warn!(%order_ref, "provider cancel failed: {e}");
            }
        });
    }
}

impl fmt::Debug for OrderController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderController")
            .field("gateway", &self.shared.gateway)
            .field("launcher", &self.shared.launcher)
            .field("device", &self.shared.device)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

async fn drive(shared: Arc<Shared>, generation: u64, mut poller: StatusPoller) {
    let budget = shared.config.timeout();

    while let Some(step) = poller.next().await {
        let mut inner = shared.inner.lock().await;

        let outcome = match step {
            PollStep::Pending(status) => {
                let Some(active) = inner.active_mut(generation) else {
                    return;
                };
                // A pending snapshot never times out the order, the poller
                // reports the deadline once the provider has been cancelled.
                let state = UiState::derive(
                    Some(&status),
                    active.order.elapsed(),
                    Duration::MAX,
                    active.presentation,
                );
                let message = pending_message(status.hint_code.as_ref(), active.presentation);
                active.last_status = Some(status);
                inner.set_state(&*shared.listener, state, message);
                continue;
            }
            PollStep::Finished(outcome) => outcome,
        };

        let Some(mut active) = inner.take_active(generation) else {
            return;
        };
        shared.running().take();
        // This task is finishing on its own, only the QR refresh needs stopping.
        drop(active.poll_task.take());

        let order_ref = active.order.order_ref().clone();
        let (status, result) = match outcome {
            PollOutcome::Complete(completion) => (
                Some(OrderStatus::complete(order_ref, completion.clone())),
                Ok(completion),
            ),
            PollOutcome::Failed(hint) => (
                Some(OrderStatus::failed(order_ref, hint.clone())),
                Err(FlowError::from_hint(hint)),
            ),
            PollOutcome::TimedOut => (active.last_status.take(), Err(FlowError::Timeout(budget))),
            PollOutcome::Error(e) => (Some(OrderStatus::failed(order_ref, None)), Err(e.into())),
        };

        let state = UiState::derive(
            status.as_ref(),
            active.order.elapsed(),
            budget,
            active.presentation,
        );
        drop(active);

        match result {
            Ok(completion) => {
                info!("order complete");
                inner.set_state(&*shared.listener, state, "");
                shared.listener.on_complete(completion);
            }
            Err(error) => {
                info!("order ended without completion: {error}");
                inner.set_state(&*shared.listener, state, error.user_message());
                shared.listener.on_failure(error);
            }
        }
        return;
    }
}

async fn refresh_qr(shared: Arc<Shared>, generation: u64, renderer: QrCodeRenderer) {
    let mut ticker = time::interval(shared.config.qr_refresh());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The payload for second zero was published by `start`.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let inner = shared.inner.lock().await;
        let Some(active) = inner
            .active
            .as_ref()
            .filter(|active| active.generation == generation)
        else {
            return;
        };
        if inner.state != UiState::AwaitingQrScan {
            debug!(state = %inner.state, "order left QR scan, stopping refresh");
            return;
        }
        shared
            .listener
            .on_qr_payload(&renderer.payload_at(active.order.elapsed().as_secs()));
    }
}

/// Builder struct for [OrderController].
#[derive(Default)]
pub struct OrderControllerBuilder {
    gateway: Option<Arc<dyn Gateway>>,
    listener: Option<Arc<dyn FlowListener>>,
    launcher: Option<Arc<dyn AppLauncher>>,
    device: DeviceClass,
    config: FlowConfig,
}

impl OrderControllerBuilder {
    /// Build the controller. Must be called within a tokio runtime before `start`.
    pub fn build(self) -> Result<OrderController> {
        let Self {
            gateway,
            listener,
            launcher,
            device,
            config,
        } = self;

        let Some(gateway) = gateway else {
            bail!("gateway is required, see `with_gateway`")
        };

        let Some(listener) = listener else {
            bail!("listener is required, see `with_listener`")
        };

        if config.poll_interval().is_zero() || config.qr_refresh().is_zero() {
            bail!("poll interval and QR refresh must be greater than zero")
        }

        Ok(OrderController {
            shared: Arc::new(Shared {
                gateway,
                listener,
                launcher: launcher.unwrap_or_else(|| Arc::new(NoLauncher)),
                device,
                config,
                inner: Mutex::new(Inner::default()),
                running: StdMutex::new(None),
            }),
        })
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn FlowListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Set the [AppLauncher] used on mobile devices. Without one every order
    /// is presented as a QR code.
    pub fn with_launcher(mut self, launcher: Arc<dyn AppLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_device(mut self, device: DeviceClass) -> Self {
        self.device = device;
        self
    }

    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{core::order::CompletionData, gateway::ScriptedGateway};

    #[derive(Default)]
    struct Outcomes(AtomicUsize);

    impl FlowListener for Outcomes {
        fn on_complete(&self, _completion: CompletionData) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _error: FlowError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_tasks_while_state_is_locked() {
        let gateway = ScriptedGateway::new().then_complete(ScriptedGateway::sample_completion());
        let outcomes = Arc::new(Outcomes::default());
        let controller = OrderController::builder()
            .with_gateway(Arc::new(gateway.clone()))
            .with_listener(outcomes.clone())
            .build()
            .unwrap();

        controller.start(StartRequest::authenticate()).await.unwrap();

        let shared = controller.shared.clone();
        let guard = shared.inner.lock().await;
        drop(controller);
        drop(guard);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(gateway.collect_count(), 0);
        assert_eq!(gateway.cancel_count(), 1);
        assert_eq!(outcomes.0.load(Ordering::SeqCst), 0);
    }
}
