#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use arvsskifte_bankid::{
    config::FlowConfig,
    controller::{FlowError, FlowListener, OrderController},
    core::{
        device::{AppLauncher, DeviceClass},
        order::CompletionData,
        ui_state::UiState,
    },
    gateway::ScriptedGateway,
};
use tokio::sync::Notify;
use url::Url;

#[derive(Debug)]
pub enum Event {
    State(UiState, String),
    Qr(String),
    Complete(CompletionData),
    Failure(FlowError),
}

/// Records every callback. Remembers how many cancels the gateway had seen
/// when a failure was reported.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
    terminal: Notify,
    gateway: Option<ScriptedGateway>,
    cancels_at_failure: Mutex<Vec<usize>>,
}

impl RecordingListener {
    pub fn observing(gateway: ScriptedGateway) -> Self {
        Self {
            gateway: Some(gateway),
            ..Default::default()
        }
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Wait until a success or failure callback has fired.
    pub async fn terminal(&self) {
        self.terminal.notified().await
    }

    /// Consecutive distinct states, in order.
    pub fn states(&self) -> Vec<UiState> {
        let mut states: Vec<UiState> = Vec::new();
        for event in self.events.lock().unwrap().iter() {
            if let Event::State(state, _) = event {
                if states.last() != Some(state) {
                    states.push(*state);
                }
            }
        }
        states
    }

    /// Every state callback, duplicates included.
    pub fn state_events(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, Event::State(..)))
            .count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::State(_, message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn qr_payloads(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Qr(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<CompletionData> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Complete(completion) => Some(completion.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, Event::Failure(_)))
            .count()
    }

    /// Runs `f` on the recorded failures.
    pub fn with_failures<T>(&self, f: impl FnOnce(Vec<&FlowError>) -> T) -> T {
        let events = self.events.lock().unwrap();
        f(events
            .iter()
            .filter_map(|event| match event {
                Event::Failure(error) => Some(error),
                _ => None,
            })
            .collect())
    }

    pub fn cancels_at_failure(&self) -> Vec<usize> {
        self.cancels_at_failure.lock().unwrap().clone()
    }
}

impl FlowListener for RecordingListener {
    fn on_state(&self, state: UiState, message: &str) {
        self.push(Event::State(state, message.to_owned()));
    }

    fn on_qr_payload(&self, payload: &str) {
        self.push(Event::Qr(payload.to_owned()));
    }

    fn on_complete(&self, completion: CompletionData) {
        self.push(Event::Complete(completion));
        self.terminal.notify_one();
    }

    fn on_failure(&self, error: FlowError) {
        if let Some(gateway) = &self.gateway {
            self.cancels_at_failure
                .lock()
                .unwrap()
                .push(gateway.cancel_count());
        }
        self.push(Event::Failure(error));
        self.terminal.notify_one();
    }
}

#[derive(Debug)]
pub struct RecordingLauncher {
    attempt: bool,
    links: Mutex<Vec<Url>>,
}

impl RecordingLauncher {
    pub fn new(attempt: bool) -> Self {
        Self {
            attempt,
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn links(&self) -> Vec<Url> {
        self.links.lock().unwrap().clone()
    }
}

impl AppLauncher for RecordingLauncher {
    fn launch(&self, link: &Url) -> bool {
        self.links.lock().unwrap().push(link.clone());
        self.attempt
    }
}

pub fn controller(
    gateway: &ScriptedGateway,
    listener: &Arc<RecordingListener>,
    launcher: &Arc<RecordingLauncher>,
    device: DeviceClass,
    config: FlowConfig,
) -> OrderController {
    OrderController::builder()
        .with_gateway(Arc::new(gateway.clone()))
        .with_listener(listener.clone())
        .with_launcher(launcher.clone())
        .with_device(device)
        .with_config(config)
        .build()
        .unwrap()
}
