use std::{sync::Arc, time::Duration};

use arvsskifte_bankid::{
    config::FlowConfig,
    controller::FlowError,
    core::{
        device::DeviceClass,
        hint_code::{self, HintCode},
        request::StartRequest,
        ui_state::UiState,
    },
    gateway::{scripted::GatewayCall, ProviderError, ScriptedGateway},
};
use http::StatusCode;
use tokio::time;

use common::{controller, RecordingLauncher, RecordingListener};

mod common;

fn setup(
    gateway: &ScriptedGateway,
    device: DeviceClass,
    launch: bool,
) -> (
    arvsskifte_bankid::controller::OrderController,
    Arc<RecordingListener>,
    Arc<RecordingLauncher>,
) {
    let listener = Arc::new(RecordingListener::observing(gateway.clone()));
    let launcher = Arc::new(RecordingLauncher::new(launch));
    let controller = controller(gateway, &listener, &launcher, device, FlowConfig::default());
    (controller, listener, launcher)
}

fn signing_script() -> ScriptedGateway {
    ScriptedGateway::new()
        .then_pending("outstandingTransaction")
        .then_pending("userSign")
        .then_complete(ScriptedGateway::sample_completion())
}

#[tokio::test(start_paused = true)]
async fn desktop_signing_shows_qr_and_completes_once() {
    let gateway = signing_script();
    let (controller, listener, launcher) = setup(&gateway, DeviceClass::Desktop, true);

    let order = controller
        .start(StartRequest::sign("Jag godkänner arvsskiftet."))
        .await
        .unwrap();
    listener.terminal().await;

    assert_eq!(
        listener.states(),
        vec![
            UiState::Starting,
            UiState::AwaitingQrScan,
            UiState::AwaitingSignature,
            UiState::Complete
        ]
    );
    assert_eq!(
        listener.completions(),
        vec![ScriptedGateway::sample_completion()]
    );
    assert_eq!(listener.failure_count(), 0);
    assert!(launcher.links().is_empty());

    let (qr_start_token, _) = order.qr_start().unwrap();
    assert!(listener.qr_payloads()[0].starts_with(&format!("bankid.{qr_start_token}.0.")));

    assert!(matches!(gateway.calls()[0], GatewayCall::StartSign(_)));
    assert_eq!(gateway.collect_count(), 3);
    assert_eq!(controller.state().await, UiState::Complete);
    assert!(controller.active_order().await.is_none());

    // Nothing keeps running once the order is complete.
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.collect_count(), 3);
    assert_eq!(listener.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn mobile_signing_launches_app_once() {
    let gateway = signing_script();
    let (controller, listener, launcher) = setup(&gateway, DeviceClass::Mobile, true);

    let order = controller
        .start(StartRequest::sign("Jag godkänner arvsskiftet."))
        .await
        .unwrap();
    listener.terminal().await;

    let links = launcher.links();
    assert_eq!(links.len(), 1);
    assert_eq!(
        links[0].as_str(),
        format!(
            "bankid:///?autostarttoken={}&redirect=null",
            order.auto_start_token().unwrap()
        )
    );
    assert_eq!(
        listener.states(),
        vec![
            UiState::Starting,
            UiState::WaitingForApp,
            UiState::AwaitingSignature,
            UiState::Complete
        ]
    );
    assert!(listener.qr_payloads().is_empty());
    assert_eq!(listener.completions().len(), 1);
    assert_eq!(listener.messages()[1], hint_code::RFA13);
}

#[tokio::test(start_paused = true)]
async fn mobile_without_launch_attempt_falls_back_to_qr() {
    let gateway = signing_script();
    let (controller, listener, launcher) = setup(&gateway, DeviceClass::Mobile, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert_eq!(launcher.links().len(), 1);
    assert_eq!(listener.states()[1], UiState::AwaitingQrScan);
    assert!(!listener.qr_payloads().is_empty());
    assert_eq!(listener.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn qr_payload_refreshes_every_second() {
    let gateway = ScriptedGateway::new()
        .then_pending("outstandingTransaction")
        .then_pending("outstandingTransaction")
        .then_pending("outstandingTransaction")
        .then_pending("outstandingTransaction")
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let order = controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    let (qr_start_token, _) = order.qr_start().unwrap();
    let payloads = listener.qr_payloads();
    assert!(payloads.len() >= 4);
    for (second, payload) in payloads.iter().take(4).enumerate() {
        assert!(payload.starts_with(&format!("bankid.{qr_start_token}.{second}.")));
    }
}

#[tokio::test(start_paused = true)]
async fn qr_refresh_stops_once_app_is_started() {
    let mut gateway = ScriptedGateway::new();
    for _ in 0..5 {
        gateway = gateway.then_pending("started");
    }
    let gateway = gateway.then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert_eq!(listener.qr_payloads().len(), 1);
    assert_eq!(
        listener.states(),
        vec![
            UiState::Starting,
            UiState::AwaitingQrScan,
            UiState::WaitingForApp,
            UiState::Complete
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_times_out_once_after_cancel() {
    let gateway = ScriptedGateway::new();
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert_eq!(gateway.collect_count(), 120);
    assert_eq!(gateway.cancel_count(), 1);
    assert_eq!(listener.cancels_at_failure(), vec![1]);
    assert_eq!(listener.failure_count(), 1);
    listener.with_failures(|failures| {
        assert!(matches!(failures[0], FlowError::Timeout(d) if *d == Duration::from_secs(120)));
    });
    assert_eq!(listener.states().last(), Some(&UiState::TimedOut));
    assert_eq!(listener.messages().last().map(String::as_str), Some(hint_code::RFA8));

    time::sleep(Duration::from_secs(60)).await;
    controller.cancel().await;
    assert_eq!(gateway.collect_count(), 120);
    assert_eq!(gateway.cancel_count(), 1);
    assert_eq!(listener.failure_count(), 1);
    assert_eq!(controller.state().await, UiState::Idle);
}

#[tokio::test(start_paused = true)]
async fn user_cancel_in_app_is_reported_as_declined() {
    let gateway = ScriptedGateway::new()
        .then_pending("outstandingTransaction")
        .then_failed("userCancel");
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller
        .start(StartRequest::sign("Jag godkänner arvsskiftet."))
        .await
        .unwrap();
    listener.terminal().await;

    assert_eq!(listener.failure_count(), 1);
    listener.with_failures(|failures| {
        assert!(matches!(failures[0], FlowError::UserDeclined));
    });
    assert_eq!(listener.messages().last().map(String::as_str), Some(hint_code::RFA6));
    assert_eq!(controller.state().await, UiState::Failed);
    assert!(listener.completions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_hint_codes_get_generic_messages() {
    let gateway = ScriptedGateway::new()
        .then_pending("somethingNew")
        .then_failed("brandNewFailure");
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert!(listener
        .messages()
        .contains(&hint_code::RFA21.to_owned()));
    listener.with_failures(|failures| {
        assert!(matches!(
            failures[0],
            FlowError::Failed { hint: Some(HintCode::Unrecognized(code)) } if code == "brandNewFailure"
        ));
        assert_eq!(failures[0].user_message(), hint_code::RFA22);
    });
}

#[tokio::test(start_paused = true)]
async fn cancel_silences_in_flight_poll() {
    let gateway = ScriptedGateway::new()
        .then_complete_after(Duration::from_secs(5), ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.collect_count(), 1);

    controller.cancel().await;
    time::sleep(Duration::from_secs(30)).await;

    assert!(listener.completions().is_empty());
    assert_eq!(listener.failure_count(), 0);
    assert_eq!(gateway.cancel_count(), 1);
    assert_eq!(gateway.collect_count(), 1);
    assert_eq!(controller.state().await, UiState::Idle);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let gateway = ScriptedGateway::new();
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.cancel().await;
    assert_eq!(listener.state_events(), 0);
    assert!(gateway.calls().is_empty());

    controller.start(StartRequest::authenticate()).await.unwrap();
    controller.cancel().await;
    let events = listener.state_events();
    controller.cancel().await;

    assert_eq!(listener.state_events(), events);
    assert_eq!(gateway.cancel_count(), 1);
    assert_eq!(
        listener.states(),
        vec![UiState::Starting, UiState::AwaitingQrScan, UiState::Idle]
    );
    assert_eq!(listener.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_start_is_returned_to_caller() {
    let gateway = ScriptedGateway::new().fail_next_start(ProviderError::Rejected {
        status: StatusCode::BAD_REQUEST,
        code: Some("alreadyInProgress".into()),
        details: Some("Order already in progress for pno".into()),
    });
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let error = controller
        .start(StartRequest::authenticate())
        .await
        .unwrap_err();

    assert!(matches!(error, FlowError::Provider(ref e) if e.code() == Some("alreadyInProgress")));
    assert_eq!(error.user_message(), hint_code::RFA4);
    assert_eq!(listener.states(), vec![UiState::Starting, UiState::Idle]);
    assert_eq!(listener.failure_count(), 0);
    assert_eq!(gateway.collect_count(), 0);

    // The caller may retry.
    let retried = controller.start(StartRequest::authenticate()).await;
    assert!(retried.is_ok());
}

#[tokio::test(start_paused = true)]
async fn invalid_request_never_reaches_provider() {
    let gateway = ScriptedGateway::new();
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let error = controller.start(StartRequest::sign("   ")).await.unwrap_err();

    assert!(matches!(error, FlowError::InvalidRequest(_)));
    assert!(gateway.calls().is_empty());
    assert_eq!(listener.state_events(), 0);
}

#[tokio::test(start_paused = true)]
async fn new_start_cancels_previous_order() {
    let gateway = ScriptedGateway::new()
        .then_pending("userSign")
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let first = controller.start(StartRequest::authenticate()).await.unwrap();
    let second = controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert!(gateway
        .calls()
        .contains(&GatewayCall::Cancel(first.order_ref().clone())));
    assert!(!gateway
        .calls()
        .contains(&GatewayCall::Cancel(second.order_ref().clone())));
    assert_eq!(listener.completions().len(), 1);
    assert_eq!(listener.failure_count(), 0);

    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(listener.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn responses_for_other_orders_are_ignored() {
    let gateway = ScriptedGateway::new()
        .then_foreign_order()
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert_eq!(gateway.collect_count(), 2);
    assert_eq!(listener.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_during_polling_fails_fast() {
    let gateway = ScriptedGateway::new()
        .then_pending("outstandingTransaction")
        .then_error(ProviderError::Transport(anyhow::anyhow!("connection reset")))
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    listener.with_failures(|failures| {
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], FlowError::Transport(_)));
    });
    assert_eq!(controller.state().await, UiState::Failed);
    assert_eq!(gateway.collect_count(), 2);
    assert!(listener.completions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transport_failures_can_be_retried() {
    let gateway = ScriptedGateway::new()
        .then_error(ProviderError::Transport(anyhow::anyhow!("connection reset")))
        .then_complete(ScriptedGateway::sample_completion());
    let listener = Arc::new(RecordingListener::default());
    let launcher = Arc::new(RecordingLauncher::new(false));
    let config = FlowConfig {
        max_transport_retries: 1,
        ..FlowConfig::default()
    };
    let controller = controller(&gateway, &listener, &launcher, DeviceClass::Desktop, config);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert_eq!(listener.completions().len(), 1);
    assert_eq!(listener.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn pending_answer_at_deadline_does_not_time_out_early() {
    let mut gateway = ScriptedGateway::new();
    for _ in 0..10 {
        gateway = gateway.then_pending_after(Duration::from_secs(1), "outstandingTransaction");
    }
    let listener = Arc::new(RecordingListener::observing(gateway.clone()));
    let launcher = Arc::new(RecordingLauncher::new(false));
    let config = FlowConfig {
        timeout_secs: 4,
        ..FlowConfig::default()
    };
    let controller = controller(&gateway, &listener, &launcher, DeviceClass::Desktop, config);

    controller.start(StartRequest::authenticate()).await.unwrap();
    listener.terminal().await;

    assert_eq!(
        listener.states(),
        vec![UiState::Starting, UiState::AwaitingQrScan, UiState::TimedOut]
    );
    // The only timed out state is the terminal one, with its own message.
    assert_eq!(listener.state_events(), 3);
    assert_eq!(listener.messages().last().map(String::as_str), Some(hint_code::RFA8));
    assert_eq!(listener.cancels_at_failure(), vec![1]);
    assert_eq!(listener.failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_start_supersedes_it() {
    let gateway = ScriptedGateway::new()
        .delay_next_start(Duration::from_secs(2))
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let (started, ()) = tokio::join!(controller.start(StartRequest::authenticate()), async {
        time::sleep(Duration::from_secs(1)).await;
        controller.cancel().await;
    });

    assert!(matches!(started, Err(FlowError::Superseded)));

    time::sleep(Duration::from_secs(30)).await;
    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], GatewayCall::StartAuth(_)));
    assert!(matches!(calls[1], GatewayCall::Cancel(_)));
    assert_eq!(gateway.collect_count(), 0);

    assert_eq!(listener.states(), vec![UiState::Starting, UiState::Idle]);
    assert!(listener.qr_payloads().is_empty());
    assert!(listener.completions().is_empty());
    assert_eq!(listener.failure_count(), 0);
    assert_eq!(controller.state().await, UiState::Idle);
    assert!(controller.active_order().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn newer_start_supersedes_pending_start() {
    let gateway = ScriptedGateway::new()
        .delay_next_start(Duration::from_secs(2))
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let (first, second) = tokio::join!(controller.start(StartRequest::authenticate()), async {
        time::sleep(Duration::from_secs(1)).await;
        controller.start(StartRequest::authenticate()).await
    });

    assert!(matches!(first, Err(FlowError::Superseded)));
    let second = second.unwrap();

    time::sleep(Duration::from_secs(30)).await;
    let cancelled: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            GatewayCall::Cancel(order_ref) => Some(order_ref),
            _ => None,
        })
        .collect();
    assert_eq!(cancelled.len(), 1);
    assert_ne!(&cancelled[0], second.order_ref());
    assert_eq!(listener.completions().len(), 1);
    assert_eq!(listener.failure_count(), 0);
    assert_eq!(controller.state().await, UiState::Complete);
}

#[tokio::test(start_paused = true)]
async fn dropping_controller_cancels_order() {
    let gateway = ScriptedGateway::new()
        .then_pending("outstandingTransaction")
        .then_pending("outstandingTransaction")
        .then_complete(ScriptedGateway::sample_completion());
    let (controller, listener, _) = setup(&gateway, DeviceClass::Desktop, false);

    let order = controller.start(StartRequest::authenticate()).await.unwrap();
    time::sleep(Duration::from_millis(1500)).await;
    let collects = gateway.collect_count();
    drop(controller);

    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.collect_count(), collects);
    assert_eq!(
        gateway.calls().last(),
        Some(&GatewayCall::Cancel(order.order_ref().clone()))
    );
    assert_eq!(gateway.cancel_count(), 1);
    assert!(listener.completions().is_empty());
    assert_eq!(listener.failure_count(), 0);
}
