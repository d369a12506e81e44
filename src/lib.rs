//! BankID identification and signing for the Digital Arvsskifte wizard.
//!
//! Every step of the estate settlement that needs BankID (phone
//! identification, confirming documents, each heir's approval and the final
//! signature) goes through one [`OrderController`]. The controller talks to
//! the relying-party API through the backend proxy ([`Gateway`]), decides
//! whether to launch the BankID app or show an animated QR code, polls the
//! order to completion and makes sure the caller hears about the outcome
//! exactly once.
//!
//! [`OrderController`]: crate::controller::OrderController
//! [`Gateway`]: crate::gateway::Gateway
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use arvsskifte_bankid::{
//!     config::{FlowConfig, ProxyConfig},
//!     controller::OrderController,
//!     core::{device::DeviceClass, util::ReqwestClient},
//!     flows::{CallbackListener, SigningPurpose},
//!     gateway::ProxyGateway,
//! };
//!
//! let gateway = ProxyGateway::new(ReqwestClient::new()?, proxy_config);
//!
//! let listener = CallbackListener::new(
//!     |completion| println!("signed by {}", completion.user.name),
//!     |message| eprintln!("{message}"),
//! )
//! .with_qr_handler(|payload| render_qr(payload));
//!
//! let controller = OrderController::builder()
//!     .with_gateway(Arc::new(gateway))
//!     .with_listener(Arc::new(listener))
//!     .with_launcher(launcher)
//!     .with_device(DeviceClass::from_user_agent(user_agent))
//!     .with_config(FlowConfig::default())
//!     .build()?;
//!
//! let purpose = SigningPurpose::HeirApproval {
//!     heir_name: "Anna Andersson".into(),
//!     deceased_name: "Karl Karlsson".into(),
//! };
//! controller.start(purpose.request(Some(personal_number))).await?;
//!
//! // Leaving the step:
//! controller.cancel().await;
//! ```
//!
//! # Order lifecycle
//!
//! ```text
//! idle → starting → waitingForApp | awaitingQRScan → awaitingSignature → complete
//!                                  ↘ failed | timedOut (from any active state)
//! ```
//!
//! 1. *Start*: [`OrderController::start`] validates the request, cancels any
//!    order still running and asks the provider for a new one. A rejected
//!    start is returned to the caller.
//! 2. *Presentation*: on a mobile device the app is opened through an auto
//!    start link ([`core::device`]); otherwise QR payloads from
//!    [`qr::QrCodeRenderer`] are published every second.
//! 3. *Polling*: [`poller::StatusPoller`] calls `collect` until the order is
//!    complete or failed, or the timeout budget is spent. Hint codes refine
//!    the state shown to the user ([`core::ui_state::UiState::derive`]).
//! 4. *Outcome*: the [`FlowListener`] receives either the completion data or a
//!    [`FlowError`] with a message for the user.
//!
//! [`OrderController::start`]: crate::controller::OrderController::start
//! [`FlowListener`]: crate::controller::FlowListener
//! [`FlowError`]: crate::controller::FlowError

pub mod config;
pub mod controller;
pub mod core;
pub mod flows;
pub mod gateway;
pub mod poller;
pub mod qr;
