use std::{
    net::IpAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Context};
use arvsskifte_bankid::{
    config::{BaseUrl, FlowConfig, ProxyConfig},
    controller::{FlowError, FlowListener, OrderController},
    core::{
        device::{AppLauncher, DeviceClass},
        order::CompletionData,
        personal_number::PersonalNumber,
        request::StartRequest,
        ui_state::UiState,
        util::ReqwestClient,
    },
    gateway::{Gateway, ProxyGateway, ScriptedGateway},
};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "bankid-cli")]
#[command(about = "Run one BankID identification or signing order")]
#[command(version)]
struct Cli {
    /// URL of the backend function proxying the relying-party API
    #[arg(long, env = "BANKID_PROXY_URL", required_unless_present = "mock")]
    proxy_url: Option<BaseUrl>,

    /// Key sent as `apikey` and bearer token
    #[arg(long, env = "BANKID_PROXY_API_KEY")]
    api_key: Option<String>,

    /// Address of the user's device
    #[arg(long, env = "END_USER_IP")]
    end_user_ip: Option<IpAddr>,

    /// Only this person may complete the order (YYYYMMDD-NNNN or YYMMDD-NNNN)
    #[arg(long)]
    personal_number: Option<PersonalNumber>,

    /// Behave like a phone: print the auto start link instead of QR codes
    #[arg(long, default_value = "false")]
    mobile: bool,

    /// Answer from a built-in script instead of calling the provider
    #[arg(long, default_value = "false")]
    mock: bool,

    #[arg(long, default_value = "120", env = "BANKID_TIMEOUT_SECS")]
    timeout_secs: u64,

    #[arg(long, default_value = "1000", env = "BANKID_POLL_INTERVAL_MS")]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the user
    Auth,
    /// Have the user sign a text
    Sign {
        text: String,
        /// Render the text with the provider's markdown subset
        #[arg(long, default_value = "false")]
        markdown: bool,
    },
}

type Outcome = Result<CompletionData, FlowError>;

/// Prints progress and hands the outcome back to `main`.
struct TerminalListener {
    outcome: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl TerminalListener {
    fn finish(&self, outcome: Outcome) {
        let sender = self.outcome.lock().ok().and_then(|mut sender| sender.take());
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }
}

impl FlowListener for TerminalListener {
    fn on_state(&self, state: UiState, message: &str) {
        if message.is_empty() {
            println!("[{state}]");
        } else {
            println!("[{state}] {message}");
        }
    }

    fn on_qr_payload(&self, payload: &str) {
        println!("QR: {payload}");
    }

    fn on_complete(&self, completion: CompletionData) {
        self.finish(Ok(completion));
    }

    fn on_failure(&self, error: FlowError) {
        self.finish(Err(error));
    }
}

/// Prints the link for the user to open by hand.
#[derive(Debug)]
struct PrintLauncher;

impl AppLauncher for PrintLauncher {
    fn launch(&self, link: &Url) -> bool {
        println!("Open the BankID app: {link}");
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;

    let gateway: Arc<dyn Gateway> = match &cli.proxy_url {
        _ if cli.mock => Arc::new(demo_script()),
        Some(base) => {
            let config = ProxyConfig {
                base: base.clone(),
                end_user_ip: cli.end_user_ip,
                api_key: cli.api_key.clone(),
            };
            Arc::new(ProxyGateway::new(ReqwestClient::new()?, config))
        }
        None => bail!("--proxy-url is required unless --mock is given"),
    };
    debug!(?gateway, "gateway ready");

    let (sender, receiver) = oneshot::channel();
    let listener = TerminalListener {
        outcome: Mutex::new(Some(sender)),
    };

    let config = FlowConfig {
        timeout_secs: cli.timeout_secs,
        poll_interval_ms: cli.poll_interval_ms,
        ..FlowConfig::default()
    };
    let device = if cli.mobile {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    let controller = OrderController::builder()
        .with_gateway(gateway)
        .with_listener(Arc::new(listener))
        .with_launcher(Arc::new(PrintLauncher))
        .with_device(device)
        .with_config(config)
        .build()?;

    let mut request = match cli.command {
        Command::Auth => StartRequest::authenticate(),
        Command::Sign { text, markdown } => {
            let request = StartRequest::sign(text);
            if markdown {
                request.with_markdown()
            } else {
                request
            }
        }
    };
    if let Some(personal_number) = cli.personal_number {
        request = request.with_personal_number(personal_number);
    }
    if let Some(ip) = cli.end_user_ip {
        request = request.with_end_user_ip(ip);
    }

    let order = controller
        .start(request)
        .await
        .context("unable to start order")?;
    info!(order_ref = %order.order_ref(), "waiting for the user");

    tokio::select! {
        outcome = receiver => match outcome.context("order ended without an outcome")? {
            Ok(completion) => {
                println!(
                    "Done: {} ({})",
                    completion.user.name, completion.user.personal_number
                );
                Ok(())
            }
            Err(error) => {
                eprintln!("{}", error.user_message());
                Err(error.into())
            }
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("unable to listen for ctrl-c")?;
            controller.cancel().await;
            bail!("cancelled by user")
        }
    }
}

/// A short happy path: the app is opened, the user signs.
fn demo_script() -> ScriptedGateway {
    let mut gateway = ScriptedGateway::new();
    for _ in 0..3 {
        gateway = gateway.then_pending("outstandingTransaction");
    }
    gateway
        .then_pending("started")
        .then_pending("userSign")
        .then_complete_after(Duration::from_millis(500), ScriptedGateway::sample_completion())
}

fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("invalid log filter")?
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=info".parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
        .init();
    Ok(())
}
