//! Sniffles CLI
//!
//! Runs a local forwarding HTTP proxy in front of an upstream server. Every
//! forwarded call goes through the Sniffles interception pipeline, is printed
//! as it completes, and can be slowed down or failed on demand through the
//! control API under `/__sniffles`.

use clap::Parser;
use sniffles_core::config::defaults::DEFAULT_PROXY_PORT;
use sniffles_core::events::forward_events;
use sniffles_core::{FailureKind, Sniffles, SnifflesConfig, StdoutEventSink};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod control;
mod http_proxy;

/// Sniffles - record and break HTTP calls on purpose
///
/// Point your client at the proxy instead of the real server.
#[derive(Parser, Debug)]
#[command(name = "sniffles")]
#[command(version, about, long_about = None)]
struct Args {
    /// Upstream server base URL, e.g. http://localhost:8080
    #[arg(short, long, env = "SNIFFLES_UPSTREAM")]
    upstream: String,

    /// Port the proxy listens on
    #[arg(short, long, env = "SNIFFLES_PORT", default_value_t = DEFAULT_PROXY_PORT)]
    port: u16,

    /// JSON configuration file
    #[arg(short, long, env = "SNIFFLES_CONFIG")]
    config: Option<PathBuf>,

    /// Inject failures of this kind: network, timeout or server_error
    #[arg(long, value_name = "KIND")]
    fail: Option<FailureKind>,

    /// Delay every call by this many milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Never complete any call
    #[arg(long)]
    stall: bool,

    /// Number of calls kept in history
    #[arg(long, value_name = "N")]
    history_capacity: Option<usize>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Config file (or defaults) with command-line overrides applied
    fn build_config(&self) -> sniffles_core::Result<SnifflesConfig> {
        let mut config = match &self.config {
            Some(path) => SnifflesConfig::from_file(path)?,
            None => SnifflesConfig::new(),
        };

        if let Some(kind) = self.fail {
            config.faults.failure_enabled = true;
            config.faults.failure_kind = kind;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.faults.delay_ms = delay_ms;
        }
        if self.stall {
            config.faults.infinite_stall = true;
        }
        if let Some(capacity) = self.history_capacity {
            config.history_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match args.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sniffles = match Sniffles::with_config(config) {
        Ok(sniffles) => sniffles,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let event_sink = StdoutEventSink::new(args.format == OutputFormat::Json);
    let events = sniffles.subscribe();
    tokio::spawn(async move {
        forward_events(events, &event_sink).await;
    });

    tracing::info!(
        "Starting Sniffles proxy on port {} -> {}",
        args.port,
        args.upstream
    );

    match http_proxy::run_http_proxy(args.upstream, args.port, sniffles).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
