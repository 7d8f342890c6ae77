//! mcp-framed-server: Content-Length framed MCP server over stdio or TCP
//!
//! Serves the `roll_dice` tool through the protocol engine. Logs go to
//! stderr; in stdio mode stdout carries protocol frames only.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_framed_server::config::{self, Config, TransportKind};
use mcp_framed_server::error::TransportError;
use mcp_framed_server::mcp::provider::ToolProvider;
use mcp_framed_server::mcp::shutdown::{self, ShutdownTrigger};
use mcp_framed_server::mcp::{StdioTransport, TcpTransport};
use mcp_framed_server::tools::DiceRoller;

/// MCP server speaking Content-Length framed JSON-RPC 2.0.
///
/// Runs a single session over stdin/stdout by default, or accepts many
/// concurrent sessions over TCP.
#[derive(Parser, Debug)]
#[command(name = "mcp-framed-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Serve over TCP instead of stdio
    #[arg(long)]
    tcp: bool,

    /// Host to bind in TCP mode
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind in TCP mode
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
}

impl Args {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_to(&self, cfg: &mut Config) {
        if self.tcp {
            cfg.server.transport = TransportKind::Tcp;
        }
        if let Some(host) = &self.host {
            cfg.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
    }
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for the first termination signal and returns its name.
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str, TransportError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|source| TransportError::Signal { source })?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|source| TransportError::Signal { source })?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Waits for the first termination signal and returns its name.
#[cfg(windows)]
async fn shutdown_signal() -> Result<&'static str, TransportError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| TransportError::Signal { source })?;
    Ok("Ctrl+C")
}

/// Cancels the transports once a termination signal arrives.
async fn watch_signals(trigger: ShutdownTrigger) {
    match shutdown_signal().await {
        Ok(name) => {
            info!(signal = name, "Received signal, initiating graceful shutdown");
            trigger.cancel();
        }
        Err(e) => warn!(error = %e, "Signal handling unavailable"),
    }
}

/// Runs the configured transport until it finishes or a signal arrives.
async fn serve(cfg: Config, verbose: bool) -> Result<(), TransportError> {
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(watch_signals(trigger));

    let provider: Arc<dyn ToolProvider> = Arc::new(DiceRoller::new());

    match cfg.server.transport {
        TransportKind::Stdio => {
            info!("MCP server ready, waiting for client on stdio");
            StdioTransport::new(cfg.stdio_config(verbose))
                .run(Some(provider), shutdown)
                .await
        }
        TransportKind::Tcp => {
            TcpTransport::new(cfg.tcp_config(verbose))
                .run(Some(provider), shutdown)
                .await
        }
    }
}

/// Entry point for the mcp-framed-server binary.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    args.apply_to(&mut cfg);
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cfg.server.transport,
        "Starting mcp-framed-server"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(serve(cfg, args.verbose > 0));

    // A pending stdin read lives on the blocking pool and would otherwise
    // hold the process open after shutdown.
    runtime.shutdown_timeout(Duration::from_millis(250));

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
