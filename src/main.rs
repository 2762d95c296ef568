//! dataiku-mcp: MCP server for AI-assisted Dataiku DSS project management
//!
//! This tool exposes recipes, datasets, scenarios, jobs and project
//! configuration of a DSS instance as MCP tools over stdio.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use dataiku_mcp::config;
use dataiku_mcp::dss::{Dss, DssClient, Polling};
use dataiku_mcp::mcp::server::McpServer;

/// MCP server for AI-assisted Dataiku DSS project management.
///
/// Connection settings come from the configuration file, a `.env` file or
/// the `DSS_HOST` and `DSS_API_KEY` environment variables.
#[derive(Parser, Debug)]
#[command(name = "dataiku-mcp")]
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
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. stdout carries MCP messages, so logs go to stderr.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the dataiku-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                eprintln!("\nSet DSS_HOST and DSS_API_KEY, or add them to a .env file.");
                if let Some(default_path) = config::default_config_path() {
                    eprintln!(
                        "A configuration file may also be placed at: {}",
                        default_path.display()
                    );
                }
            }
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting dataiku-mcp server"
    );

    let client = match DssClient::new(&cfg.dss) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Cannot create DSS client");
            return ExitCode::FAILURE;
        }
    };
    info!(host = client.host(), "DSS client configured");

    let dss = Dss::new(Arc::new(client), Polling::from(&cfg.jobs));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    // The server still starts when DSS is unreachable; tool calls report the failure.
    match runtime.block_on(dss.instance_info()) {
        Ok(instance) => info!(
            version = instance
                .get("dssVersion")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown"),
            "Connected to DSS"
        ),
        Err(e) => warn!(error = %e, "DSS connection check failed"),
    }

    let mut server = McpServer::new(dss);

    info!("MCP server ready, waiting for client connection...");

    match runtime.block_on(server.run()) {
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
