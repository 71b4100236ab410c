//! HVLP - publish/subscribe broker process
//!
//! Usage:
//!   hvlp [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>          Configuration file path
//!   --admin-bind <ADDR>          Admin endpoint address (default: 127.0.0.1:9090)
//!   --outbound-capacity <N>      Per-connection channel capacity (0 = unbounded)
//!   -l, --log-level <LEVEL>      Log level (error, warn, info, debug, trace)
//!   -h, --help                   Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use hvlp::broker::{Broker, BrokerConfig};
use hvlp::config::Config;
use hvlp::metrics::{AdminServer, Metrics};
use hvlp::registry::Registry;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// HVLP - lightweight publish/subscribe broker
#[derive(Parser, Debug)]
#[command(name = "hvlp")]
#[command(author = "HVLP Contributors")]
#[command(version)]
#[command(about = "Lightweight publish/subscribe broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admin HTTP bind address (/status, /health, /metrics)
    #[arg(long)]
    admin_bind: Option<SocketAddr>,

    /// Per-connection outbound channel capacity (0 = unbounded)
    #[arg(long)]
    outbound_capacity: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    // CLI overrides config, config overrides default (info)
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&file_config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let broker_config = BrokerConfig {
        outbound_channel_capacity: args
            .outbound_capacity
            .unwrap_or(file_config.limits.outbound_channel_capacity),
    };
    let admin_bind = args.admin_bind.unwrap_or(file_config.admin.bind);

    // The one registry for this process, shared with every handler
    let registry = Arc::new(Registry::new());
    let mut broker = Broker::with_registry(registry.clone(), broker_config);

    info!("Starting HVLP broker");
    info!(
        "  Outbound channel capacity: {}",
        broker.config().outbound_channel_capacity
    );

    let metrics = if file_config.admin.metrics {
        let metrics = Arc::new(Metrics::new());
        broker.set_metrics(metrics.clone());
        Some(metrics)
    } else {
        None
    };

    if file_config.admin.enabled {
        info!("  Admin: enabled (http://{})", admin_bind);
        let server = AdminServer::new(registry.clone(), metrics, admin_bind);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Admin server error: {}", e);
            }
        });
    } else {
        info!("  Admin: disabled");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    broker.shutdown();

    Ok(())
}
