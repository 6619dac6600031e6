use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_lifecycle::config::{ConfigProvider, FileConfigProvider};
use service_lifecycle::dependency::{CacheDependency, DatabaseDependency};
use service_lifecycle::http::health;
use service_lifecycle::lifecycle::{signals, Orchestrator, Shutdown};
use service_lifecycle::observability::logging::{self, LogFormat};
use service_lifecycle::observability::metrics;

/// Exit code when termination signal handlers cannot be installed (EX_OSERR).
const EXIT_SIGNALS: u8 = 71;

#[derive(Debug, Parser)]
#[command(name = "service-lifecycle")]
#[command(about = "Network service with ordered startup and bounded graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file. SERVICE_* environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-lifecycle starting");

    let provider = FileConfigProvider::new(cli.config.clone());

    if cli.check_config {
        return match provider.load() {
            Ok(_) => {
                tracing::info!("Configuration is valid");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Configuration is invalid");
                ExitCode::from(78)
            }
        };
    }

    if let Some(addr) = cli.metrics_address {
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, address = %addr, "Failed to start metrics exporter");
        }
    }

    let shutdown = Shutdown::new();
    if let Err(e) = signals::install(shutdown.clone()) {
        tracing::error!(error = %e, "Failed to install signal handlers");
        return ExitCode::from(EXIT_SIGNALS);
    }

    let orchestrator = Orchestrator::builder(provider)
        .dependency(DatabaseDependency)
        .dependency(CacheDependency)
        .router(|_config, handles| health::routes(handles))
        .build();

    match orchestrator.run(shutdown).await {
        Ok(report) => {
            tracing::info!(
                forced = report.shutdown.is_err(),
                release_failures = report.release.failures.len(),
                "Server exited"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.code(), "Fatal startup failure");
            e.exit_code()
        }
    }
}
