//! Relayer Operations CLI
//!
//! - `relay-ops reconcile`        bring every operating chain's delivery
//!   provider config in line with `scriptConfigs/<process>.json`
//! - `relay-ops send-and-verify`  send probe messages through the relayer and
//!   count deliveries, exposing Prometheus metrics while running

use std::sync::Arc;

use clap::{ArgGroup, Parser, Subcommand};
use eyre::{eyre, Result};
use tracing::{error, info, warn};

use relay_ops::config::Config;
use relay_ops::desired::{DesiredConfig, DEFAULT_PROCESS_NAME};
use relay_ops::evm::EvmConnector;
use relay_ops::metrics::DeliveryMetrics;
use relay_ops::output::write_output_files;
use relay_ops::reconciler::{reconcile, ReconcileOptions};
use relay_ops::registry::ChainRegistry;
use relay_ops::scheduler::{LoadTester, RunOptions, Schedule};
use relay_ops::server;
use relay_ops::verifier::VerifyOptions;

#[derive(Parser)]
#[command(name = "relay-ops")]
#[command(about = "Delivery provider reconciliation and relay delivery checks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff delivery provider configs against the desired config and submit updates
    Reconcile {
        /// Script config name under scriptConfigs/
        #[arg(long, default_value = DEFAULT_PROCESS_NAME)]
        process_name: String,

        /// Report differences without sending transactions
        #[arg(long)]
        dry_run: bool,

        /// Skip writing the audit log under the output directory
        #[arg(long)]
        no_output: bool,
    },

    /// Send probe messages and poll the target chain until they arrive
    #[command(group(
        ArgGroup::new("schedule").required(true).args(["from", "per_chain", "matrix"])
    ))]
    SendAndVerify {
        /// Source chain id
        #[arg(long, requires = "to")]
        from: Option<u16>,

        /// Target chain id
        #[arg(long, requires = "from")]
        to: Option<u16>,

        /// Each operating chain sends to the next one
        #[arg(long)]
        per_chain: bool,

        /// Every ordered pair of operating chains
        #[arg(long)]
        matrix: bool,

        /// Passes over the schedule
        #[arg(long, default_value_t = 1, conflicts_with = "continuous")]
        rounds: u32,

        /// Run until interrupted
        #[arg(long)]
        continuous: bool,

        /// Override POLL_ATTEMPTS
        #[arg(long)]
        poll_attempts: Option<u32>,

        /// Override POLL_INTERVAL_MS
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Override SEND_DELAY_MS
        #[arg(long)]
        delay_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::load()?;
    info!(
        env = %config.env,
        config_dir = %config.config_dir.display(),
        "Configuration loaded"
    );

    let registry = ChainRegistry::load(
        &config.env_config_dir(),
        &config.env_output_dir(),
        config.operating_chains.clone(),
    )?;
    let connector = EvmConnector::new(&config.private_key)?;

    match cli.command {
        Commands::Reconcile {
            process_name,
            dry_run,
            no_output,
        } => {
            run_reconcile(
                &config,
                &registry,
                &connector,
                &process_name,
                dry_run,
                no_output,
            )
            .await
        }
        Commands::SendAndVerify {
            from,
            to,
            per_chain,
            matrix,
            rounds,
            continuous,
            poll_attempts,
            poll_interval_ms,
            delay_ms,
        } => {
            let schedule = match (from, to) {
                (Some(from), Some(to)) => Schedule::Single { from, to },
                _ if per_chain => Schedule::Ring,
                _ if matrix => Schedule::Matrix,
                _ => return Err(eyre!("one of --from/--to, --per-chain or --matrix is required")),
            };

            let mut config = config;
            if let Some(n) = poll_attempts {
                config.poll_attempts = n;
            }
            if let Some(ms) = poll_interval_ms {
                config.poll_interval_ms = ms;
            }
            if let Some(ms) = delay_ms {
                config.send_delay_ms = ms;
            }

            let rounds = if continuous { None } else { Some(rounds) };
            run_send_and_verify(&config, &registry, &connector, schedule, rounds).await
        }
    }
}

async fn run_reconcile(
    config: &Config,
    registry: &ChainRegistry,
    connector: &EvmConnector,
    process_name: &str,
    dry_run: bool,
    no_output: bool,
) -> Result<()> {
    let desired = DesiredConfig::load(&config.env_config_dir(), process_name)?;
    info!(
        process_name,
        signer = %connector.address(),
        targets = desired.targets.len(),
        "Desired config loaded"
    );

    let report = reconcile(
        &registry.operating_chains(),
        registry.all_chains(),
        &desired,
        connector,
        &ReconcileOptions { dry_run },
    )
    .await?;

    report.log_summary();

    if !no_output {
        write_output_files(&config.env_output_dir(), process_name, &report)?;
    }

    let failed: Vec<u16> = report.failed().map(|r| r.chain_id).collect();
    if failed.is_empty() {
        info!(applied = report.applied_count(), "Reconciliation complete");
        Ok(())
    } else {
        Err(eyre!("reconciliation failed on chains {:?}", failed))
    }
}

async fn run_send_and_verify(
    config: &Config,
    registry: &ChainRegistry,
    connector: &EvmConnector,
    schedule: Schedule,
    rounds: Option<u32>,
) -> Result<()> {
    if config.poll_attempts == 0 {
        return Err(eyre!("--poll-attempts must be at least 1"));
    }
    let gas_limit = u32::try_from(config.delivery_gas_limit)
        .map_err(|_| eyre!("DELIVERY_GAS_LIMIT must fit in uint32"))?;

    let metrics = Arc::new(DeliveryMetrics::new());
    let options = RunOptions {
        rounds,
        delay: config.send_delay(),
        verify: VerifyOptions {
            poll_attempts: config.poll_attempts,
            poll_interval: config.poll_interval(),
            gas_limit,
        },
    };
    let tester = LoadTester::new(schedule, registry, connector, metrics.clone(), options)?;

    let bind = config.metrics_bind.clone();
    let port = config.metrics_port;
    let schedule_name = schedule.to_string();
    tokio::spawn(async move {
        if let Err(e) = server::start_server(&bind, port, metrics, schedule_name).await {
            error!(error = %e, "Metrics server stopped");
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let counts = tester.run(shutdown_rx).await?;
    if counts.delivered < counts.sent {
        warn!(
            sent = counts.sent,
            delivered = counts.delivered,
            "Not every probe was delivered"
        );
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relay_ops=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
