use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use account_stream::{AccountStreamSupervisor, SupervisorState};
use anyhow::Context;
use balance_ledger::{BalanceLedger, SharedLedger};
use binance_rest::{ApiCredentials, BinanceRestClient};
use clap::Parser;
use connector_binance::{run_kline_stream, BinanceAccountFeed, KlineStreamConfig};
use exchange_core::ExchangeApi;
use execution_core::OrderExecutor;
use metrics::{create_metrics, SharedMetrics};
use notifier::build_notifier;
use strategy_runner::StrategyRuntime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

mod settings;

use crate::settings::AppConfig;

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// How long tasks get to wind down after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const CANDLE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "quant-bot", version, about = "Candle-driven spot trading bot for Binance")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "config/bot.toml")]
    config: PathBuf,

    /// Load config, fetch the account snapshot, print balances and exit.
    #[arg(long)]
    dry_check: bool,
}

type TaskResult = (String, anyhow::Result<()>);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard =
        match common::init_logging(&config.logging.filter, config.logging.dir.as_deref()) {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("failed to initialize logging: {}", e);
                return ExitCode::FAILURE;
            }
        };

    match run(config, cli.dry_check).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig, dry_check: bool) -> anyhow::Result<ExitCode> {
    let environment = config.exchange.environment;
    info!(
        environment = %environment,
        strategies = config.strategies.len(),
        "Starting quant bot"
    );
    if environment.is_production() {
        warn!("Trading on PRODUCTION with real funds");
    }

    let credentials = ApiCredentials::resolve(
        config.exchange.api_key.clone(),
        config.exchange.secret_key.clone(),
    )?;
    let rest = Arc::new(BinanceRestClient::new(credentials, environment)?);
    rest.sync_time().await.context("server time sync")?;

    if dry_check {
        return dry_check_balances(&rest).await;
    }

    let metrics = create_metrics();
    let ledger: SharedLedger =
        Arc::new(BalanceLedger::new(config.ledger).with_metrics(metrics.clone()));
    let notifier = build_notifier(config.notifier.bark.as_ref())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed = Arc::new(BinanceAccountFeed::new(environment, metrics.clone()));
    let (supervisor_handle, stream_state) = AccountStreamSupervisor::new(
        rest.clone(),
        feed,
        ledger.clone(),
        config.stream,
        metrics.clone(),
    )
    .with_notifier(notifier.clone())
    .start(shutdown_rx.clone())
    .await
    .context("initial balance snapshot")?;

    let executor = Arc::new(OrderExecutor::new(
        rest.clone(),
        ledger.clone(),
        config.execution.clone(),
        metrics.clone(),
    ));

    let mut tasks = JoinSet::new();
    spawn_named(&mut tasks, "account stream", async move {
        supervisor_handle.await.context("account stream task panicked")
    });

    for strategy in &config.strategies {
        let runtime = StrategyRuntime::new(
            strategy.clone(),
            executor.clone(),
            ledger.clone(),
            notifier.clone(),
        )?
        .with_notify_capacity(config.ledger.notify_capacity);
        let runtime = Arc::new(runtime);
        let symbol = runtime.symbol().to_string();

        let stream_config = KlineStreamConfig::new(environment, symbol.clone())
            .with_interval(strategy.kline_interval.clone())
            .with_backoff(config.stream.backoff, config.stream.stable_after_secs);
        let (candle_tx, candle_rx) = mpsc::channel(CANDLE_CHANNEL_CAPACITY);

        let stream_metrics = metrics.clone();
        let stream_shutdown = shutdown_rx.clone();
        spawn_named(&mut tasks, format!("kline stream {}", symbol), async move {
            run_kline_stream(stream_config, candle_tx, stream_shutdown, stream_metrics)
                .await
                .map_err(Into::into)
        });
        spawn_named(&mut tasks, format!("strategy {}", strategy.name), async move {
            runtime.run(candle_rx).await.map_err(Into::into)
        });
    }

    tokio::spawn(report_health(
        metrics.clone(),
        ledger.clone(),
        stream_state,
        shutdown_tx.subscribe(),
    ));

    notifier.push("quant bot started").await;
    info!("All tasks running");

    let exit = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, initiating shutdown");
            ExitCode::SUCCESS
        }
        Some(joined) = tasks.join_next() => {
            match joined {
                Ok((name, Ok(()))) => error!(task = %name, "Task exited"),
                Ok((name, Err(e))) => error!(task = %name, error = %format!("{:#}", e), "Task failed"),
                Err(e) => error!(error = %e, "Task panicked"),
            }
            ExitCode::FAILURE
        }
    };

    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Tasks still running after grace period, aborting");
        tasks.abort_all();
    }

    println!("\n{}", metrics.snapshot());
    info!("Shutdown complete");
    Ok(exit)
}

fn spawn_named<F>(tasks: &mut JoinSet<TaskResult>, name: impl Into<String>, task: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let name = name.into();
    tasks.spawn(async move { (name, task.await) });
}

async fn dry_check_balances(rest: &BinanceRestClient) -> anyhow::Result<ExitCode> {
    let snapshot = rest
        .account_snapshot()
        .await
        .context("account snapshot")?;

    let mut balances: Vec<_> = snapshot.balances.into_iter().collect();
    balances.sort_by(|a, b| a.0.cmp(&b.0));

    println!("Account snapshot at {} ms", snapshot.update_time_ms);
    for (asset, free) in balances {
        println!("  {:<10} {}", asset, free);
    }
    Ok(ExitCode::SUCCESS)
}

async fn report_health(
    metrics: SharedMetrics,
    ledger: SharedLedger,
    stream_state: watch::Receiver<SupervisorState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = metrics.snapshot();
                let state = *stream_state.borrow();
                let mut balances: Vec<_> = ledger.snapshot().into_iter().collect();
                balances.sort_by(|a, b| a.0.cmp(&b.0));
                info!(
                    status = %snapshot.health_status(),
                    stream = %state,
                    candles = snapshot.candles_received,
                    balance_updates = snapshot.balance_updates_applied,
                    orders = snapshot.orders_submitted,
                    order_failures = snapshot.order_failures,
                    errors = snapshot.stream_errors + snapshot.parse_errors,
                    reconnects = snapshot.reconnect_attempts,
                    since_account_event_secs = ?snapshot.secs_since_last_account_message,
                    balances = ?balances,
                    "Health check"
                );
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
