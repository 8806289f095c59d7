//! Order engine CLI.
//!
//! Loads configuration, connects to Binance futures, launches one strategy
//! through the supervisor and drives it until it resolves or Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use order_engine::application::ports::ExchangeGateway;
use order_engine::application::strategies::{
    StrategySnapshot, StrategySpec, StrategySupervisor,
};
use order_engine::cli::Cli;
use order_engine::config::{Config, load_config};
use order_engine::domain::shared::StrategyHandle;
use order_engine::infrastructure::{BinanceEnvironment, BinanceFuturesGateway};
use order_engine::telemetry;

type Supervisor = StrategySupervisor<BinanceFuturesGateway>;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    telemetry::init_tracing(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        environment = %config.exchange.environment,
        leverage = config.exchange.default_leverage,
        "Starting order engine"
    );

    config
        .exchange
        .credentials
        .validate()
        .context("Invalid API credentials")?;

    let gateway = Arc::new(
        BinanceFuturesGateway::new(&config.exchange.binance_config())
            .context("Failed to create Binance client")?,
    );
    gateway
        .ping()
        .await
        .context("Binance futures API is unreachable")?;

    let symbol = cli.command.symbol().clone();
    if let Err(e) = gateway
        .set_leverage(&symbol, config.exchange.default_leverage)
        .await
    {
        tracing::warn!(
            symbol = %symbol,
            leverage = config.exchange.default_leverage,
            error = %e,
            "Failed to set leverage, continuing with account setting"
        );
    }

    let supervisor = StrategySupervisor::new(Arc::clone(&gateway), config.supervisor_config());
    let spec = cli.command.into_spec(&config.strategies);
    let handle = supervisor
        .start(spec.clone())
        .await
        .context("Failed to start strategy")?;
    tracing::info!(handle = %handle, "Strategy started");

    let snapshot = match spec {
        StrategySpec::Order(_) => supervisor.get_status(&handle).await?,
        StrategySpec::Oco(_) => drive_oco(&supervisor, &handle, &config).await?,
        StrategySpec::Twap(_) => drive_twap(&supervisor, &handle).await?,
        StrategySpec::Grid(_) => drive_grid(&supervisor, &handle, &config).await?,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize result")?
    );
    Ok(())
}

/// File config, then environment, then command-line flags.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    if cli.testnet {
        config.exchange.environment = BinanceEnvironment::Testnet;
    }
    if cli.debug {
        config.logging.level = "debug".to_string();
    }
    if let Some(leverage) = cli.leverage {
        anyhow::ensure!(
            (1..=125).contains(&leverage),
            "--leverage must be between 1 and 125, got {leverage}"
        );
        config.exchange.default_leverage = leverage;
    }
    Ok(config)
}

/// Reconcile until one leg resolves the group; Ctrl-C cancels both legs.
async fn drive_oco(
    supervisor: &Supervisor,
    handle: &StrategyHandle,
    config: &Config,
) -> Result<StrategySnapshot> {
    let interval = config.strategies.oco.poll_interval();
    loop {
        match supervisor.get_status(handle).await {
            Ok(StrategySnapshot::Oco(snapshot)) if snapshot.status.is_resolved() => {
                return Ok(StrategySnapshot::Oco(snapshot));
            }
            Ok(StrategySnapshot::Oco(snapshot)) => {
                tracing::debug!(status = %snapshot.status, "OCO still open");
            }
            Ok(other) => return Ok(other),
            Err(e) => tracing::warn!(error = %e, "OCO reconcile failed, retrying"),
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, canceling OCO legs");
                return Ok(supervisor.stop(handle).await?);
            }
        }
    }
}

/// Wait for the plan to finish; Ctrl-C cancels remaining chunks.
async fn drive_twap(supervisor: &Supervisor, handle: &StrategyHandle) -> Result<StrategySnapshot> {
    tokio::select! {
        result = supervisor.wait(handle) => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, stopping TWAP");
            Ok(supervisor.stop(handle).await?)
        }
    }
}

/// Maintain the ladder until Ctrl-C, then cancel it.
async fn drive_grid(
    supervisor: &Supervisor,
    handle: &StrategyHandle,
    config: &Config,
) -> Result<StrategySnapshot> {
    let interval = config.strategies.grid.poll_interval();
    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {
                supervisor.update(handle).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping grid");
                return Ok(supervisor.stop(handle).await?);
            }
        }
    }
}

/// Load .env from the current or an ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
