//! Run the configured engines against the paper exchange.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use trading_broker::{PaperExchange, RetryingExchange};
use trading_config::{AppConfig, UserConfig};
use trading_core::traits::{ExchangeClient, Store};
use trading_data::{load_bars, FileAuditSink, MemoryStore};
use trading_engine::{EngineManager, EventBus, StartOutcome};
use trading_monitor::spawn_event_logger;

use crate::cli::RunArgs;

pub async fn run(args: RunArgs, mut config: AppConfig) -> Result<()> {
    for (user_id, fix) in config.prepare_users()? {
        warn!(user_id = %user_id, "Parameter corrected: {}", fix);
    }

    let users: Vec<UserConfig> = config
        .users
        .iter()
        .filter(|u| args.users.is_empty() || args.users.contains(&u.user_id))
        .cloned()
        .collect();
    if users.is_empty() {
        bail!("No users to run. Add [[users]] to the configuration or check --users");
    }
    if let Some(user) = users.iter().find(|u| u.mode.is_live()) {
        bail!(
            "User {} requests LIVE mode, but no real exchange client is available; use mode = \"TEST\"",
            user.user_id
        );
    }

    // Exchange
    let paper = PaperExchange::new(config.paper.clone());
    if let Some(dir) = &args.data {
        let tickers: BTreeSet<&str> = users.iter().map(|u| u.params.ticker.as_str()).collect();
        for ticker in tickers {
            let path = dir.join(format!("{ticker}.csv"));
            if !path.is_file() {
                warn!(ticker, path = %path.display(), "No replay file; using synthetic bars");
                continue;
            }
            let bars = load_bars(&path).with_context(|| format!("Failed to load {}", path.display()))?;
            info!(ticker, bars = bars.len(), "Replaying bars");
            paper.replay_bars(ticker, bars, args.warmup_bars);
        }
    }
    let exchange: Arc<dyn ExchangeClient> = Arc::new(RetryingExchange::new(paper, config.engine.retry.clone()));

    // Persistence
    let memory = MemoryStore::new(config.paper.initial_cash, config.paper.quote_currency.clone());
    let store: Arc<dyn Store> = match config.app.audit_dir.clone() {
        Some(dir) => Arc::new(
            FileAuditSink::open(&dir, memory)
                .with_context(|| format!("Failed to open audit directory {}", dir.display()))?,
        ),
        None => Arc::new(memory),
    };

    let events = EventBus::new(config.engine.event_capacity);
    let drain = spawn_event_logger(events.subscribe());
    let manager = EngineManager::new(
        exchange,
        store,
        events,
        config.engine.manager_config(),
        config.reconciler.clone(),
    );

    for user in &users {
        let spec = user.engine_spec(&config)?;
        match manager.start(spec) {
            Ok(StartOutcome::Started) => {}
            Ok(StartOutcome::AlreadyRunning) => warn!(user_id = %user.user_id, "Engine already running"),
            Err(e) => error!(user_id = %user.user_id, error = %e, "Engine failed to start"),
        }
    }
    info!(engines = manager.users().len(), "Engines started; press Ctrl-C to stop");

    let mut report = tokio::time::interval(Duration::from_secs(args.status_every.max(1)));
    report.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = report.tick(), if args.status_every > 0 => {
                for user_id in manager.users() {
                    info!(user_id = %user_id, status = ?manager.status(&user_id), "Engine status");
                }
                if manager.users().is_empty() {
                    warn!("No engines left running");
                    break;
                }
            }
        }
    }

    info!("Shutting down engines");
    manager.shutdown().await;
    drop(manager);

    match tokio::time::timeout(Duration::from_secs(5), drain).await {
        Ok(Ok(stats)) => info!(
            logs = stats.logs,
            trades = stats.trades,
            exceptions = stats.exceptions,
            dropped = stats.dropped,
            "Event drain finished"
        ),
        Ok(Err(e)) => warn!(error = %e, "Event drain task failed"),
        Err(_) => warn!("Event drain did not finish; some events may be unlogged"),
    }

    Ok(())
}
