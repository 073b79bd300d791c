//! Engine worker loop.
//!
//! One worker per user: build the strategy, fetch warmup history, recover
//! the position, then poll the exchange once per tick and feed every newly
//! closed bar to the orchestrator. Cancellation is checked between ticks, so
//! a bar that started processing always finishes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use trading_core::error::ExchangeError;
use trading_strategies::{StrategyKind, StrategyRegistry};

use crate::error::EngineError;
use crate::events::{EngineEvent, EngineStatus};
use crate::orchestrator::{BarOrchestrator, EngineDeps, EngineSettings};
use crate::warmup;

/// Bars requested per tick once the engine is warm.
pub const LIVE_FETCH_COUNT: usize = 3;

/// Status cell shared between a worker and the manager.
pub type SharedStatus = Arc<RwLock<EngineStatus>>;

/// Worker timing and sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub buffer_capacity: usize,
    /// Largest history the exchange returns per request
    pub fetch_limit: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            buffer_capacity: trading_indicators::DEFAULT_BUFFER_CAPACITY,
            fetch_limit: 200,
        }
    }
}

/// Everything needed to start one user's engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSpec {
    pub settings: EngineSettings,
    pub strategy: StrategyKind,
    /// Strategy configuration; `null` for defaults
    #[serde(default)]
    pub config: serde_json::Value,
    /// Rule toggles; `null` for defaults
    #[serde(default)]
    pub conditions: serde_json::Value,
    /// Track unsettled orders with the shared reconciler
    pub reconcile: bool,
}

impl EngineSpec {
    /// Spec with default strategy settings. LIVE engines use the reconciler.
    pub fn new(settings: EngineSettings, strategy: StrategyKind) -> Self {
        let reconcile = settings.mode.is_live();
        Self {
            settings,
            strategy,
            config: serde_json::Value::Null,
            conditions: serde_json::Value::Null,
            reconcile,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_conditions(mut self, conditions: serde_json::Value) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.settings.user_id
    }
}

/// Run one engine until `cancel` is set.
///
/// Returns `Ok(())` only on cancellation; every `Err` is an unhandled fault.
pub async fn run_engine(
    spec: EngineSpec,
    deps: EngineDeps,
    config: WorkerConfig,
    status: SharedStatus,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    let settings = spec.settings.clone();
    let strategy = StrategyRegistry::new().create(spec.strategy, spec.config, spec.conditions)?;
    let plan = warmup::plan(
        spec.strategy,
        settings.interval,
        strategy.indicators.slow_period,
        config.fetch_limit,
    );
    let capacity = config.buffer_capacity.max(plan.fetch);
    let mut orch = BarOrchestrator::new(settings.clone(), strategy, deps.clone(), capacity)?;

    info!(
        user_id = %settings.user_id,
        ticker = %settings.ticker,
        interval = %settings.interval,
        strategy = orch.strategy_name(),
        mode = ?settings.mode,
        history = plan.fetch,
        "Starting engine"
    );
    let history = deps
        .exchange
        .fetch_bars(&settings.ticker, settings.interval, plan.fetch)
        .await?;
    orch.warm(&history)?;
    orch.recover_position().await?;

    *status.write() = EngineStatus::Running;
    deps.events
        .publish(EngineEvent::status(&settings.user_id, EngineStatus::Running));
    info!(user_id = %settings.user_id, seeded = orch.is_seeded(), "Engine running");

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *cancel.borrow() {
                    break;
                }
                poll_once(&mut orch, &deps, plan.fetch).await?;
            }
        }
    }

    orch.persist_position().await?;
    info!(user_id = %settings.user_id, bars = orch.bar_count(), "Engine loop exited");
    Ok(())
}

/// Fetch the newest bars and process the ones not seen yet.
async fn poll_once(orch: &mut BarOrchestrator, deps: &EngineDeps, history: usize) -> Result<(), EngineError> {
    let settings = orch.settings().clone();
    let count = if orch.is_seeded() { LIVE_FETCH_COUNT } else { history };
    let bars = match deps.exchange.fetch_bars(&settings.ticker, settings.interval, count).await {
        Ok(bars) => bars,
        Err(e) if is_recoverable(&e) => {
            warn!(user_id = %settings.user_id, error = %e, "Bar fetch failed; retrying next tick");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if !orch.is_seeded() {
        orch.warm(&bars)?;
        return Ok(());
    }

    let last = orch.last_timestamp();
    for bar in bars
        .into_iter()
        .filter(|b| b.is_closed && last.map_or(true, |t| b.timestamp > t))
    {
        let outcome = orch.on_new_bar(bar).await?;
        debug!(user_id = %settings.user_id, bar = bar.timestamp, ?outcome, "Bar processed");
    }
    Ok(())
}

fn is_recoverable(e: &ExchangeError) -> bool {
    e.is_transient() || matches!(e, ExchangeError::RetriesExhausted { .. })
}
