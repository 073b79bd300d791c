//! Per-user engine lifecycle.
//!
//! The manager owns the registry of running engines, one supervisor task per
//! user, and the lease on the shared settlement reconciler. A supervisor
//! restarts a failed worker with increasing delays and gives up after
//! `max_restarts`, leaving the engine in [`EngineStatus::Failed`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use trading_core::traits::{split_ticker, ExchangeClient, Store};
use trading_strategies::StrategyRegistry;

use crate::error::EngineError;
use crate::events::{EngineEvent, EngineStatus, EventBus};
use crate::orchestrator::EngineDeps;
use crate::reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle};
use crate::runner::{run_engine, EngineSpec, SharedStatus, WorkerConfig};

/// Lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// How long `stop` waits for a worker to finish its current bar
    pub stop_timeout_ms: u64,
    /// Delay before restart `n` is `restart_delays_secs[n - 1]`; the last
    /// entry repeats
    pub restart_delays_secs: Vec<u64>,
    pub max_restarts: u32,
    pub worker: WorkerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 10_000,
            restart_delays_secs: vec![60, 300, 900],
            max_restarts: 3,
            worker: WorkerConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn restart_delay(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) - 1) as usize;
        let secs = self
            .restart_delays_secs
            .get(index)
            .or_else(|| self.restart_delays_secs.last())
            .copied()
            .unwrap_or(60);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct EngineRecord {
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
    status: SharedStatus,
}

#[derive(Default)]
struct LeaseState {
    holders: usize,
    handle: Option<ReconcilerHandle>,
}

/// Reference-counted ownership of the reconciler worker.
struct ReconcilerLease {
    reconciler: Reconciler,
    state: Mutex<LeaseState>,
}

impl ReconcilerLease {
    fn acquire(&self) {
        let mut state = self.state.lock();
        state.holders += 1;
        if state.holders == 1 {
            state.handle = Some(self.reconciler.start());
        }
    }

    async fn release(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.holders = state.holders.saturating_sub(1);
            if state.holders == 0 {
                state.handle.take()
            } else {
                None
            }
        };
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    fn holders(&self) -> usize {
        self.state.lock().holders
    }

    fn is_running(&self) -> bool {
        self.state
            .lock()
            .handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// Starts, stops and supervises one engine per user.
pub struct EngineManager {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    events: EventBus,
    config: ManagerConfig,
    registry: StrategyRegistry,
    lease: Arc<ReconcilerLease>,
    engines: DashMap<String, EngineRecord>,
}

impl EngineManager {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        events: EventBus,
        config: ManagerConfig,
        reconciler_config: ReconcilerConfig,
    ) -> Self {
        let reconciler = Reconciler::new(exchange.clone(), store.clone(), events.clone(), reconciler_config);
        Self {
            exchange,
            store,
            events,
            config,
            registry: StrategyRegistry::new(),
            lease: Arc::new(ReconcilerLease {
                reconciler,
                state: Mutex::new(LeaseState::default()),
            }),
            engines: DashMap::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.lease.reconciler
    }

    /// Start an engine for `spec.settings.user_id`.
    ///
    /// The strategy and ticker are validated before anything is spawned.
    /// A user whose worker is still alive gets [`StartOutcome::AlreadyRunning`].
    pub fn start(&self, spec: EngineSpec) -> Result<StartOutcome, EngineError> {
        let user_id = spec.user_id().to_string();
        if split_ticker(&spec.settings.ticker).is_none() {
            return Err(EngineError::InvalidSpec(format!("invalid ticker {}", spec.settings.ticker)));
        }
        self.registry
            .create(spec.strategy, spec.config.clone(), spec.conditions.clone())?;

        let entry = self.engines.entry(user_id.clone());
        if let Entry::Occupied(ref existing) = entry {
            if !existing.get().join.is_finished() {
                info!(%user_id, "Engine already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let status: SharedStatus = Arc::new(RwLock::new(EngineStatus::Starting));
        let lease = spec.reconcile.then(|| {
            self.lease.acquire();
            self.lease.clone()
        });
        let deps = EngineDeps {
            exchange: self.exchange.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            reconciler: spec.reconcile.then(|| self.lease.reconciler.clone()),
        };

        info!(
            %user_id,
            ticker = %spec.settings.ticker,
            strategy = %spec.strategy,
            reconcile = spec.reconcile,
            "Starting engine worker"
        );
        self.events
            .publish(EngineEvent::status(&user_id, EngineStatus::Starting));
        let join = tokio::spawn(supervise(
            spec,
            deps,
            self.config.clone(),
            status.clone(),
            cancel_rx,
            lease,
        ));

        let record = EngineRecord {
            cancel: cancel_tx,
            join,
            status,
        };
        match entry {
            Entry::Occupied(mut e) => {
                e.insert(record);
            }
            Entry::Vacant(e) => {
                e.insert(record);
            }
        }
        Ok(StartOutcome::Started)
    }

    /// Request a stop and wait, up to the stop timeout, for the worker to
    /// finish. The engine is removed from the registry either way.
    ///
    /// Returns `false` when no engine was registered for the user.
    pub async fn stop(&self, user_id: &str) -> bool {
        let Some((_, record)) = self.engines.remove(user_id) else {
            return false;
        };
        let _ = record.cancel.send(true);
        let limit = Duration::from_millis(self.config.stop_timeout_ms);
        match timeout(limit, record.join).await {
            Ok(Ok(())) => info!(%user_id, "Engine stopped"),
            Ok(Err(e)) => error!(%user_id, error = %e, "Engine supervisor ended abnormally"),
            Err(_) => warn!(
                %user_id,
                timeout_ms = self.config.stop_timeout_ms,
                "Engine did not stop in time; removed from registry"
            ),
        }
        true
    }

    /// Stop every registered engine concurrently.
    pub async fn shutdown(&self) {
        let users: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        join_all(users.iter().map(|user| self.stop(user))).await;
    }

    pub fn status(&self, user_id: &str) -> Option<EngineStatus> {
        self.engines.get(user_id).map(|r| r.status.read().clone())
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.engines
            .get(user_id)
            .is_some_and(|r| !r.join.is_finished() && r.status.read().is_active())
    }

    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Engines currently holding the reconciler.
    pub fn reconciler_holders(&self) -> usize {
        self.lease.holders()
    }

    pub fn reconciler_running(&self) -> bool {
        self.lease.is_running()
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Run attempts of one engine until it stops or restarts run out.
async fn supervise(
    spec: EngineSpec,
    deps: EngineDeps,
    config: ManagerConfig,
    status: SharedStatus,
    mut cancel: watch::Receiver<bool>,
    lease: Option<Arc<ReconcilerLease>>,
) {
    let user_id = spec.user_id().to_string();
    let events = deps.events.clone();
    let mut failures = 0u32;

    let final_status = loop {
        if *cancel.borrow() {
            break EngineStatus::Stopped;
        }
        let attempt = tokio::spawn(run_engine(
            spec.clone(),
            deps.clone(),
            config.worker.clone(),
            status.clone(),
            cancel.clone(),
        ));
        let reason = match attempt.await {
            Ok(Ok(())) => break EngineStatus::Stopped,
            Ok(Err(e)) => e.to_string(),
            Err(e) => EngineError::Panicked(e.to_string()).to_string(),
        };
        if *cancel.borrow() {
            warn!(%user_id, error = %reason, "Engine failed while stopping");
            break EngineStatus::Stopped;
        }

        failures += 1;
        if failures > config.max_restarts {
            error!(
                %user_id,
                failures,
                error = %reason,
                "CRITICAL: engine restarts exhausted, operator intervention required"
            );
            events.publish(EngineEvent::Exception {
                user_id: user_id.clone(),
                message: reason.clone(),
                critical: true,
            });
            break EngineStatus::Failed { reason };
        }

        let delay = config.restart_delay(failures);
        warn!(
            %user_id,
            attempt = failures,
            max = config.max_restarts,
            delay_secs = delay.as_secs(),
            error = %reason,
            "Engine failed; scheduling restart"
        );
        events.publish(EngineEvent::Exception {
            user_id: user_id.clone(),
            message: reason,
            critical: false,
        });
        let restarting = EngineStatus::Restarting { attempt: failures };
        *status.write() = restarting.clone();
        events.publish(EngineEvent::status(&user_id, restarting));

        tokio::select! {
            _ = sleep(delay) => {}
            _ = wait_cancelled(&mut cancel) => break EngineStatus::Stopped,
        }
    };

    *status.write() = final_status.clone();
    events.publish(EngineEvent::status(&user_id, final_status.clone()));
    if let Some(lease) = lease {
        lease.release().await;
    }
    info!(%user_id, status = %final_status, "Engine supervisor exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use trading_broker::PaperExchange;
    use trading_core::error::ExchangeError;
    use trading_core::types::{Bar, ExecutionMode, Interval, OrderHandle, OrderStatusReport};
    use trading_data::MemoryStore;
    use trading_strategies::StrategyKind;

    use crate::orchestrator::EngineSettings;

    fn manager(exchange: Arc<dyn ExchangeClient>) -> EngineManager {
        EngineManager::new(
            exchange,
            Arc::new(MemoryStore::new(dec!(1000000), "KRW")),
            EventBus::default(),
            ManagerConfig::default(),
            ReconcilerConfig::default(),
        )
    }

    fn spec(user: &str) -> EngineSpec {
        EngineSpec::new(
            EngineSettings::new(user, "KRW-BTC", Interval::Minute1, ExecutionMode::Test),
            StrategyKind::Macd,
        )
    }

    /// Exchange whose bar feed panics.
    struct Exploding;

    #[async_trait]
    impl ExchangeClient for Exploding {
        async fn fetch_bars(&self, _ticker: &str, _interval: Interval, _count: usize) -> Result<Vec<Bar>, ExchangeError> {
            panic!("feed exploded")
        }

        async fn place_market_buy(&self, ticker: &str, _quote_amount: Decimal) -> Result<OrderHandle, ExchangeError> {
            Err(ExchangeError::UnknownTicker(ticker.to_string()))
        }

        async fn place_market_sell(&self, ticker: &str, _base_quantity: Decimal) -> Result<OrderHandle, ExchangeError> {
            Err(ExchangeError::UnknownTicker(ticker.to_string()))
        }

        async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, ExchangeError> {
            Err(ExchangeError::OrderNotFound(order_id.to_string()))
        }

        async fn get_balance(&self, _currency: &str) -> Result<Decimal, ExchangeError> {
            Ok(Decimal::ZERO)
        }

        fn name(&self) -> &str {
            "exploding"
        }
    }

    #[test]
    fn test_restart_delays() {
        let config = ManagerConfig::default();
        assert_eq!(config.restart_delay(1), Duration::from_secs(60));
        assert_eq!(config.restart_delay(2), Duration::from_secs(300));
        assert_eq!(config.restart_delay(3), Duration::from_secs(900));
        assert_eq!(config.restart_delay(7), Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_engine_per_user() {
        let mgr = manager(Arc::new(PaperExchange::default()));
        assert_eq!(mgr.start(spec("alice")).unwrap(), StartOutcome::Started);
        assert_eq!(mgr.start(spec("alice")).unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(mgr.start(spec("bob")).unwrap(), StartOutcome::Started);

        sleep(Duration::from_secs(3)).await;
        assert!(mgr.is_running("alice"));
        assert_eq!(mgr.status("alice"), Some(EngineStatus::Running));
        assert_eq!(mgr.users(), vec!["alice".to_string(), "bob".to_string()]);

        assert!(mgr.stop("alice").await);
        assert!(!mgr.is_running("alice"));
        assert!(!mgr.stop("alice").await);
        assert!(mgr.is_running("bob"));

        // A stopped user can start again
        assert_eq!(mgr.start(spec("alice")).unwrap(), StartOutcome::Started);
        mgr.shutdown().await;
        assert!(mgr.users().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_spec_is_rejected_up_front() {
        let mgr = manager(Arc::new(PaperExchange::default()));
        let mut bad = spec("alice");
        bad.settings.ticker = "BTC".into();
        assert!(matches!(mgr.start(bad), Err(EngineError::InvalidSpec(_))));

        let bad = spec("alice").with_config(serde_json::json!({ "fast_period": 30, "slow_period": 10 }));
        assert!(matches!(mgr.start(bad), Err(EngineError::Strategy(_))));
        assert!(mgr.users().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_then_fails_critically() {
        let exchange = PaperExchange::default();
        exchange.replay_bars("KRW-BTC", Vec::new(), 0);
        let mgr = manager(Arc::new(exchange));
        let mut events = mgr.events().subscribe();

        mgr.start(spec("alice")).unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(mgr.status("alice"), Some(EngineStatus::Restarting { attempt: 1 }));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(mgr.status("alice"), Some(EngineStatus::Restarting { attempt: 2 }));

        sleep(Duration::from_secs(300 + 900)).await;
        assert!(matches!(mgr.status("alice"), Some(EngineStatus::Failed { .. })));
        assert!(!mgr.is_running("alice"));

        let mut exceptions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::Exception { critical, .. } = event {
                exceptions.push(critical);
            }
        }
        assert_eq!(exceptions, vec![false, false, false, true]);

        // A failed engine can be started again
        assert_eq!(mgr.start(spec("alice")).unwrap(), StartOutcome::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_counts_as_failure() {
        let mgr = manager(Arc::new(Exploding));
        mgr.start(spec("alice")).unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(mgr.status("alice"), Some(EngineStatus::Restarting { attempt: 1 }));

        // Stop during the restart delay
        assert!(mgr.stop("alice").await);
        assert_eq!(mgr.status("alice"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciler_started_once_for_reconciling_engines() {
        let mgr = manager(Arc::new(PaperExchange::default()));
        mgr.start(spec("alice").with_reconcile(true)).unwrap();
        mgr.start(spec("bob").with_reconcile(true)).unwrap();
        mgr.start(spec("carol")).unwrap();
        assert_eq!(mgr.reconciler_holders(), 2);
        assert!(mgr.reconciler_running());

        mgr.stop("alice").await;
        assert_eq!(mgr.reconciler_holders(), 1);
        assert!(mgr.reconciler_running());

        mgr.stop("bob").await;
        assert_eq!(mgr.reconciler_holders(), 0);
        assert!(!mgr.reconciler_running());

        mgr.stop("carol").await;
    }
}
