//! Configuration structures.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use trading_broker::{PaperConfig, RetryPolicy, Settlement};
use trading_core::types::ExecutionMode;
use trading_engine::{
    EngineSettings, EngineSpec, ManagerConfig, ReconcilerConfig, WorkerConfig, DEFAULT_EVENT_CAPACITY,
    DEFAULT_MIN_ORDER_VALUE,
};

use crate::conditions::load_conditions;
use crate::error::{ConfigError, ValidationError};
use crate::params::StrategyParams;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
    /// Where `{user}_buy_sell_conditions.json` files are looked up
    pub conditions_dir: PathBuf,
    /// Append-only audit directory; audit stays in memory when unset
    pub audit_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "tradebot".to_string(),
            environment: "development".to_string(),
            conditions_dir: PathBuf::from("conditions"),
            audit_dir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// Daily-rolling log file; console only when unset
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Engine lifecycle, worker and exchange client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub stop_timeout_ms: u64,
    pub restart_delays_secs: Vec<u64>,
    pub max_restarts: u32,
    pub poll_interval_ms: u64,
    pub buffer_capacity: usize,
    pub fetch_limit: usize,
    /// Outbound event channel size; the oldest events drop when full
    pub event_capacity: usize,
    /// Orders and balances below this KRW notional count as dust
    pub min_order_value: i64,
    pub retry: RetryPolicy,
}

impl Default for EngineSection {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            stop_timeout_ms: manager.stop_timeout_ms,
            restart_delays_secs: manager.restart_delays_secs,
            max_restarts: manager.max_restarts,
            poll_interval_ms: manager.worker.poll_interval_ms,
            buffer_capacity: manager.worker.buffer_capacity,
            fetch_limit: manager.worker.fetch_limit,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            min_order_value: DEFAULT_MIN_ORDER_VALUE,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSection {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            stop_timeout_ms: self.stop_timeout_ms,
            restart_delays_secs: self.restart_delays_secs.clone(),
            max_restarts: self.max_restarts,
            worker: WorkerConfig {
                poll_interval_ms: self.poll_interval_ms,
                buffer_capacity: self.buffer_capacity,
                fetch_limit: self.fetch_limit,
            },
        }
    }
}

/// One user's engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub user_id: String,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub params: StrategyParams,
    /// Explicit condition file; overrides the per-user lookup
    #[serde(default)]
    pub conditions_file: Option<PathBuf>,
}

impl UserConfig {
    pub fn new(user_id: impl Into<String>, params: StrategyParams) -> Self {
        Self {
            user_id: user_id.into(),
            mode: ExecutionMode::Test,
            params,
            conditions_file: None,
        }
    }

    /// Engine settings derived from validated parameters.
    pub fn engine_settings(&self, engine: &EngineSection) -> EngineSettings {
        let mut settings = EngineSettings::new(
            self.user_id.clone(),
            self.params.ticker.clone(),
            self.params.interval,
            self.mode,
        );
        settings.order_ratio = Decimal::from_f64(self.params.order_ratio).unwrap_or(Decimal::ONE);
        settings.min_order_value = Decimal::from(engine.min_order_value);
        settings
    }

    /// Complete engine spec, reading the user's condition file.
    pub fn engine_spec(&self, app: &AppConfig) -> Result<EngineSpec, ConfigError> {
        let conditions = load_conditions(
            &app.app.conditions_dir,
            &self.user_id,
            self.params.strategy,
            self.conditions_file.as_deref(),
        )?;
        let reconcile = self.mode.is_live() || app.paper.settlement == Settlement::Deferred;
        Ok(EngineSpec::new(self.engine_settings(&app.engine), self.params.strategy)
            .with_config(self.params.strategy_config())
            .with_conditions(self.params.overlay_conditions(conditions))
            .with_reconcile(reconcile))
    }
}

impl AppConfig {
    /// Sanitize and validate every user.
    ///
    /// Returns `(user_id, correction)` pairs for values that were reset to a
    /// default; the first structural error aborts.
    pub fn prepare_users(&mut self) -> Result<Vec<(String, String)>, ConfigError> {
        let mut seen = HashSet::new();
        let mut fixes = Vec::new();
        for user in &mut self.users {
            let user_id = user.user_id.trim().to_string();
            if user_id.is_empty() {
                return Err(ConfigError::Validation {
                    user_id,
                    source: ValidationError::EmptyUserId,
                });
            }
            if !seen.insert(user_id.clone()) {
                return Err(ConfigError::DuplicateUser(user_id));
            }
            user.user_id = user_id.clone();
            fixes.extend(user.params.sanitize().into_iter().map(|f| (user_id.clone(), f)));
            user.params.validate().map_err(|source| ConfigError::Validation {
                user_id: user_id.clone(),
                source,
            })?;
        }
        Ok(fixes)
    }

    pub fn user(&self, user_id: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    /// Resolve relative file paths against `base`, the config file's directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.app.conditions_dir);
        if let Some(dir) = self.app.audit_dir.as_mut() {
            resolve(dir);
        }
        if let Some(file) = self.logging.file.as_mut() {
            resolve(file);
        }
        for user in &mut self.users {
            if let Some(file) = user.conditions_file.as_mut() {
                resolve(file);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trading_strategies::StrategyKind;

    fn user(id: &str) -> UserConfig {
        UserConfig::new(id, StrategyParams::default())
    }

    #[test]
    fn test_engine_section_maps_to_manager_config() {
        let section = EngineSection {
            max_restarts: 5,
            poll_interval_ms: 250,
            ..Default::default()
        };
        let manager = section.manager_config();
        assert_eq!(manager.max_restarts, 5);
        assert_eq!(manager.worker.poll_interval_ms, 250);
        assert_eq!(manager.restart_delays_secs, vec![60, 300, 900]);
        assert_eq!(EngineSection::default().manager_config(), ManagerConfig::default());
    }

    #[test]
    fn test_prepare_users_sanitizes_and_rejects() {
        let mut app = AppConfig::default();
        let mut alice = user(" alice ");
        alice.params.ticker = "eth".to_string();
        alice.params.order_ratio = 0.0;
        app.users = vec![alice, user("bob")];

        let fixes = app.prepare_users().unwrap();
        assert_eq!(fixes.len(), 2);
        assert!(fixes.iter().all(|(id, _)| id == "alice"));
        assert_eq!(app.user("alice").unwrap().params.ticker, "KRW-ETH");

        app.users.push(user("bob"));
        assert!(matches!(app.prepare_users(), Err(ConfigError::DuplicateUser(id)) if id == "bob"));

        let mut app = AppConfig::default();
        let mut carol = user("carol");
        carol.params.slow_period = Some(5);
        app.users = vec![carol];
        assert!(matches!(
            app.prepare_users(),
            Err(ConfigError::Validation { user_id, .. }) if user_id == "carol"
        ));
    }

    #[test]
    fn test_engine_spec_reads_conditions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dave_EMA_buy_sell_conditions.json"),
            r#"{ "buy": { "bullish_candle": false } }"#,
        )
        .unwrap();

        let mut app = AppConfig::default();
        app.app.conditions_dir = dir.path().to_path_buf();
        let mut dave = user("dave");
        dave.params.strategy = StrategyKind::Ema;
        dave.params.order_ratio = 0.5;

        let spec = dave.engine_spec(&app).unwrap();
        assert_eq!(spec.strategy, StrategyKind::Ema);
        assert_eq!(spec.settings.order_ratio, dec!(0.5));
        assert_eq!(spec.settings.min_order_value, dec!(5000));
        assert_eq!(spec.conditions["buy"]["bullish_candle"], false);
        assert_eq!(spec.config["slow_period"], 60);
        assert!(!spec.reconcile);

        app.paper.settlement = Settlement::Deferred;
        assert!(dave.engine_spec(&app).unwrap().reconcile);
    }

    #[test]
    fn test_resolve_paths() {
        let mut app = AppConfig::default();
        app.app.audit_dir = Some(PathBuf::from("audit"));
        app.logging.file = Some(PathBuf::from("/var/log/tradebot.log"));
        let mut erin = user("erin");
        erin.conditions_file = Some(PathBuf::from("erin.json"));
        app.users = vec![erin];

        app.resolve_paths(Path::new("/srv/tradebot"));
        assert_eq!(app.app.conditions_dir, PathBuf::from("/srv/tradebot/conditions"));
        assert_eq!(app.app.audit_dir, Some(PathBuf::from("/srv/tradebot/audit")));
        assert_eq!(app.logging.file, Some(PathBuf::from("/var/log/tradebot.log")));
        assert_eq!(app.users[0].conditions_file, Some(PathBuf::from("/srv/tradebot/erin.json")));
    }
}
