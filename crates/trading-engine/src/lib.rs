//! Per-user trading engines.
//!
//! This crate provides:
//! - The bar orchestrator (buffer, indicators, decision, audit, execution)
//! - The order settlement reconciler
//! - The engine worker loop and the lifecycle manager that supervises it
//! - The outbound event channel

pub mod error;
pub mod events;
pub mod manager;
pub mod orchestrator;
pub mod reconciler;
pub mod runner;
pub mod warmup;

pub use error::EngineError;
pub use events::{EngineEvent, EngineStatus, EventBus, EventLevel, DEFAULT_EVENT_CAPACITY};
pub use manager::{EngineManager, ManagerConfig, StartOutcome};
pub use orchestrator::{
    BarOrchestrator, BarOutcome, EngineDeps, EngineSettings, ExecutionOutcome, RejectReason,
    DEFAULT_MIN_ORDER_VALUE,
};
pub use reconciler::{PollOutcome, Reconciler, ReconcilerConfig, ReconcilerHandle};
pub use runner::{run_engine, EngineSpec, WorkerConfig, LIVE_FETCH_COUNT};
pub use warmup::{WarmupPlan, MIN_HISTORY};
