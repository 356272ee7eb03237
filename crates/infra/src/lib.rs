//! Infrastructure layer: data store, scan orchestration, scheduling, config.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod forecasting;
pub mod runner;
pub mod scanner;
pub mod snapshot;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use coordinator::{PassFailure, RecomputeCoordinator, ScanPass, ScanPlan, ScanRequest, ScanStats};
pub use error::ScanError;
pub use runner::{ScanRunner, ScanRunnerHandle, ScanTrigger};
pub use scanner::PassStats;
pub use store::{InMemoryOpsStore, OpsStore, PostgresOpsStore, StoreError, StoreOperation};
