use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use opsradar_infra::{
    EngineConfig, InMemoryOpsStore, OpsStore, PostgresOpsStore, RecomputeCoordinator, ScanTrigger,
};

pub type Coordinator = RecomputeCoordinator<dyn OpsStore>;

/// Shared state handed to every handler.
pub struct AppServices {
    pub coordinator: Arc<Coordinator>,
    /// Present only while the scheduled runner is up.
    pub trigger: Option<ScanTrigger>,
}

impl AppServices {
    pub fn new(coordinator: Arc<Coordinator>, trigger: Option<ScanTrigger>) -> Self {
        Self { coordinator, trigger }
    }

    pub fn from_store(store: Arc<dyn OpsStore>, config: EngineConfig) -> Self {
        Self::new(Arc::new(RecomputeCoordinator::new(store, config)), None)
    }

    pub fn with_trigger(mut self, trigger: ScanTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

/// Postgres when a database URL is given, otherwise an empty in-memory store.
pub async fn connect_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn OpsStore>> {
    match database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("connecting to postgres")?;
            info!("using postgres store");
            let store: Arc<dyn OpsStore> = Arc::new(PostgresOpsStore::new(pool));
            Ok(store)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store");
            let store: Arc<dyn OpsStore> = InMemoryOpsStore::arc();
            Ok(store)
        }
    }
}
