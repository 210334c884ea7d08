// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use taskforge_core::{ContentStore, GenerationEngine, Ledger};
use taskforge_db::Database;
use tokio_util::sync::CancellationToken;

use crate::config::{MonitorSettings, RuntimeSettings};
use crate::controller::TaskController;
use crate::executor::TaskExecutor;
use crate::jobs::TaskSupervisor;
use crate::reaper::StaleTaskReaper;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub db: Database,
    pub controller: TaskController,
    /// Executors spawned by this process.
    pub supervisor: Arc<TaskSupervisor>,
    pub reaper: StaleTaskReaper,
    pub monitor: MonitorSettings,
    /// Cancelled on server shutdown; open monitor streams end when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the components together and wrap the state in an Arc for sharing.
    pub fn new(
        db: Database,
        engine: Arc<dyn GenerationEngine>,
        store: Arc<dyn ContentStore>,
        ledger: Arc<dyn Ledger>,
        settings: RuntimeSettings,
    ) -> Arc<Self> {
        let executor = TaskExecutor::new(db.clone(), engine, store, ledger, settings.executor);
        let supervisor = Arc::new(TaskSupervisor::new(executor));
        let reaper = StaleTaskReaper::new(db.clone(), settings.reaper);
        let controller = TaskController::new(db.clone(), reaper.clone(), Arc::clone(&supervisor));

        Arc::new(Self {
            start_time: Instant::now(),
            db,
            controller,
            supervisor,
            reaper,
            monitor: settings.monitor,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_core::{
        GenerationContext, GenerationError, GenerationOutput, ItemDescriptor, UnmeteredLedger,
    };
    use taskforge_db::SqliteContentStore;

    struct EchoEngine;

    #[async_trait::async_trait]
    impl GenerationEngine for EchoEngine {
        async fn generate(
            &self,
            item: &ItemDescriptor,
            context: GenerationContext,
        ) -> Result<GenerationOutput, GenerationError> {
            Ok(GenerationOutput {
                content: item.item_id.to_string(),
                context,
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        let store = Arc::new(SqliteContentStore::new(db.clone()));
        let state = AppState::new(
            db,
            Arc::new(EchoEngine),
            store,
            Arc::new(UnmeteredLedger),
            RuntimeSettings::default(),
        );
        assert!(state.uptime_secs() < 5);
        assert_eq!(state.supervisor.active_count(), 0);
        assert!(!state.shutdown.is_cancelled());
    }
}
