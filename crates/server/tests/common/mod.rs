//! Shared fakes and harness for server integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use taskforge_core::{
    ContentStore, GenerationContext, GenerationEngine, GenerationError, GenerationOutput,
    ItemDescriptor, ItemId, Ledger, LedgerError, RetryPolicy, StoreError, TaskKind, TaskRecord,
    UnmeteredLedger,
};
use taskforge_db::Database;
use taskforge_server::{
    AppState, ExecutorSettings, MonitorSettings, ReaperSettings, RuntimeSettings, TaskRequest,
};

pub const MAX_ATTEMPTS: u32 = 3;

/// What the engine does on one call for one item.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    SlowSucceed(Duration),
    Transient,
    Terminal(&'static str),
    Hang,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub item: ItemId,
    /// `currentMessage` of the record when the engine was invoked.
    pub heartbeat: Option<String>,
    pub context: GenerationContext,
}

/// Engine that follows a per-item script and records every call.
pub struct ScriptedEngine {
    default: Step,
    script: Mutex<HashMap<ItemId, VecDeque<Step>>>,
    calls: Mutex<Vec<Call>>,
    heartbeat_db: Mutex<Option<Database>>,
}

impl ScriptedEngine {
    pub fn new(default: Step) -> Self {
        Self {
            default,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            heartbeat_db: Mutex::new(None),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Step::Succeed)
    }

    pub fn hanging() -> Self {
        Self::new(Step::Hang)
    }

    /// Queue `steps` for `item`; once used up the default applies.
    pub fn script(self, item: ItemId, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(item)
            .or_default()
            .extend(steps);
        self
    }

    fn next_step(&self, item: ItemId) -> Step {
        self.script
            .lock()
            .unwrap()
            .get_mut(&item)
            .and_then(|steps| steps.pop_front())
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, item: ItemId) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.item == item).collect()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn generate(
        &self,
        item: &ItemDescriptor,
        context: GenerationContext,
    ) -> Result<GenerationOutput, GenerationError> {
        let heartbeat_db = self.heartbeat_db.lock().unwrap().clone();
        let heartbeat = match heartbeat_db {
            Some(db) => db
                .get_task(&item.task_id)
                .await
                .ok()
                .flatten()
                .and_then(|r| r.current_message),
            None => None,
        };
        self.calls.lock().unwrap().push(Call {
            item: item.item_id,
            heartbeat,
            context,
        });

        let output = GenerationOutput {
            content: format!("content for item {}", item.item_id),
            context: GenerationContext(serde_json::json!({ "lastItem": item.item_id })),
        };
        match self.next_step(item.item_id) {
            Step::Succeed => Ok(output),
            Step::SlowSucceed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            Step::Transient => Err(GenerationError::transient("rate limited")),
            Step::Terminal(message) => Err(GenerationError::terminal(message)),
            Step::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Content store that records saves and can refuse chosen items.
#[derive(Default)]
pub struct RecordingStore {
    saves: Mutex<Vec<(String, ItemId, String)>>,
    refuse: HashSet<ItemId>,
}

impl RecordingStore {
    pub fn refusing(items: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            saves: Mutex::new(Vec::new()),
            refuse: items.into_iter().collect(),
        }
    }

    pub fn saved_items(&self, subject: &str) -> Vec<ItemId> {
        let mut items: Vec<ItemId> = self
            .saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| s == subject)
            .map(|(_, item, _)| *item)
            .collect();
        items.sort_unstable();
        items.dedup();
        items
    }
}

#[async_trait]
impl ContentStore for RecordingStore {
    async fn save(&self, subject: &str, item: ItemId, content: &str) -> Result<(), StoreError> {
        if self.refuse.contains(&item) {
            return Err(StoreError(format!("disk full writing item {item}")));
        }
        self.saves
            .lock()
            .unwrap()
            .push((subject.to_string(), item, content.to_string()));
        Ok(())
    }
}

/// Ledger that refuses one item.
pub struct FailingLedger {
    pub refuse: ItemId,
}

#[async_trait]
impl Ledger for FailingLedger {
    async fn charge(&self, _subject: &str, item: ItemId) -> Result<(), LedgerError> {
        if item == self.refuse {
            Err(LedgerError::InsufficientCredits(format!("no credits left for item {item}")))
        } else {
            Ok(())
        }
    }
}

pub fn fast_settings() -> RuntimeSettings {
    RuntimeSettings {
        executor: ExecutorSettings {
            retry: RetryPolicy::new(MAX_ATTEMPTS, Duration::from_millis(1), Duration::from_millis(4)),
        },
        monitor: MonitorSettings {
            poll_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(200),
        },
        reaper: ReaperSettings::default(),
    }
}

pub struct Harness {
    pub db: Database,
    pub state: Arc<AppState>,
    pub engine: Arc<ScriptedEngine>,
    pub store: Arc<RecordingStore>,
}

impl Harness {
    pub async fn new(engine: ScriptedEngine) -> Self {
        Self::with(engine, RecordingStore::default(), Arc::new(UnmeteredLedger)).await
    }

    pub async fn with(engine: ScriptedEngine, store: RecordingStore, ledger: Arc<dyn Ledger>) -> Self {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        *engine.heartbeat_db.lock().unwrap() = Some(db.clone());
        let engine = Arc::new(engine);
        let store = Arc::new(store);
        let state = AppState::new(
            db.clone(),
            engine.clone(),
            store.clone(),
            ledger,
            fast_settings(),
        );
        Self {
            db,
            state,
            engine,
            store,
        }
    }

    /// Poll until the task reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: &str) -> TaskRecord {
        for _ in 0..500 {
            let record = self.db.get_task(id).await.unwrap().expect("task exists");
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} did not finish");
    }

    /// Poll until no executor is running in this process.
    pub async fn wait_for_idle(&self) {
        for _ in 0..500 {
            if self.state.supervisor.active_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("executors still running");
    }

    /// Poll until the record's heartbeat says `message`.
    pub async fn wait_for_message(&self, id: &str, message: &str) {
        for _ in 0..500 {
            let record = self.db.get_task(id).await.unwrap().expect("task exists");
            if record.current_message.as_deref() == Some(message) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never reported {message:?}");
    }

    /// Push a task's last heartbeat `age` into the past.
    pub async fn age_task(&self, id: &str, age: Duration) {
        let millis = chrono::Utc::now().timestamp_millis() - age.as_millis() as i64;
        sqlx::query("UPDATE tasks SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(millis)
            .execute(self.db.pool())
            .await
            .unwrap();
    }
}

pub fn request(subject: &str, start_offset: ItemId, target_count: i64) -> TaskRequest {
    TaskRequest {
        owner: "alice".to_string(),
        subject: subject.to_string(),
        kind: TaskKind::Chapters,
        target_count,
        start_offset,
    }
}
