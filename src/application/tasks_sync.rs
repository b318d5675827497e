use crate::application::brain_dump::BrainDumpRepository;
use crate::domain::models::{BrainDumpItem, BrainDumpSource};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_tasks_client::{GoogleTasksClient, ListTasksRequest, RemoteTask};
use crate::infrastructure::storage::{keys, KeyValueStore};
use crate::infrastructure::token_store::TokenStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};

/// Upper bound on the remembered task-id set; oldest ids are evicted
/// first once the cap is reached.
pub const PROCESSED_IDS_CAP: usize = 500;

/// Completion write-backs run at most this many requests at a time.
const COMPLETION_CONCURRENCY: usize = 4;

const TOKEN_LEEWAY_SECONDS: i64 = 60;

/// Delta-sync cursor persisted under the `googleTasksSyncState` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCursor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Tasks newly imported into the brain dump.
    pub imported: usize,
    /// Remote tasks passed over: completed, deleted, untitled, or
    /// already imported.
    pub skipped: usize,
    /// Locally completed tasks successfully written back to Google.
    pub completed: usize,
}

type NowProvider = dyn Fn() -> DateTime<Utc> + Send + Sync;

struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One-way-ish bridge to Google Tasks: actionable remote tasks flow into
/// the brain dump, locally completed imports flow back as completions.
///
/// Imports are persisted before any completion write-back so an
/// interrupted sync never loses captured tasks; the processed-id set
/// keeps an interrupted or overlapping sync from importing duplicates.
pub struct GoogleTasksSyncService {
    client: Arc<dyn GoogleTasksClient>,
    tokens: Arc<dyn TokenStore>,
    store: KeyValueStore,
    repository: BrainDumpRepository,
    list_id: String,
    in_flight: AtomicBool,
    now: Arc<NowProvider>,
}

impl GoogleTasksSyncService {
    pub fn new(
        client: Arc<dyn GoogleTasksClient>,
        tokens: Arc<dyn TokenStore>,
        store: KeyValueStore,
        list_id: impl Into<String>,
    ) -> Self {
        Self::with_now_provider(client, tokens, store, list_id, Utc::now)
    }

    pub fn with_now_provider(
        client: Arc<dyn GoogleTasksClient>,
        tokens: Arc<dyn TokenStore>,
        store: KeyValueStore,
        list_id: impl Into<String>,
        now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            tokens,
            repository: BrainDumpRepository::new(store.clone()),
            store,
            list_id: list_id.into(),
            in_flight: AtomicBool::new(false),
            now: Arc::new(now),
        }
    }

    pub async fn cursor(&self) -> SyncCursor {
        self.store
            .get_json(keys::GOOGLE_TASKS_SYNC)
            .await
            .unwrap_or_default()
    }

    async fn processed_ids(&self) -> VecDeque<String> {
        self.store
            .get_json::<Vec<String>>(keys::GOOGLE_TASKS_PROCESSED_IDS)
            .await
            .unwrap_or_default()
            .into()
    }

    fn is_actionable(task: &RemoteTask) -> bool {
        !task.is_deleted()
            && !task.is_completed()
            && task
                .title
                .as_deref()
                .map(|title| !title.trim().is_empty())
                .unwrap_or(false)
    }

    /// Runs one sync pass. A pass already in flight makes this return a
    /// zeroed outcome immediately instead of issuing duplicate requests.
    ///
    /// `locally_completed` carries the Google task ids of imported items
    /// the user finished since the last pass; their completions are
    /// written back after imports are persisted.
    pub async fn sync(&self, locally_completed: &[String]) -> Result<SyncOutcome, InfraError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(SyncOutcome::default());
        }
        let _guard = InFlightGuard {
            flag: &self.in_flight,
        };

        let now = (self.now)();
        let token = self
            .tokens
            .load_token()?
            .ok_or_else(|| InfraError::Credential("no google access token stored".to_string()))?;
        if !token.is_valid_at(now, TOKEN_LEEWAY_SECONDS) {
            return Err(InfraError::Credential(
                "google access token is expired".to_string(),
            ));
        }

        let cursor = self.cursor().await;
        let listing = match self
            .client
            .list_tasks(
                &token.access_token,
                &self.list_id,
                ListTasksRequest {
                    sync_token: cursor.sync_token.clone(),
                },
            )
            .await
        {
            Ok(listing) => listing,
            Err(InfraError::SyncTokenExpired) => {
                log::info!("google tasks sync token expired; falling back to full listing");
                self.client
                    .list_tasks(
                        &token.access_token,
                        &self.list_id,
                        ListTasksRequest::default(),
                    )
                    .await?
            }
            Err(error) => return Err(error),
        };

        let mut processed = self.processed_ids().await;
        // The capped id set can forget very old imports; items still in
        // the brain dump guard against re-importing those.
        let existing: HashSet<String> = self
            .repository
            .list()
            .await
            .into_iter()
            .filter_map(|item| item.source_id)
            .collect();

        let mut outcome = SyncOutcome::default();
        let mut new_items = Vec::new();
        let mut new_ids = Vec::new();

        for task in &listing.tasks {
            let Some(task_id) = task.id.as_deref().filter(|id| !id.trim().is_empty()) else {
                outcome.skipped += 1;
                continue;
            };
            if !Self::is_actionable(task)
                || processed.contains(&task_id.to_string())
                || existing.contains(task_id)
            {
                outcome.skipped += 1;
                continue;
            }

            let title = task.title.as_deref().unwrap_or_default().trim();
            new_items.push(BrainDumpItem {
                id: format!("gtask-{task_id}"),
                text: title.to_string(),
                category: None,
                priority: None,
                source: BrainDumpSource::GoogleTasks,
                source_id: Some(task_id.to_string()),
                created_at: now,
            });
            new_ids.push(task_id.to_string());
        }

        let attempted = new_items.len();
        if attempted > 0 {
            outcome.imported = self.repository.append(new_items).await;
            if outcome.imported > 0 {
                // Mark before write-back: a crash between here and the
                // completions must not re-import on the next pass.
                processed.extend(new_ids);
                while processed.len() > PROCESSED_IDS_CAP {
                    processed.pop_front();
                }
                let snapshot: Vec<&String> = processed.iter().collect();
                self.store
                    .set_json(keys::GOOGLE_TASKS_PROCESSED_IDS, &snapshot)
                    .await;
            }
        }

        if attempted > 0 && outcome.imported == 0 {
            // Keep the old cursor: advancing the sync token past tasks
            // that never landed in the brain dump would drop them from
            // every future incremental listing.
            log::warn!("google tasks import was not persisted; keeping previous sync cursor");
        } else {
            self.store
                .set_json(
                    keys::GOOGLE_TASKS_SYNC,
                    &SyncCursor {
                        sync_token: listing.next_sync_token,
                        last_synced_at: Some(now),
                    },
                )
                .await;
        }

        outcome.completed = self
            .write_back_completions(&token.access_token, locally_completed)
            .await;

        Ok(outcome)
    }

    /// Pushes completions with bounded concurrency. Individual failures
    /// are logged and tolerated; the next pass can retry them.
    async fn write_back_completions(&self, access_token: &str, task_ids: &[String]) -> usize {
        let mut completed = 0;
        let mut join_set = JoinSet::new();

        for task_id in task_ids {
            let task_id = task_id.trim().to_string();
            if task_id.is_empty() {
                continue;
            }

            if join_set.len() >= COMPLETION_CONCURRENCY {
                completed += Self::join_one(&mut join_set).await;
            }

            let client = Arc::clone(&self.client);
            let access_token = access_token.to_string();
            let list_id = self.list_id.clone();
            join_set.spawn(async move {
                client
                    .complete_task(&access_token, &list_id, &task_id)
                    .await
                    .map_err(|error| (task_id, error))
            });
        }

        while !join_set.is_empty() {
            completed += Self::join_one(&mut join_set).await;
        }
        completed
    }

    async fn join_one(join_set: &mut JoinSet<Result<(), (String, InfraError)>>) -> usize {
        match join_set.join_next().await {
            Some(Ok(Ok(()))) => 1,
            Some(Ok(Err((task_id, error)))) => {
                log::warn!("failed to complete google task '{task_id}': {error}");
                0
            }
            Some(Err(error)) => {
                log::warn!("completion write-back task panicked: {error}");
                0
            }
            None => 0,
        }
    }
}

/// Foreground polling: while started, runs an import-only sync pass
/// immediately and then once per interval. The app shell starts this
/// when it becomes active and stops it on background.
pub struct SyncPoller {
    service: Arc<GoogleTasksSyncService>,
    every: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncPoller {
    pub fn new(service: Arc<GoogleTasksSyncService>, every: Duration) -> Self {
        Self {
            service,
            every,
            handle: Mutex::new(None),
        }
    }

    /// Idempotent: starting while already polling changes nothing.
    pub fn start(&self) {
        let Ok(mut handle) = self.handle.lock() else {
            return;
        };
        if handle
            .as_ref()
            .map(|running| !running.is_finished())
            .unwrap_or(false)
        {
            return;
        }

        let service = Arc::clone(&self.service);
        let every = self.every;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = service.sync(&[]).await {
                    log::warn!("foreground sync pass failed: {error}");
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(running) = handle.take() {
                running.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .ok()
            .and_then(|handle| {
                handle
                    .as_ref()
                    .map(|running| !running.is_finished())
            })
            .unwrap_or(false)
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
