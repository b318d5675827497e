use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Target schema version for [`KeyValueStore::init`].
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Well-known storage keys shared across services.
pub mod keys {
    pub const STREAK: &str = "streak";
    pub const THEME: &str = "theme";
    pub const TASKS: &str = "tasks";
    pub const BRAIN_DUMP: &str = "brainDump";
    pub const IGNITE_STATE: &str = "igniteState";
    pub const POMODORO_STATE: &str = "pomodoroState";
    pub const GOOGLE_TASKS_SYNC: &str = "googleTasksSyncState";
    pub const GOOGLE_TASKS_PROCESSED_IDS: &str = "googleTasksProcessedIds";
    pub const UX_METRICS: &str = "uxMetricsEvents";
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, InfraError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), InfraError>;
    async fn remove_item(&self, key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStorageBackend {
    db_path: PathBuf,
}

impl SqliteStorageBackend {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let backend = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        let connection = backend.connect()?;
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
               key TEXT PRIMARY KEY,
               value TEXT NOT NULL
             )",
        )?;
        Ok(backend)
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

#[async_trait]
impl StorageBackend for SqliteStorageBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorageBackend {
    items: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl StorageBackend for InMemoryStorageBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>, InfraError> {
        let items = self
            .items
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("storage lock poisoned: {error}")))?;
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let mut items = self
            .items
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("storage lock poisoned: {error}")))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), InfraError> {
        let mut items = self
            .items
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("storage lock poisoned: {error}")))?;
        items.remove(key);
        Ok(())
    }
}

/// A schema migration applied once by [`KeyValueStore::init`] when the
/// persisted version is below its target version.
#[async_trait]
pub trait StoreMigration: Send + Sync {
    fn version(&self) -> u32;
    async fn apply(&self, store: &KeyValueStore) -> Result<(), InfraError>;
}

/// JSON-aware wrapper over a [`StorageBackend`].
///
/// Every data-path method degrades instead of failing: callers treat
/// storage as always-available-but-fallible and never see an error.
#[derive(Clone)]
pub struct KeyValueStore {
    backend: Arc<dyn StorageBackend>,
    migrations: Vec<Arc<dyn StoreMigration>>,
}

impl KeyValueStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            migrations: Vec::new(),
        }
    }

    pub fn with_migrations(mut self, migrations: Vec<Arc<dyn StoreMigration>>) -> Self {
        self.migrations = migrations;
        self
    }

    /// Runs registered migrations between the persisted schema version
    /// and [`SCHEMA_VERSION`], then persists the new version. Unlike the
    /// data-path methods this propagates failures: the caller decides
    /// whether to proceed on an unmigrated store.
    pub async fn init(&self) -> Result<(), InfraError> {
        let stored_version = self
            .backend
            .get_item(SCHEMA_VERSION_KEY)
            .await?
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(0);

        let mut pending: Vec<&Arc<dyn StoreMigration>> = self
            .migrations
            .iter()
            .filter(|migration| {
                migration.version() > stored_version && migration.version() <= SCHEMA_VERSION
            })
            .collect();
        pending.sort_by_key(|migration| migration.version());

        for migration in pending {
            migration.apply(self).await?;
        }

        self.backend
            .set_item(SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_string())
            .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key).await {
            Ok(value) => value,
            Err(error) => {
                log::warn!("storage get failed for key '{key}': {error}");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> bool {
        match self.backend.set_item(key, value).await {
            Ok(()) => true,
            Err(error) => {
                log::warn!("storage set failed for key '{key}': {error}");
                false
            }
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self.backend.remove_item(key).await {
            Ok(()) => true,
            Err(error) => {
                log::warn!("storage remove failed for key '{key}': {error}");
                false
            }
        }
    }

    /// Returns `None` both when the key is absent and when the stored
    /// string fails to parse; parse failures are logged, not surfaced.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                log::warn!("storage getJSON failed to parse key '{key}': {error}");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(error) => {
                log::warn!("storage setJSON failed to serialize key '{key}': {error}");
                return false;
            }
        };
        self.set(key, &raw).await
    }
}
