//! Durable runtime configuration stored as a JSON object

use async_trait::async_trait;
use serde_json::{Map, Value};
use skyrelay_domain::{ConfigStore, ConfigStoreError, config_keys};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Keys written as `null` when the file is first created
const INITIAL_KEYS: [&str; 4] = [
    config_keys::CHANNEL_ID,
    config_keys::USER_HANDLE,
    config_keys::ENCRYPTED_USER,
    config_keys::ENCRYPTED_PASSWORD,
];

/// JSON file store (`config.json`). Every read goes to disk so edits made by
/// another process are seen; writes replace the file atomically.
pub struct JsonFileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileConfigStore {
    /// Open the store, creating the file with null keys if it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigStoreError> {
        let store = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };

        if fs::metadata(&store.path).await.is_err() {
            tracing::info!(path = %store.path.display(), "Config file not found, creating a new one");
            let document: Map<String, Value> = INITIAL_KEYS
                .iter()
                .map(|key| (key.to_string(), Value::Null))
                .collect();
            store.write_document(&document).await?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, ConfigStoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ConfigStoreError::Format(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(ConfigStoreError::Format(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<(), ConfigStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_string_pretty(document)
            .map_err(|e| ConfigStoreError::Format(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError> {
        let document = self.read_document().await?;
        Ok(document.get(key).filter(|value| !value.is_null()).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(&document).await?;

        tracing::debug!(key = %key, path = %self.path.display(), "Config value written");
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct InMemoryConfigStore {
    values: std::sync::RwLock<HashMap<String, Value>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            values: std::sync::RwLock::new(values.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError> {
        let values = self
            .values
            .read()
            .map_err(|e| ConfigStoreError::Format(e.to_string()))?;
        Ok(values.get(key).filter(|value| !value.is_null()).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError> {
        let mut values = self
            .values
            .write()
            .map_err(|e| ConfigStoreError::Format(e.to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}
