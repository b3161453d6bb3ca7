//! Persisted storage for page and application state.
//!
//! State is persisted per scope as a flat map of root key to JSON value. The
//! [`StatePersistence`] trait is the seam the runtime talks to; this module
//! ships a JSON-file backend for real sessions and an in-memory backend for
//! tests and previews.
//!
//! File layout of [`JsonFilePersistence`]:
//!
//! ```text
//! {root}/{app_id}/global.json
//! {root}/{app_id}/pages/{percent-encoded page_id}.json
//! ```

use std::collections::HashMap;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dirs_next::data_dir;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::expand_tilde;

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "TRELLIS_STATE_DIR";

/// Errors surfaced by persistence backends.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Identifies one persisted scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global { app_id: String },
    Page { app_id: String, page_id: String },
}

impl ScopeKey {
    pub fn global(app_id: impl Into<String>) -> Self {
        Self::Global { app_id: app_id.into() }
    }

    pub fn page(app_id: impl Into<String>, page_id: impl Into<String>) -> Self {
        Self::Page {
            app_id: app_id.into(),
            page_id: page_id.into(),
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            Self::Global { app_id } | Self::Page { app_id, .. } => app_id,
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global { app_id } => write!(f, "{app_id}:global"),
            Self::Page { app_id, page_id } => write!(f, "{app_id}:page:{page_id}"),
        }
    }
}

/// Storage collaborator for scoped state.
#[async_trait]
pub trait StatePersistence: Send + Sync {
    /// Returns every persisted entry of the scope; a missing scope is empty.
    async fn get_all(&self, scope: &ScopeKey) -> Result<Map<String, Value>, PersistenceError>;

    /// Stores one entry.
    async fn set(&self, scope: &ScopeKey, key: &str, value: &Value) -> Result<(), PersistenceError>;

    /// Drops one entry. The default stores `null` in its place.
    async fn remove(&self, scope: &ScopeKey, key: &str) -> Result<(), PersistenceError> {
        self.set(scope, key, &Value::Null).await
    }

    /// Drops every entry of the scope.
    async fn clear(&self, scope: &ScopeKey) -> Result<(), PersistenceError>;
}

/// Persistence kept in process memory.
#[derive(Default)]
pub struct InMemoryPersistence {
    scopes: Mutex<HashMap<ScopeKey, Map<String, Value>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a scope's entries without going through the async trait.
    pub fn snapshot(&self, scope: &ScopeKey) -> Map<String, Value> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.get(scope).cloned().unwrap_or_default()
    }

    /// Seeds a scope, replacing existing entries.
    pub fn seed(&self, scope: ScopeKey, entries: Map<String, Value>) {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.insert(scope, entries);
    }
}

#[async_trait]
impl StatePersistence for InMemoryPersistence {
    async fn get_all(&self, scope: &ScopeKey) -> Result<Map<String, Value>, PersistenceError> {
        Ok(self.snapshot(scope))
    }

    async fn set(&self, scope: &ScopeKey, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.entry(scope.clone()).or_default().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, scope: &ScopeKey, key: &str) -> Result<(), PersistenceError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = scopes.get_mut(scope) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, scope: &ScopeKey) -> Result<(), PersistenceError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.remove(scope);
        Ok(())
    }
}

/// Persistence backed by one JSON file per scope.
pub struct JsonFilePersistence {
    root: PathBuf,
    // Serializes read-modify-write cycles on scope files.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFilePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store rooted at [`default_state_dir`].
    pub fn with_defaults() -> Self {
        Self::new(default_state_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the entries of `scope`.
    pub fn scope_path(&self, scope: &ScopeKey) -> PathBuf {
        let app_dir = self.root.join(encode_file_stem(scope.app_id()));
        match scope {
            ScopeKey::Global { .. } => app_dir.join("global.json"),
            ScopeKey::Page { page_id, .. } => app_dir.join("pages").join(format!("{}.json", encode_file_stem(page_id))),
        }
    }

    async fn read_scope(&self, path: &Path) -> Result<Map<String, Value>, PersistenceError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(entries) => Ok(entries),
                Err(error) => {
                    warn!("Failed to parse state file at {}: {}", path.display(), error);
                    Ok(Map::new())
                }
            },
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(error) => Err(PersistenceError::Io(error)),
        }
    }

    async fn write_scope(&self, path: &Path, entries: &Map<String, Value>) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl StatePersistence for JsonFilePersistence {
    async fn get_all(&self, scope: &ScopeKey) -> Result<Map<String, Value>, PersistenceError> {
        self.read_scope(&self.scope_path(scope)).await
    }

    async fn set(&self, scope: &ScopeKey, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let path = self.scope_path(scope);
        let mut entries = self.read_scope(&path).await?;
        entries.insert(key.to_string(), value.clone());
        self.write_scope(&path, &entries).await
    }

    async fn remove(&self, scope: &ScopeKey, key: &str) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let path = self.scope_path(scope);
        let mut entries = self.read_scope(&path).await?;
        if entries.remove(key).is_some() {
            self.write_scope(&path, &entries).await?;
        }
        Ok(())
    }

    async fn clear(&self, scope: &ScopeKey) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let path = self.scope_path(scope);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(scope = %scope, "cleared persisted scope");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(PersistenceError::Io(error)),
        }
    }
}

/// Directory holding persisted state: `TRELLIS_STATE_DIR` when set, the
/// platform data directory otherwise.
pub fn default_state_dir() -> PathBuf {
    if let Ok(path) = env::var(STATE_DIR_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    data_dir().unwrap_or_else(|| PathBuf::from(".")).join("trellis").join("state")
}

fn encode_file_stem(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}
