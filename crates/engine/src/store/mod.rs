//! Scoped data store.
//!
//! The store keeps three tiers of JSON documents:
//!
//! - **local**: one document per component, transient, dropped on unmount
//! - **page**: one document per page id, persisted and loaded lazily
//! - **global**: one application document, persisted and loaded at session start
//!
//! Reads through [`DataStore::resolve_path`] see the most specific tier that
//! defines a path (local, then the active page, then global). Writes apply to
//! memory immediately and are queued for persistence one root entry at a
//! time. Writes issued before a scope has loaded are replayed over the loaded
//! entries, so the last write always wins.
//!
//! `DataStore` is a cheap cloneable handle; clones share the same state.

mod scope;
mod writer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use trellis_util::{ScopeKey, StatePersistence, get_in, root_key};

pub use scope::{PathContext, StateScope};
pub(crate) use scope::{LoadStatus, ScopeSlot, ScopeWrite};
use writer::{PersistOp, PersistenceWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PersistedTarget {
    Global,
    Page(String),
}

#[derive(Debug)]
struct StoreState {
    local: HashMap<String, Map<String, Value>>,
    pages: HashMap<String, ScopeSlot>,
    global: ScopeSlot,
    active_page: Option<String>,
    /// Whether scopes have anything to load. Without persistence every
    /// scope starts ready.
    persisted: bool,
}

impl StoreState {
    fn empty_slot(&self) -> ScopeSlot {
        if self.persisted { ScopeSlot::cold() } else { ScopeSlot::ready() }
    }

    fn page_slot(&mut self, page_id: &str) -> &mut ScopeSlot {
        let empty = self.empty_slot();
        self.pages.entry(page_id.to_string()).or_insert(empty)
    }
}

struct Shared {
    app_id: Option<String>,
    persistence: Option<Arc<dyn StatePersistence>>,
    writer: PersistenceWriter,
    state: Mutex<StoreState>,
}

/// Handle onto the scoped state of one application session.
#[derive(Clone)]
pub struct DataStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("app_id", &self.shared.app_id)
            .field("persistent", &self.shared.persistence.is_some())
            .finish()
    }
}

impl DataStore {
    /// Creates a store persisting through `persistence`.
    ///
    /// Without an app id persisted scopes start empty and nothing is written.
    /// Must be called from within a Tokio runtime for writes to be persisted.
    pub fn new(app_id: Option<String>, persistence: Arc<dyn StatePersistence>) -> Self {
        let (persistence, writer) = match app_id {
            Some(_) => (Some(persistence.clone()), PersistenceWriter::spawn(persistence)),
            None => (None, PersistenceWriter::disabled()),
        };
        Self::with_parts(app_id, persistence, writer)
    }

    /// Creates a store that never touches persistence.
    pub fn in_memory() -> Self {
        Self::with_parts(None, None, PersistenceWriter::disabled())
    }

    fn with_parts(app_id: Option<String>, persistence: Option<Arc<dyn StatePersistence>>, writer: PersistenceWriter) -> Self {
        let persisted = persistence.is_some();
        Self {
            shared: Arc::new(Shared {
                app_id,
                persistence,
                writer,
                state: Mutex::new(StoreState {
                    local: HashMap::new(),
                    pages: HashMap::new(),
                    global: if persisted { ScopeSlot::cold() } else { ScopeSlot::ready() },
                    active_page: None,
                    persisted,
                }),
            }),
        }
    }

    pub fn app_id(&self) -> Option<&str> {
        self.shared.app_id.as_deref()
    }

    pub fn active_page(&self) -> Option<String> {
        self.lock().active_page.clone()
    }

    /// Makes `page_id` the active page. Other pages keep their in-memory
    /// copies. Returns `true` when the page still needs to be loaded.
    pub fn activate_page(&self, page_id: &str) -> bool {
        let mut state = self.lock();
        state.active_page = Some(page_id.to_string());
        let slot = state.page_slot(page_id);
        debug!(page_id = %page_id, status = ?slot.status, "activated page");
        slot.status == LoadStatus::Cold
    }

    /// Reads `path` from a single tier.
    pub fn get(&self, scope: StateScope, context: &PathContext, path: &str) -> Option<Value> {
        let state = self.lock();
        let document = match scope {
            StateScope::Local => state.local.get(context.component_id.as_deref()?)?,
            StateScope::Page => {
                let page_id = context.page_id.as_deref().or(state.active_page.as_deref())?;
                &state.pages.get(page_id)?.document
            }
            StateScope::Global => &state.global.document,
        };
        get_in(document, path).cloned()
    }

    /// Reads `path` from the effective view: local, active page, then global.
    pub fn resolve_path(&self, context: &PathContext, path: &str) -> Option<Value> {
        let state = self.lock();
        if let Some(component_id) = context.component_id.as_deref()
            && let Some(value) = state.local.get(component_id).and_then(|document| get_in(document, path))
        {
            return Some(value.clone());
        }
        if let Some(page_id) = context.page_id.as_deref().or(state.active_page.as_deref())
            && let Some(value) = state.pages.get(page_id).and_then(|slot| get_in(&slot.document, path))
        {
            return Some(value.clone());
        }
        get_in(&state.global.document, path).cloned()
    }

    /// Writes `value` at `path` in a single tier. Returns `false` when the
    /// target cannot be determined (no component for local scope, no page
    /// for page scope, or an empty path).
    pub fn set(&self, scope: StateScope, context: &PathContext, path: &str, value: Value) -> bool {
        self.mutate(
            scope,
            context,
            ScopeWrite::Set {
                path: path.to_string(),
                value,
            },
        )
    }

    /// Deletes `path` from a single tier.
    pub fn remove(&self, scope: StateScope, context: &PathContext, path: &str) -> bool {
        self.mutate(scope, context, ScopeWrite::Remove { path: path.to_string() })
    }

    /// Writes into a specific page, whether or not it is active or loaded.
    pub fn set_page_value(&self, page_id: &str, path: &str, value: Value) -> bool {
        self.set(StateScope::Page, &PathContext::new().with_page(page_id), path, value)
    }

    pub fn set_global_value(&self, path: &str, value: Value) -> bool {
        self.set(StateScope::Global, &PathContext::new(), path, value)
    }

    /// Empties a page in memory and in persistence.
    pub fn clear_page(&self, page_id: &str) {
        self.apply_persisted(PersistedTarget::Page(page_id.to_string()), ScopeWrite::Clear);
    }

    pub fn clear_global(&self) {
        self.apply_persisted(PersistedTarget::Global, ScopeWrite::Clear);
    }

    /// Drops the local document of a component.
    pub fn unmount_component(&self, component_id: &str) {
        if self.lock().local.remove(component_id).is_some() {
            debug!(component_id = %component_id, "dropped component-local state");
        }
    }

    pub fn global_snapshot(&self) -> Map<String, Value> {
        self.lock().global.document.clone()
    }

    pub fn page_snapshot(&self, page_id: &str) -> Map<String, Value> {
        self.lock().pages.get(page_id).map(|slot| slot.document.clone()).unwrap_or_default()
    }

    pub fn local_snapshot(&self, component_id: &str) -> Map<String, Value> {
        self.lock().local.get(component_id).cloned().unwrap_or_default()
    }

    pub fn is_page_loaded(&self, page_id: &str) -> bool {
        self.lock()
            .pages
            .get(page_id)
            .is_some_and(|slot| slot.status == LoadStatus::Ready)
    }

    pub fn is_global_loaded(&self) -> bool {
        self.lock().global.status == LoadStatus::Ready
    }

    /// Loads the application scope once. Later calls return immediately.
    pub async fn load_global(&self) {
        let should_load = self.lock().global.begin_load();
        if !should_load {
            return;
        }
        let persisted = self.fetch(PersistedTarget::Global).await;
        let mut state = self.lock();
        state.global.finish_load(persisted);
        info!(entry_count = state.global.document.len(), "global state loaded");
    }

    /// Loads a page once. Writes issued while the load is pending are
    /// replayed over the loaded entries.
    pub async fn load_page(&self, page_id: &str) {
        let should_load = {
            let mut state = self.lock();
            state.page_slot(page_id).begin_load()
        };
        if !should_load {
            return;
        }
        let persisted = self.fetch(PersistedTarget::Page(page_id.to_string())).await;
        let mut state = self.lock();
        let slot = state.page_slot(page_id);
        slot.finish_load(persisted);
        info!(page_id = %page_id, entry_count = slot.document.len(), "page state loaded");
    }

    /// Waits until every persistence write issued so far has been handed to
    /// the backend.
    pub async fn flush(&self) {
        self.shared.writer.flush().await;
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scope_key(&self, target: &PersistedTarget) -> Option<ScopeKey> {
        let app_id = self.shared.app_id.as_deref()?;
        Some(match target {
            PersistedTarget::Global => ScopeKey::global(app_id),
            PersistedTarget::Page(page_id) => ScopeKey::page(app_id, page_id.as_str()),
        })
    }

    async fn fetch(&self, target: PersistedTarget) -> Map<String, Value> {
        let (Some(scope), Some(persistence)) = (self.scope_key(&target), self.shared.persistence.clone()) else {
            return Map::new();
        };
        match persistence.get_all(&scope).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(scope = %scope, error = %error, "failed to load persisted state; starting empty");
                Map::new()
            }
        }
    }

    fn mutate(&self, scope: StateScope, context: &PathContext, write: ScopeWrite) -> bool {
        if let ScopeWrite::Set { path, .. } | ScopeWrite::Remove { path } = &write
            && root_key(path).is_none()
        {
            debug!(scope = ?scope, "ignoring write to an empty path");
            return false;
        }

        match scope {
            StateScope::Local => {
                let Some(component_id) = context.component_id.as_deref() else {
                    debug!("ignoring local write without a component id");
                    return false;
                };
                let mut state = self.lock();
                let applied = write.apply_to(state.local.entry(component_id.to_string()).or_default());
                if !applied {
                    warn!(component_id = %component_id, "rejected local write");
                }
                applied
            }
            StateScope::Page => {
                let page_id = {
                    let state = self.lock();
                    context.page_id.clone().or_else(|| state.active_page.clone())
                };
                let Some(page_id) = page_id else {
                    debug!("ignoring page write without an active page");
                    return false;
                };
                let applied = self.apply_persisted(PersistedTarget::Page(page_id.clone()), write);
                if !applied {
                    warn!(page_id = %page_id, "rejected page write");
                }
                applied
            }
            StateScope::Global => {
                let applied = self.apply_persisted(PersistedTarget::Global, write);
                if !applied {
                    warn!("rejected global write");
                }
                applied
            }
        }
    }

    /// Applies a write to a persisted scope and queues it for persistence.
    /// Returns `false` when the write was rejected.
    fn apply_persisted(&self, target: PersistedTarget, write: ScopeWrite) -> bool {
        let scope_key = self.scope_key(&target);
        let mut guard = self.lock();
        let state = &mut *guard;
        let slot = match &target {
            PersistedTarget::Global => &mut state.global,
            PersistedTarget::Page(page_id) => state.page_slot(page_id),
        };
        let ready = slot.status == LoadStatus::Ready;
        if !slot.apply(write.clone()) {
            return false;
        }

        let Some(scope) = scope_key else {
            return true;
        };
        // Enqueued under the lock so persistence sees writes in issue order.
        let op = match write {
            ScopeWrite::Clear => PersistOp::Clear { scope },
            write if !ready => PersistOp::Patch { scope, write },
            ScopeWrite::Set { path, .. } | ScopeWrite::Remove { path } => {
                let Some(key) = root_key(&path) else {
                    return true;
                };
                let value = slot.document.get(&key).cloned();
                PersistOp::Write { scope, key, value }
            }
        };
        self.shared.writer.enqueue(op);
        true
    }
}
