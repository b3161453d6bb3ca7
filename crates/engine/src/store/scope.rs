use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trellis_util::{remove_in, set_in};

/// Storage tier addressed by a read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateScope {
    /// Per component, never persisted, dropped on unmount.
    Local,
    /// Per page, persisted, loaded lazily.
    Page,
    /// Application wide, persisted, loaded at session start.
    Global,
}

/// Where a read or write originates. `component_id` selects the local
/// document; `page_id` selects a page other than the active one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathContext {
    pub component_id: Option<String>,
    pub page_id: Option<String>,
}

impl PathContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(component_id: impl Into<String>) -> Self {
        Self {
            component_id: Some(component_id.into()),
            page_id: None,
        }
    }

    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }
}

/// Mutation recorded against a scope that has not finished loading.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScopeWrite {
    Set { path: String, value: Value },
    Remove { path: String },
    Clear,
}

impl ScopeWrite {
    /// Applies the write. Returns `false` when a `Set` was rejected (empty
    /// path, or an array index past the padding limit).
    pub(crate) fn apply_to(&self, document: &mut Map<String, Value>) -> bool {
        match self {
            Self::Set { path, value } => set_in(document, path, value.clone()).is_some(),
            Self::Remove { path } => {
                remove_in(document, path);
                true
            }
            Self::Clear => {
                document.clear();
                true
            }
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            Self::Set { path, .. } | Self::Remove { path } => Some(path),
            Self::Clear => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadStatus {
    /// Never requested from persistence.
    Cold,
    Loading,
    Ready,
}

/// In-memory copy of a persisted scope.
///
/// Until the scope is `Ready`, every mutation is both applied to the
/// document (so reads observe it) and buffered, then replayed in issue
/// order on top of the loaded entries.
#[derive(Debug, Clone)]
pub(crate) struct ScopeSlot {
    pub(crate) document: Map<String, Value>,
    pub(crate) status: LoadStatus,
    pending: Vec<ScopeWrite>,
}

impl ScopeSlot {
    pub(crate) fn cold() -> Self {
        Self {
            document: Map::new(),
            status: LoadStatus::Cold,
            pending: Vec::new(),
        }
    }

    /// A slot with nothing to load.
    pub(crate) fn ready() -> Self {
        Self {
            status: LoadStatus::Ready,
            ..Self::cold()
        }
    }

    /// Applies a write, buffering it until the slot is ready. A `Set`
    /// supersedes buffered writes to the same path and a `Clear` supersedes
    /// everything buffered before it. Returns `false` for rejected writes,
    /// which are not buffered.
    pub(crate) fn apply(&mut self, write: ScopeWrite) -> bool {
        if !write.apply_to(&mut self.document) {
            return false;
        }
        if self.status == LoadStatus::Ready {
            return true;
        }
        match &write {
            ScopeWrite::Clear => self.pending.clear(),
            ScopeWrite::Set { path, .. } => self.pending.retain(|pending| pending.path() != Some(path.as_str())),
            ScopeWrite::Remove { .. } => {}
        }
        self.pending.push(write);
        true
    }

    /// Marks the slot as loading; returns `false` when a load already ran or
    /// is running.
    pub(crate) fn begin_load(&mut self) -> bool {
        if self.status != LoadStatus::Cold {
            return false;
        }
        self.status = LoadStatus::Loading;
        true
    }

    pub(crate) fn finish_load(&mut self, persisted: Map<String, Value>) {
        let mut document = persisted;
        for write in self.pending.drain(..) {
            write.apply_to(&mut document);
        }
        self.document = document;
        self.status = LoadStatus::Ready;
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
