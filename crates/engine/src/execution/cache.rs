//! Execution elements cache.
//!
//! Remembers, per `(board, surface)` pair, which elements a board reads. The
//! first invocation fetches; concurrent invocations for the same pair wait on
//! that fetch instead of issuing their own. Only successful answers are
//! cached, so a failed fetch is retried next time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use trellis_types::cache_key;

use crate::backend::ExecutionError;

/// Which elements a board needs from a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementRequirements {
    /// Exactly these elements, keyed by address.
    Specific(IndexMap<String, Value>),
    /// The board gave no list; send every element currently on the surface.
    AllKnown,
}

impl ElementRequirements {
    pub fn from_elements(elements: IndexMap<String, Value>) -> Self {
        if elements.is_empty() {
            Self::AllKnown
        } else {
            Self::Specific(elements)
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionElementsCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<ElementRequirements>>>>,
}

impl ExecutionElementsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached requirements for the pair, running `fetch` if none
    /// are cached. A failed fetch degrades to [`ElementRequirements::AllKnown`]
    /// without being cached.
    pub async fn get_or_fetch<F, Fut>(&self, board_id: &str, surface_id: &str, fetch: F) -> ElementRequirements
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IndexMap<String, Value>, ExecutionError>>,
    {
        let key = cache_key(board_id, surface_id);
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(key.clone()).or_default().clone()
        };
        if let Some(cached) = cell.get() {
            debug!(cache_key = %key, "execution elements cache hit");
            return cached.clone();
        }

        let result = cell
            .get_or_try_init(|| async {
                let elements = fetch().await?;
                Ok::<_, ExecutionError>(ElementRequirements::from_elements(elements))
            })
            .await;
        match result {
            Ok(requirements) => requirements.clone(),
            Err(error) => {
                warn!(cache_key = %key, error = %error, "execution elements fetch failed; falling back to all known elements");
                ElementRequirements::AllKnown
            }
        }
    }

    /// Cached requirements for the pair, if any.
    pub fn peek(&self, board_id: &str, surface_id: &str) -> Option<ElementRequirements> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&cache_key(board_id, surface_id))?.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn elements(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
    }

    #[tokio::test]
    async fn fetches_once_per_pair() {
        let cache = ExecutionElementsCache::new();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(elements(&[("main/email", json!({"id": "email"}))]))
        };

        let first = cache.get_or_fetch("board", "main", fetch).await;
        let second = cache.get_or_fetch("board", "main", fetch).await;
        let other_surface = cache.get_or_fetch("board", "side", fetch).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
        assert!(matches!(other_surface, ElementRequirements::Specific(_)));
    }

    #[tokio::test]
    async fn empty_answer_means_all_known() {
        let cache = ExecutionElementsCache::new();
        let requirements = cache.get_or_fetch("b", "s", || async { Ok(IndexMap::new()) }).await;
        assert_eq!(requirements, ElementRequirements::AllKnown);
        assert_eq!(cache.peek("b", "s"), Some(ElementRequirements::AllKnown));
    }

    #[tokio::test]
    async fn failures_fall_back_and_are_retried() {
        let cache = ExecutionElementsCache::new();
        let failed = cache
            .get_or_fetch("b", "s", || async { Err(ExecutionError::Unavailable("offline".into())) })
            .await;
        assert_eq!(failed, ElementRequirements::AllKnown);
        assert_eq!(cache.peek("b", "s"), None);

        let recovered = cache
            .get_or_fetch("b", "s", || async { Ok(elements(&[("s/x", json!({}))])) })
            .await;
        assert!(matches!(recovered, ElementRequirements::Specific(map) if map.contains_key("s/x")));
    }
}
