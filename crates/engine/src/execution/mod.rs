//! Board execution.
//!
//! An invocation goes through four steps:
//!
//! 1. look up which elements the board reads from the surface, via the
//!    [`ExecutionElementsCache`] (falling back to every known element)
//! 2. overlay the element value ledger onto those elements
//! 3. assemble the run payload with the surface context
//! 4. run the board and route each UI event of the returned stream, in order
//!
//! Navigation messages from the stream are handed back to the caller; every
//! other server message is meant for the reconciler.

mod cache;
mod merge;
mod payload;

use std::sync::Arc;

use futures_util::StreamExt;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use trellis_types::{Action, ExecutionRequest, NavigateTo, RunMetadata, ServerMessage};

use crate::backend::ExecutionBackend;
use crate::dispatch::ElementValueLedger;

pub use cache::{ElementRequirements, ExecutionElementsCache};
pub use merge::{bound_path, merge_ledger, value_property, with_value};
pub use payload::{
    BOARD_ID_KEY, EVENT_ID_KEY, ExecutionTarget, NODE_ID_KEY, PAYLOAD_KEY, SurfaceSnapshot, build_run_payload,
};

/// Where a server message from an event stream should go.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedMessage {
    Reconcile(ServerMessage),
    Navigate(NavigateTo),
}

/// Everything one invocation needs from its surface.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub app_id: &'a str,
    pub surface_id: &'a str,
    pub target: ExecutionTarget,
    pub action: &'a Action,
    pub ledger: &'a ElementValueLedger,
    /// Every element currently on the surface, keyed by address.
    pub known_elements: &'a IndexMap<String, Value>,
    pub snapshot: SurfaceSnapshot,
    pub stream_state: bool,
}

pub struct ExecutionInvoker {
    backend: Arc<dyn ExecutionBackend>,
    cache: ExecutionElementsCache,
}

impl ExecutionInvoker {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            cache: ExecutionElementsCache::new(),
        }
    }

    pub fn cache(&self) -> &ExecutionElementsCache {
        &self.cache
    }

    /// Elements the board reads from the surface, before ledger merging.
    pub async fn required_elements(
        &self,
        app_id: &str,
        board_id: &str,
        surface_id: &str,
        known_elements: &IndexMap<String, Value>,
    ) -> IndexMap<String, Value> {
        let requirements = self
            .cache
            .get_or_fetch(board_id, surface_id, || {
                self.backend.get_execution_elements(app_id, board_id, surface_id, false)
            })
            .await;
        match requirements {
            ElementRequirements::Specific(elements) => elements,
            ElementRequirements::AllKnown => known_elements.clone(),
        }
    }

    /// Runs the board and routes its UI events through `route` in delivery
    /// order. Returns `None` when the run could not be started.
    pub async fn invoke(&self, invocation: Invocation<'_>, mut route: impl FnMut(RoutedMessage)) -> Option<RunMetadata> {
        let Invocation {
            app_id,
            surface_id,
            target,
            action,
            ledger,
            known_elements,
            snapshot,
            stream_state,
        } = invocation;

        let elements = self
            .required_elements(app_id, &target.board_id, surface_id, known_elements)
            .await;
        let elements = merge_ledger(&elements, ledger);
        let element_count = elements.len();
        let request = ExecutionRequest {
            app_id: app_id.to_string(),
            board_id: target.board_id.clone(),
            event_id: target.event_id.clone(),
            payload: build_run_payload(&target, action, elements, snapshot),
            stream_state,
        };

        info!(board_id = %target.board_id, node_id = %target.node_id, element_count, "invoking board");
        let mut events = match self.backend.execute_board(request).await {
            Ok(events) => events,
            Err(error) => {
                warn!(board_id = %target.board_id, error = %error, "board execution failed");
                return None;
            }
        };

        let mut metadata = RunMetadata::default();
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(error) => {
                    warn!(board_id = %target.board_id, error = %error, "skipping undecodable execution event");
                    continue;
                }
            };
            if metadata.absorb(&event) {
                continue;
            }
            match event.ui_message() {
                Some(Ok(ServerMessage::NavigateTo(navigation))) => route(RoutedMessage::Navigate(navigation)),
                Some(Ok(message)) => route(RoutedMessage::Reconcile(message)),
                Some(Err(error)) => warn!(board_id = %target.board_id, error = %error, "malformed UI event"),
                None => debug!(event_type = %event.event_type, "ignoring execution event"),
            }
        }

        info!(
            board_id = %target.board_id,
            run_id = metadata.run_id.as_deref().unwrap_or("-"),
            status = metadata.status.as_deref().unwrap_or("-"),
            "board run finished"
        );
        Some(metadata)
    }
}
