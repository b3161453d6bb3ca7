//! Action dispatch.
//!
//! Converts user gestures into [`ClientMessage`]s. Every dispatched action
//! produces exactly one message; `change` actions additionally record their
//! `context.value` in the [`ElementValueLedger`] before anything is
//! forwarded, so the ledger is populated whether or not a host handler is
//! registered.

mod ledger;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;
use trellis_types::{Action, ClientMessage, InteractionMode};

pub use ledger::ElementValueLedger;

/// Host-side receiver of client messages.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, message: &ClientMessage);
}

impl<F> ActionHandler for F
where
    F: Fn(&ClientMessage) + Send + Sync,
{
    fn handle(&self, message: &ClientMessage) {
        self(message)
    }
}

/// An action given either by name or in full.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRef {
    Named(String),
    Action(Action),
}

impl From<&str> for ActionRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for ActionRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Action> for ActionRef {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

#[derive(Debug, Default)]
struct DispatchState {
    ledger: ElementValueLedger,
    last_timestamp: i64,
}

impl DispatchState {
    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_timestamp = self.last_timestamp.max(now);
        self.last_timestamp
    }
}

/// Dispatcher for one surface.
pub struct ActionDispatcher {
    surface_id: String,
    mode: InteractionMode,
    handler: Option<Arc<dyn ActionHandler>>,
    state: Mutex<DispatchState>,
}

impl ActionDispatcher {
    pub fn new(surface_id: impl Into<String>, mode: InteractionMode) -> Self {
        Self {
            surface_id: surface_id.into(),
            mode,
            handler: None,
            state: Mutex::new(DispatchState::default()),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Records the action and forwards its message to the host handler.
    pub fn dispatch(&self, action: &Action, source_component_id: &str) -> ClientMessage {
        let message = self.record(action, source_component_id);
        self.forward(&message);
        message
    }

    /// Records the action and builds its message without forwarding it.
    pub fn record(&self, action: &Action, source_component_id: &str) -> ClientMessage {
        let timestamp = {
            let mut state = self.lock();
            if action.is_change()
                && let Some(value) = action.context.get("value")
            {
                state.ledger.record(&self.surface_id, source_component_id, value.clone());
            }
            state.next_timestamp()
        };
        debug!(
            surface_id = %self.surface_id,
            action = %action.name,
            component_id = %source_component_id,
            "user action"
        );
        ClientMessage::UserAction {
            name: action.name.clone(),
            surface_id: self.surface_id.clone(),
            source_component_id: source_component_id.to_string(),
            timestamp,
            context: action.context.clone(),
        }
    }

    /// Dispatches an action on behalf of a component, merging
    /// `extra_context` over the action's own context. A no-op outside
    /// interactive modes.
    pub fn trigger(&self, source_component_id: &str, action: impl Into<ActionRef>, extra_context: Map<String, Value>) -> Option<ClientMessage> {
        let action = self.prepare_trigger(action, extra_context)?;
        Some(self.dispatch(&action, source_component_id))
    }

    /// Builds the action a trigger would dispatch, or `None` when the
    /// surface is not interactive.
    pub fn prepare_trigger(&self, action: impl Into<ActionRef>, extra_context: Map<String, Value>) -> Option<Action> {
        let mut action = match action.into() {
            ActionRef::Named(name) => Action::new(name),
            ActionRef::Action(action) => action,
        };
        if !self.mode.is_interactive() {
            debug!(surface_id = %self.surface_id, action = %action.name, mode = %self.mode, "ignoring trigger on inert surface");
            return None;
        }
        action.context.extend(extra_context);
        Some(action)
    }

    /// Emits a `clientError` message.
    pub fn report_error(&self, component_id: Option<&str>, message: impl Into<String>, code: impl Into<String>) -> ClientMessage {
        let message = ClientMessage::ClientError {
            surface_id: self.surface_id.clone(),
            component_id: component_id.map(str::to_owned),
            message: message.into(),
            code: code.into(),
        };
        self.forward(&message);
        message
    }

    pub fn ledger_snapshot(&self) -> ElementValueLedger {
        self.lock().ledger.clone()
    }

    pub fn clear_ledger(&self) {
        self.lock().ledger.clear();
    }

    fn forward(&self, message: &ClientMessage) {
        match &self.handler {
            Some(handler) => handler.handle(message),
            None => debug!(surface_id = %self.surface_id, "no action handler registered"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
