//! Board execution request and event shapes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::ServerMessage;

/// Event type whose payload is a [`ServerMessage`].
pub const UI_EVENT_TYPE: &str = "a2ui";
/// Event type announcing the run identifier.
pub const RUN_INITIATED_EVENT_TYPE: &str = "run_initiated";
/// Event type closing a run with its status.
pub const COMPLETED_EVENT_TYPE: &str = "completed";

/// One entry of the ordered event stream produced by a board execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl ExecutionEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Wraps a server message in a UI event.
    pub fn ui(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::new(UI_EVENT_TYPE, message.to_value()?))
    }

    pub fn is_ui(&self) -> bool {
        self.event_type == UI_EVENT_TYPE
    }

    /// Decodes the carried server message; `None` for non-UI events.
    pub fn ui_message(&self) -> Option<Result<ServerMessage, serde_json::Error>> {
        self.is_ui().then(|| ServerMessage::from_value(self.payload.clone()))
    }
}

/// Summary of a run collected from its lifecycle events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunMetadata {
    /// Folds a lifecycle event into the summary. Returns `true` when the
    /// event was a lifecycle event.
    pub fn absorb(&mut self, event: &ExecutionEvent) -> bool {
        let text = |key: &str| event.payload.get(key).and_then(Value::as_str).map(str::to_owned);
        match event.event_type.as_str() {
            RUN_INITIATED_EVENT_TYPE => {
                self.run_id = text("run_id").or(self.run_id.take());
                true
            }
            COMPLETED_EVENT_TYPE => {
                self.run_id = text("run_id").or(self.run_id.take());
                self.status = text("status");
                self.duration_ms = event.payload.get("duration_ms").and_then(Value::as_u64);
                true
            }
            _ => false,
        }
    }
}

/// Input object handed to the start node of a board.
///
/// Underscore-prefixed keys are reserved for surface context; any other keys
/// come from the triggering action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    /// Element address to component descriptor.
    #[serde(rename = "_elements", default)]
    pub elements: IndexMap<String, Value>,
    #[serde(rename = "_route", default)]
    pub route: String,
    #[serde(rename = "_query_params", default)]
    pub query_params: IndexMap<String, String>,
    #[serde(rename = "_page_id", default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(rename = "_global_state", default)]
    pub global_state: Map<String, Value>,
    #[serde(rename = "_page_state", default)]
    pub page_state: Map<String, Value>,
    /// Context of the triggering action.
    #[serde(rename = "_action", default)]
    pub action: Map<String, Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Start node plus its input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunPayload {
    pub id: String,
    pub payload: ExecutionInput,
}

/// Everything a backend needs to execute a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub app_id: String,
    pub board_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub payload: RunPayload,
    #[serde(default)]
    pub stream_state: bool,
}
