//! Run payload assembly.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use trellis_types::{Action, ExecutionInput, RunPayload};

/// Action context key naming the board to run.
pub const BOARD_ID_KEY: &str = "boardId";
/// Action context key naming the board's start node.
pub const NODE_ID_KEY: &str = "nodeId";
/// Action context key naming the board event.
pub const EVENT_ID_KEY: &str = "eventId";
/// Action context key holding extra input fields for the start node.
pub const PAYLOAD_KEY: &str = "payload";

/// What a `workflow_event` action asks to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    pub board_id: String,
    pub node_id: String,
    pub event_id: Option<String>,
}

impl ExecutionTarget {
    /// Reads the target from an action, using `default_board_id` when the
    /// action names none. The start node falls back to the event id.
    pub fn from_action(action: &Action, default_board_id: Option<&str>) -> Option<Self> {
        let board_id = action.context_str(BOARD_ID_KEY).or(default_board_id)?.to_string();
        let event_id = action.context_str(EVENT_ID_KEY).map(str::to_owned);
        let node_id = action
            .context_str(NODE_ID_KEY)
            .map(str::to_owned)
            .or_else(|| event_id.clone())?;
        Some(Self {
            board_id,
            node_id,
            event_id,
        })
    }
}

/// Surface state captured at invocation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceSnapshot {
    pub route: String,
    pub query_params: IndexMap<String, String>,
    pub page_id: Option<String>,
    pub global_state: Map<String, Value>,
    pub page_state: Map<String, Value>,
}

pub fn build_run_payload(
    target: &ExecutionTarget,
    action: &Action,
    elements: IndexMap<String, Value>,
    snapshot: SurfaceSnapshot,
) -> RunPayload {
    let fields = match action.context.get(PAYLOAD_KEY) {
        Some(Value::Object(fields)) => fields
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => Map::new(),
    };
    RunPayload {
        id: target.node_id.clone(),
        payload: ExecutionInput {
            elements,
            route: snapshot.route,
            query_params: snapshot.query_params,
            page_id: snapshot.page_id,
            global_state: snapshot.global_state,
            page_state: snapshot.page_state,
            action: action.context.clone(),
            fields,
        },
    }
}
