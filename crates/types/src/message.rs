//! Client/server message protocol.
//!
//! [`ClientMessage`] flows from a rendered surface to its backend whenever the
//! user triggers an action. [`ServerMessage`] flows the other way and mutates
//! state or drives navigation. Server messages are a closed set of known
//! `type`s plus [`ServerMessage::Passthrough`], which carries any other message
//! (surface and element updates, for instance) as raw JSON so the rendering
//! layer can handle it.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use serde_json::{Map, Value};

/// Action name recorded into the element value ledger.
pub const CHANGE_ACTION: &str = "change";

/// Action name routed to board execution instead of the host handler.
pub const WORKFLOW_EVENT_ACTION: &str = "workflow_event";

/// Semantic user intent attached to a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn is_change(&self) -> bool {
        self.name == CHANGE_ACTION
    }

    pub fn is_workflow_event(&self) -> bool {
        self.name == WORKFLOW_EVENT_ACTION
    }

    /// Returns a string entry of the context, ignoring blanks.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
    }
}

/// Message sent from the surface to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "userAction", rename_all = "camelCase")]
    UserAction {
        name: String,
        surface_id: String,
        source_component_id: String,
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
        #[serde(default)]
        context: Map<String, Value>,
    },
    #[serde(rename = "clientError", rename_all = "camelCase")]
    ClientError {
        surface_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
        message: String,
        code: String,
    },
}

impl ClientMessage {
    pub fn surface_id(&self) -> &str {
        match self {
            Self::UserAction { surface_id, .. } | Self::ClientError { surface_id, .. } => surface_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetGlobalState {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPageState {
    pub page_id: String,
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearPageState {
    pub page_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearFileInput {
    pub surface_id: String,
    pub component_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateTo {
    pub route: String,
    #[serde(default)]
    pub replace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQueryParam {
    pub key: String,
    /// `None` removes the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDialog {
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseDialog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_id: Option<String>,
}

/// Message pushed by the backend, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SetGlobalState(SetGlobalState),
    SetPageState(SetPageState),
    ClearPageState(ClearPageState),
    ClearFileInput(ClearFileInput),
    NavigateTo(NavigateTo),
    SetQueryParam(SetQueryParam),
    OpenDialog(OpenDialog),
    CloseDialog(CloseDialog),
    /// Any other message, kept verbatim including its `type`.
    Passthrough(Value),
}

impl ServerMessage {
    /// Wire `type` of the message. Passthrough messages without a string
    /// `type` report `"unknown"`.
    pub fn kind(&self) -> &str {
        match self {
            Self::SetGlobalState(_) => "setGlobalState",
            Self::SetPageState(_) => "setPageState",
            Self::ClearPageState(_) => "clearPageState",
            Self::ClearFileInput(_) => "clearFileInput",
            Self::NavigateTo(_) => "navigateTo",
            Self::SetQueryParam(_) => "setQueryParam",
            Self::OpenDialog(_) => "openDialog",
            Self::CloseDialog(_) => "closeDialog",
            Self::Passthrough(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Decodes a message from JSON. Unknown or missing `type`s become
    /// [`ServerMessage::Passthrough`]; a known `type` with a malformed body is
    /// an error.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(Self::Passthrough(value));
        };
        let message = match kind.as_str() {
            "setGlobalState" => Self::SetGlobalState(serde_json::from_value(value)?),
            "setPageState" => Self::SetPageState(serde_json::from_value(value)?),
            "clearPageState" => Self::ClearPageState(serde_json::from_value(value)?),
            "clearFileInput" => Self::ClearFileInput(serde_json::from_value(value)?),
            "navigateTo" => Self::NavigateTo(serde_json::from_value(value)?),
            "setQueryParam" => Self::SetQueryParam(serde_json::from_value(value)?),
            "openDialog" => Self::OpenDialog(serde_json::from_value(value)?),
            "closeDialog" => Self::CloseDialog(serde_json::from_value(value)?),
            _ => Self::Passthrough(value),
        };
        Ok(message)
    }

    /// Encodes the message with its `type` tag first.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let body = match self {
            Self::SetGlobalState(message) => serde_json::to_value(message)?,
            Self::SetPageState(message) => serde_json::to_value(message)?,
            Self::ClearPageState(message) => serde_json::to_value(message)?,
            Self::ClearFileInput(message) => serde_json::to_value(message)?,
            Self::NavigateTo(message) => serde_json::to_value(message)?,
            Self::SetQueryParam(message) => serde_json::to_value(message)?,
            Self::OpenDialog(message) => serde_json::to_value(message)?,
            Self::CloseDialog(message) => serde_json::to_value(message)?,
            Self::Passthrough(raw) => return Ok(raw.clone()),
        };
        let mut tagged = Map::new();
        tagged.insert("type".to_string(), Value::String(self.kind().to_string()));
        if let Value::Object(fields) = body {
            tagged.extend(fields);
        }
        Ok(Value::Object(tagged))
    }
}

impl Serialize for ServerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().map_err(ser::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

impl From<NavigateTo> for ServerMessage {
    fn from(message: NavigateTo) -> Self {
        Self::NavigateTo(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_action_uses_camel_case_fields() {
        let message = ClientMessage::UserAction {
            name: "submit".into(),
            surface_id: "main".into(),
            source_component_id: "save".into(),
            timestamp: 1_700_000_000_000,
            context: Map::new(),
        };
        assert_eq!(
            serde_json::to_value(&message).expect("encode"),
            json!({
                "type": "userAction",
                "name": "submit",
                "surfaceId": "main",
                "sourceComponentId": "save",
                "timestamp": 1_700_000_000_000_i64,
                "context": {}
            })
        );
    }

    #[test]
    fn client_error_omits_missing_component() {
        let message = ClientMessage::ClientError {
            surface_id: "main".into(),
            component_id: None,
            message: "upload failed".into(),
            code: "upload".into(),
        };
        let encoded = serde_json::to_value(&message).expect("encode");
        assert_eq!(encoded["type"], "clientError");
        assert!(encoded.get("componentId").is_none());
    }

    #[test]
    fn decodes_known_server_messages() {
        let message: ServerMessage =
            serde_json::from_value(json!({"type": "setPageState", "pageId": "/home", "key": "form.name", "value": "Ada"}))
                .expect("decode");
        assert_eq!(
            message,
            ServerMessage::SetPageState(SetPageState {
                page_id: "/home".into(),
                key: "form.name".into(),
                value: json!("Ada"),
            })
        );

        let message: ServerMessage = serde_json::from_value(json!({"type": "setQueryParam", "key": "tab"})).expect("decode");
        assert_eq!(
            message,
            ServerMessage::SetQueryParam(SetQueryParam {
                key: "tab".into(),
                value: None,
                replace: false,
            })
        );
    }

    #[test]
    fn unknown_types_pass_through_verbatim() {
        let raw = json!({"type": "upsertElement", "surfaceId": "main", "element": {"id": "x"}});
        let message: ServerMessage = serde_json::from_value(raw.clone()).expect("decode");
        assert_eq!(message.kind(), "upsertElement");
        assert_eq!(serde_json::to_value(&message).expect("encode"), raw);
    }

    #[test]
    fn malformed_known_message_is_an_error() {
        let decoded = serde_json::from_value::<ServerMessage>(json!({"type": "setGlobalState", "value": 1}));
        assert!(decoded.is_err());
    }

    #[test]
    fn encodes_type_tag() {
        let message = ServerMessage::NavigateTo(NavigateTo {
            route: "/settings".into(),
            replace: true,
            query_params: None,
        });
        assert_eq!(
            serde_json::to_value(&message).expect("encode"),
            json!({"type": "navigateTo", "route": "/settings", "replace": true})
        );
    }
}
