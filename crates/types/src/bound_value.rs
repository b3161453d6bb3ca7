//! Bound values: how a component property refers to its data.
//!
//! A bound value is either an inline literal or a path into the surface data
//! model. On the wire it is an object with exactly one populated case:
//!
//! ```json
//! {"literalString": "Hello"}
//! {"literalNumber": 42.0}
//! {"literalBool": true}
//! {"literalOptions": ["a", "b"]}
//! {"path": "user.profile.name", "defaultValue": "Ada"}
//! ```
//!
//! Objects with zero or several cases are rejected with [`BoundValueError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding a bound value from its wire object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundValueError {
    #[error("bound value has no populated case")]
    Empty,
    #[error("bound value populates {count} cases; exactly one is allowed")]
    Ambiguous { count: usize },
    #[error("defaultValue is only valid alongside a path")]
    DefaultWithoutPath,
}

/// Inline constant carried by a literal binding.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Bool(bool),
    Options(Vec<Value>),
}

impl LiteralValue {
    /// Converts the literal into its JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(text) => Value::String(text.clone()),
            Self::Number(number) => Value::from(*number),
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Options(options) => Value::Array(options.clone()),
        }
    }

    /// Wraps an arbitrary JSON value in the closest literal case.
    ///
    /// `null` becomes an empty string and objects are carried as their JSON
    /// text, since neither has a literal case of its own.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::String(text.clone()),
            Value::Number(number) => Self::Number(number.as_f64().unwrap_or_default()),
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Array(items) => Self::Options(items.clone()),
            Value::Null => Self::String(String::new()),
            Value::Object(_) => Self::String(value.to_string()),
        }
    }
}

/// Path into the data model plus an optional preview default.
#[derive(Debug, Clone, PartialEq)]
pub struct PathBinding {
    pub path: String,
    /// Value a presentation shell may show when the path is unresolved.
    /// Plain resolution never applies it.
    pub default_value: Option<Value>,
}

/// A component property binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoundValueWire", into = "BoundValueWire")]
pub enum BoundValue {
    Literal(LiteralValue),
    Path(PathBinding),
}

impl BoundValue {
    pub fn literal_string(value: impl Into<String>) -> Self {
        Self::Literal(LiteralValue::String(value.into()))
    }

    pub fn literal_number(value: f64) -> Self {
        Self::Literal(LiteralValue::Number(value))
    }

    pub fn literal_bool(value: bool) -> Self {
        Self::Literal(LiteralValue::Bool(value))
    }

    pub fn literal_options(options: Vec<Value>) -> Self {
        Self::Literal(LiteralValue::Options(options))
    }

    /// Literal wrapping an arbitrary JSON value, see [`LiteralValue::from_json`].
    pub fn literal_json(value: &Value) -> Self {
        Self::Literal(LiteralValue::from_json(value))
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(PathBinding {
            path: path.into(),
            default_value: None,
        })
    }

    pub fn path_with_default(path: impl Into<String>, default_value: Value) -> Self {
        Self::Path(PathBinding {
            path: path.into(),
            default_value: Some(default_value),
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Returns the bound path for path bindings.
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Path(binding) => Some(binding.path.as_str()),
            Self::Literal(_) => None,
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        match self {
            Self::Path(binding) => binding.default_value.as_ref(),
            Self::Literal(_) => None,
        }
    }

    /// Encodes the binding as its wire object.
    pub fn to_json(&self) -> Value {
        // A wire struct of strings, numbers and JSON values always serializes.
        serde_json::to_value(BoundValueWire::from(self.clone())).unwrap_or(Value::Null)
    }
}

/// Flat wire representation; exactly one case must be populated.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundValueWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    literal_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    literal_number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    literal_bool: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    literal_options: Option<Vec<Value>>,
}

impl TryFrom<BoundValueWire> for BoundValue {
    type Error = BoundValueError;

    fn try_from(wire: BoundValueWire) -> Result<Self, Self::Error> {
        let count = [
            wire.path.is_some(),
            wire.literal_string.is_some(),
            wire.literal_number.is_some(),
            wire.literal_bool.is_some(),
            wire.literal_options.is_some(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count();

        match count {
            0 => return Err(BoundValueError::Empty),
            1 => {}
            count => return Err(BoundValueError::Ambiguous { count }),
        }
        if wire.default_value.is_some() && wire.path.is_none() {
            return Err(BoundValueError::DefaultWithoutPath);
        }

        let bound = if let Some(path) = wire.path {
            Self::Path(PathBinding {
                path,
                default_value: wire.default_value,
            })
        } else if let Some(text) = wire.literal_string {
            Self::literal_string(text)
        } else if let Some(number) = wire.literal_number {
            Self::literal_number(number)
        } else if let Some(flag) = wire.literal_bool {
            Self::literal_bool(flag)
        } else {
            Self::literal_options(wire.literal_options.unwrap_or_default())
        };
        Ok(bound)
    }
}

impl From<BoundValue> for BoundValueWire {
    fn from(bound: BoundValue) -> Self {
        match bound {
            BoundValue::Path(binding) => Self {
                path: Some(binding.path),
                default_value: binding.default_value,
                ..Self::default()
            },
            BoundValue::Literal(LiteralValue::String(text)) => Self {
                literal_string: Some(text),
                ..Self::default()
            },
            BoundValue::Literal(LiteralValue::Number(number)) => Self {
                literal_number: Some(number),
                ..Self::default()
            },
            BoundValue::Literal(LiteralValue::Bool(flag)) => Self {
                literal_bool: Some(flag),
                ..Self::default()
            },
            BoundValue::Literal(LiteralValue::Options(options)) => Self {
                literal_options: Some(options),
                ..Self::default()
            },
        }
    }
}
