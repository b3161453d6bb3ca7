use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How a surface reacts to user interaction.
///
/// `Live` and `Preview` surfaces emit actions. `Static` surfaces render only
/// and every trigger is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Live,
    Preview,
    Static,
}

impl InteractionMode {
    pub fn is_interactive(self) -> bool {
        !matches!(self, Self::Static)
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Live => "live",
            Self::Preview => "preview",
            Self::Static => "static",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown interaction mode '{0}' (expected live, preview, or static)")]
pub struct ParseInteractionModeError(pub String);

impl FromStr for InteractionMode {
    type Err = ParseInteractionModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "preview" => Ok(Self::Preview),
            "static" => Ok(Self::Static),
            other => Err(ParseInteractionModeError(other.to_string())),
        }
    }
}
