//! Runtime settings file IO.
//!
//! Settings live in `~/.config/trellis/runtime.json` unless
//! `TRELLIS_CONFIG_PATH` points elsewhere. A missing file yields defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_types::InteractionMode;

use crate::expand_tilde;
use crate::persistence::default_state_dir;

/// Environment variable overriding the settings file location.
pub const CONFIG_PATH_ENV: &str = "TRELLIS_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize settings for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// User-level defaults for the runtime and CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    /// Root directory of persisted state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Base URL of the execution backend; offline when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    /// Name of the environment variable holding the backend bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default)]
    pub interaction_mode: InteractionMode,
}

impl RuntimeSettings {
    /// State directory after tilde expansion, falling back to the default.
    pub fn resolved_state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(path) => expand_tilde(&path.to_string_lossy()),
            None => default_state_dir(),
        }
    }

    /// Reads the bearer token from the configured environment variable.
    pub fn backend_token(&self) -> Option<String> {
        let name = self.token_env.as_deref()?;
        env::var(name).ok().filter(|token| !token.trim().is_empty())
    }
}

/// Returns the default path for the settings file.
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("trellis").join("runtime.json")
}

/// Loads settings from the default path.
pub fn load_settings() -> Result<RuntimeSettings, SettingsError> {
    load_settings_from_path(&default_settings_path())
}

pub fn load_settings_from_path(path: &Path) -> Result<RuntimeSettings, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(RuntimeSettings::default()),
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_settings_to_path(settings: &RuntimeSettings, path: &Path) -> Result<(), SettingsError> {
    write_json(settings, path)
}

/// Serializes before touching the filesystem, so a failed encode leaves no
/// directory or partial file behind.
fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), SettingsError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| SettingsError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    let io_error = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, content).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_path_honors_environment_override() {
        let override_path = "~/custom/trellis/runtime.json";
        temp_env::with_var(CONFIG_PATH_ENV, Some(override_path), || {
            assert_eq!(default_settings_path(), expand_tilde(override_path));
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[test]
    fn save_then_load_keeps_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("runtime.json");
        let settings = RuntimeSettings {
            app_id: Some("shop".into()),
            backend_url: Some("https://flows.example.com/api/v1".into()),
            token_env: Some("TRELLIS_TOKEN".into()),
            interaction_mode: InteractionMode::Preview,
            ..RuntimeSettings::default()
        };
        save_settings_to_path(&settings, &path).unwrap();
        assert_eq!(load_settings_from_path(&path).unwrap(), settings);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"interactionMode\": \"preview\""));
    }

    #[test]
    fn invalid_json_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        fs::write(&path, "[").unwrap();
        let error = load_settings_from_path(&path).unwrap_err();
        assert!(error.to_string().contains("runtime.json"));
    }

    #[test]
    fn encode_failures_are_reported_as_serialize_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("runtime.json");
        let unencodable = std::collections::BTreeMap::from([((1, 2), "tuple keys have no JSON form")]);

        let error = write_json(&unencodable, &path).unwrap_err();
        assert!(matches!(error, SettingsError::Serialize { .. }));
        assert!(error.to_string().starts_with("failed to serialize settings"));
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn token_is_read_from_named_variable() {
        let settings = RuntimeSettings {
            token_env: Some("TRELLIS_TEST_TOKEN".into()),
            ..RuntimeSettings::default()
        };
        temp_env::with_var("TRELLIS_TEST_TOKEN", Some("secret"), || {
            assert_eq!(settings.backend_token().as_deref(), Some("secret"));
        });
        temp_env::with_var_unset("TRELLIS_TEST_TOKEN", || {
            assert_eq!(settings.backend_token(), None);
        });
    }
}
