//! Utilities shared by the Trellis runtime and CLI: data-path traversal,
//! route/query handling, state persistence backends, and settings IO.

use std::path::PathBuf;

use dirs_next::home_dir;

pub mod data_path;
pub mod persistence;
pub mod query;
pub mod settings;

pub use data_path::{MAX_ARRAY_PADDING, PathSegment, get_in, parse_path, remove_in, root_key, set_in};
pub use persistence::{InMemoryPersistence, JsonFilePersistence, PersistenceError, STATE_DIR_ENV, ScopeKey, StatePersistence, default_state_dir};
pub use query::{Location, build_query, canonical_app_url, is_external_route, is_internal_route, parse_query, split_route};
pub use settings::{CONFIG_PATH_ENV, RuntimeSettings, SettingsError, default_settings_path, load_settings, load_settings_from_path, save_settings_to_path};

/// Expands a leading `~` (either separator style) to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let home = || home_dir().unwrap_or_else(|| PathBuf::from("~"));
    if trimmed == "~" {
        return home();
    }
    match trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        Some(rest) => home().join(rest),
        None => PathBuf::from(trimmed),
    }
}
