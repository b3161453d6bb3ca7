//! Route and query-string helpers.
//!
//! Routes are the app-relative locations a surface navigates between
//! (`/checkout?step=2`). Hosts address apps through a canonical URL of the
//! form `/use?id={app_id}&route={route}&...`, built here. Parsing is lenient:
//! malformed input degrades to an empty or partial map rather than failing.

use indexmap::IndexMap;
use tracing::debug;
use url::{Url, form_urlencoded};

/// Path of the canonical app URL.
pub const APP_ENTRY_PATH: &str = "/use";

/// Keys the canonical app URL sets itself.
const RESERVED_APP_PARAMS: [&str; 2] = ["id", "route"];

/// Parses a query string (with or without its leading `?`). Later duplicates
/// overwrite earlier ones.
pub fn parse_query(query: &str) -> IndexMap<String, String> {
    let query = query.trim().trim_start_matches('?');
    form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Encodes query parameters in insertion order.
pub fn build_query(params: &IndexMap<String, String>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Splits a route into its path and query parameters. Fragments are dropped.
pub fn split_route(route: &str) -> (String, IndexMap<String, String>) {
    let route = route.trim();
    let route = route.split_once('#').map_or(route, |(before, _)| before);
    match route.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (route.to_string(), IndexMap::new()),
    }
}

/// Returns `true` for routes that leave the app: absolute URLs with a scheme
/// (`https://..`, `mailto:..`) and protocol-relative `//host` references.
pub fn is_external_route(route: &str) -> bool {
    let route = route.trim();
    if route.starts_with("//") {
        return true;
    }
    if route.starts_with('/') {
        return false;
    }
    Url::parse(route).is_ok()
}

/// Returns `true` for app-relative routes (`/checkout`), which stay inside
/// the app and are tracked as the surface location.
pub fn is_internal_route(route: &str) -> bool {
    let route = route.trim();
    route.starts_with('/') && !is_external_route(route)
}

/// Builds `/use?id={app_id}&route={path}&...` for an internal route.
///
/// Query parameters embedded in `route` come first; `extra` parameters are
/// merged on top and win on conflicts. Parameters named `id` or `route` are
/// dropped since the URL already carries those keys.
pub fn canonical_app_url(app_id: &str, route: &str, extra: Option<&IndexMap<String, String>>) -> String {
    let (path, mut params) = split_route(route);
    if let Some(extra) = extra {
        for (key, value) in extra {
            params.insert(key.clone(), value.clone());
        }
    }
    for reserved in RESERVED_APP_PARAMS {
        if params.shift_remove(reserved).is_some() {
            debug!(key = reserved, "dropping reserved parameter from app URL");
        }
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("id", app_id).append_pair("route", &path);
    for (key, value) in &params {
        serializer.append_pair(key, value);
    }
    format!("{APP_ENTRY_PATH}?{}", serializer.finish())
}

/// Logical location of a surface: the app route and its query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub route: String,
    pub query: IndexMap<String, String>,
}

impl Location {
    pub fn parse(route: &str) -> Self {
        let (route, query) = split_route(route);
        Self { route, query }
    }

    /// Sets or, with `None`, removes a query parameter.
    pub fn set_param(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.query.insert(key.to_string(), value.to_string());
            }
            None => {
                self.query.shift_remove(key);
            }
        }
    }

    /// Route with its encoded query, e.g. `/search?q=rust`.
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            self.route.clone()
        } else {
            format!("{}?{}", self.route, build_query(&self.query))
        }
    }

    /// URL a host should display: the canonical app URL when an app id is
    /// known, the plain route otherwise.
    pub fn host_url(&self, app_id: Option<&str>) -> String {
        match app_id {
            Some(app_id) => canonical_app_url(app_id, &self.route, Some(&self.query)),
            None => self.href(),
        }
    }
}
