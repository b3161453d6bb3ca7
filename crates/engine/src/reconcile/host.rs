use indexmap::IndexMap;
use serde_json::Value;

/// How a navigation should be performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing one.
    pub replace: bool,
    /// Update the URL without reloading the surface.
    pub shallow: bool,
}

/// Routing and dialog host the runtime drives.
pub trait NavigationHost: Send + Sync {
    fn navigate(&self, url: &str, options: NavigateOptions);

    fn open_dialog(&self, route: &str, title: Option<&str>, query_params: Option<&IndexMap<String, String>>, dialog_id: Option<&str>);

    fn close_dialog(&self, dialog_id: Option<&str>);
}

/// Receiver of server messages the runtime does not interpret itself
/// (surface and element updates, for instance).
pub trait PassthroughHandler: Send + Sync {
    fn handle(&self, message: &Value);
}

impl<F> PassthroughHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn handle(&self, message: &Value) {
        self(message)
    }
}
