//! Server-message reconciliation.
//!
//! Applies [`ServerMessage`]s pushed by the backend:
//!
//! - state messages become [`DataStore`] writes (a `setPageState` for a page
//!   other than the active one primes that page without disturbing the view)
//! - `clearFileInput` is published on the [`NotificationBus`]
//! - navigation, query and dialog messages go to the [`NavigationHost`];
//!   without a host they are logged and dropped
//! - everything else is handed to the [`PassthroughHandler`]

mod host;
mod notify;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, warn};
use trellis_types::{NavigateTo, ServerMessage, SetQueryParam};
use trellis_util::{Location, canonical_app_url, is_internal_route, split_route};

use crate::store::DataStore;

pub use host::{NavigateOptions, NavigationHost, PassthroughHandler};
pub use notify::{AddressedNotification, ComponentSubscription, ElementNotification, NotificationBus};

/// What applying a message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    StateUpdated,
    Notified,
    /// Navigation was handed to the host with this URL.
    Navigated(String),
    DialogOpened,
    DialogClosed,
    Forwarded,
    /// Nothing could act on the message.
    Ignored,
}

pub struct Reconciler {
    store: DataStore,
    bus: NotificationBus,
    host: Option<Arc<dyn NavigationHost>>,
    passthrough: Option<Arc<dyn PassthroughHandler>>,
    location: Mutex<Location>,
}

impl Reconciler {
    pub fn new(store: DataStore, bus: NotificationBus) -> Self {
        Self {
            store,
            bus,
            host: None,
            passthrough: None,
            location: Mutex::new(Location::default()),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn NavigationHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_passthrough(mut self, handler: Arc<dyn PassthroughHandler>) -> Self {
        self.passthrough = Some(handler);
        self
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn location(&self) -> Location {
        self.lock_location().clone()
    }

    pub fn set_location(&self, location: Location) {
        *self.lock_location() = location;
    }

    pub fn apply(&self, message: ServerMessage) -> ReconcileOutcome {
        debug!(kind = %message.kind(), "reconciling server message");
        match message {
            ServerMessage::SetGlobalState(update) => state_outcome(self.store.set_global_value(&update.key, update.value)),
            ServerMessage::SetPageState(update) => {
                if self.store.active_page().as_deref() != Some(update.page_id.as_str()) {
                    debug!(page_id = %update.page_id, key = %update.key, "priming inactive page");
                }
                state_outcome(self.store.set_page_value(&update.page_id, &update.key, update.value))
            }
            ServerMessage::ClearPageState(clear) => {
                self.store.clear_page(&clear.page_id);
                ReconcileOutcome::StateUpdated
            }
            ServerMessage::ClearFileInput(target) => {
                self.bus
                    .publish(&target.surface_id, &target.component_id, ElementNotification::ClearFileInput);
                ReconcileOutcome::Notified
            }
            ServerMessage::NavigateTo(navigation) => self.navigate(&navigation),
            ServerMessage::SetQueryParam(update) => self.set_query_param(&update),
            ServerMessage::OpenDialog(dialog) => {
                let Some(host) = self.host_or_warn("openDialog") else {
                    return ReconcileOutcome::Ignored;
                };
                host.open_dialog(
                    &dialog.route,
                    dialog.title.as_deref(),
                    dialog.query_params.as_ref(),
                    dialog.dialog_id.as_deref(),
                );
                ReconcileOutcome::DialogOpened
            }
            ServerMessage::CloseDialog(dialog) => {
                let Some(host) = self.host_or_warn("closeDialog") else {
                    return ReconcileOutcome::Ignored;
                };
                host.close_dialog(dialog.dialog_id.as_deref());
                ReconcileOutcome::DialogClosed
            }
            ServerMessage::Passthrough(raw) => match &self.passthrough {
                Some(handler) => {
                    handler.handle(&raw);
                    ReconcileOutcome::Forwarded
                }
                None => {
                    debug!(kind = raw.get("type").and_then(|kind| kind.as_str()).unwrap_or("unknown"), "no passthrough handler registered");
                    ReconcileOutcome::Ignored
                }
            },
        }
    }

    /// Hands a navigation to the host and tracks the new location.
    pub fn navigate(&self, navigation: &NavigateTo) -> ReconcileOutcome {
        let Some(host) = self.host_or_warn("navigateTo") else {
            return ReconcileOutcome::Ignored;
        };
        let url = self.navigation_url(navigation);
        host.navigate(
            &url,
            NavigateOptions {
                replace: navigation.replace,
                shallow: false,
            },
        );
        if is_internal_route(&navigation.route) {
            let (route, query) = merged_route(&navigation.route, navigation.query_params.as_ref());
            self.set_location(Location { route, query });
        }
        ReconcileOutcome::Navigated(url)
    }

    /// URL the host receives for a navigation. Internal routes are rewritten
    /// into the canonical app URL when an app id is known; external URLs and
    /// relative routes pass through unchanged.
    pub fn navigation_url(&self, navigation: &NavigateTo) -> String {
        let route = navigation.route.trim();
        if !is_internal_route(route) {
            return route.to_string();
        }
        match self.store.app_id() {
            Some(app_id) => canonical_app_url(app_id, route, navigation.query_params.as_ref()),
            None => {
                let (route, query) = merged_route(route, navigation.query_params.as_ref());
                Location { route, query }.href()
            }
        }
    }

    fn set_query_param(&self, update: &SetQueryParam) -> ReconcileOutcome {
        let url = {
            let mut location = self.lock_location();
            location.set_param(&update.key, update.value.as_deref());
            location.host_url(self.store.app_id())
        };
        let Some(host) = self.host_or_warn("setQueryParam") else {
            return ReconcileOutcome::Ignored;
        };
        host.navigate(
            &url,
            NavigateOptions {
                replace: update.replace,
                shallow: true,
            },
        );
        ReconcileOutcome::Navigated(url)
    }

    fn host_or_warn(&self, kind: &str) -> Option<&Arc<dyn NavigationHost>> {
        if self.host.is_none() {
            warn!(kind = %kind, "no navigation host registered; dropping message");
        }
        self.host.as_ref()
    }

    fn lock_location(&self) -> MutexGuard<'_, Location> {
        self.location.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn state_outcome(applied: bool) -> ReconcileOutcome {
    if applied {
        ReconcileOutcome::StateUpdated
    } else {
        ReconcileOutcome::Ignored
    }
}

fn merged_route(route: &str, extra: Option<&IndexMap<String, String>>) -> (String, IndexMap<String, String>) {
    let (path, mut query) = split_route(route);
    if let Some(extra) = extra {
        query.extend(extra.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    (path, query)
}
