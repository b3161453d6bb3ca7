//! Surface runtime composition.
//!
//! A [`SurfaceRuntime`] owns the dispatcher, reconciler and execution
//! invoker of one rendered surface tree and shares a [`DataStore`] with
//! them. Runtimes are constructed explicitly through [`SurfaceRuntimeBuilder`];
//! a dialog portal builds its own runtime over the same store so its ledger
//! stays independent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use trellis_types::{Action, BoundValue, ClientMessage, InteractionMode, NavigateTo, RunMetadata, ServerMessage, element_address};
use trellis_util::{InMemoryPersistence, Location, StatePersistence, is_internal_route};

use crate::backend::{ExecutionBackend, NullExecutionBackend};
use crate::dispatch::{ActionDispatcher, ActionHandler, ActionRef};
use crate::execution::{ExecutionInvoker, ExecutionTarget, Invocation, RoutedMessage, SurfaceSnapshot, bound_path};
use crate::reconcile::{NavigationHost, NotificationBus, PassthroughHandler, ReconcileOutcome, Reconciler};
use crate::resolve::resolve;
use crate::store::{DataStore, PathContext, StateScope};

/// What happened to a dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The message went to the host action handler.
    Forwarded(ClientMessage),
    /// The action ran a board. `run` is `None` when the run failed to start.
    Executed { message: ClientMessage, run: Option<RunMetadata> },
}

impl ActionOutcome {
    pub fn message(&self) -> &ClientMessage {
        match self {
            Self::Forwarded(message) | Self::Executed { message, .. } => message,
        }
    }
}

pub struct SurfaceRuntimeBuilder {
    surface_id: String,
    app_id: Option<String>,
    default_board_id: Option<String>,
    mode: InteractionMode,
    stream_state: bool,
    store: Option<DataStore>,
    persistence: Option<Arc<dyn StatePersistence>>,
    backend: Option<Arc<dyn ExecutionBackend>>,
    host: Option<Arc<dyn NavigationHost>>,
    action_handler: Option<Arc<dyn ActionHandler>>,
    passthrough: Option<Arc<dyn PassthroughHandler>>,
    bus: Option<NotificationBus>,
}

impl SurfaceRuntimeBuilder {
    pub fn new(surface_id: impl Into<String>) -> Self {
        Self {
            surface_id: surface_id.into(),
            app_id: None,
            default_board_id: None,
            mode: InteractionMode::default(),
            stream_state: false,
            store: None,
            persistence: None,
            backend: None,
            host: None,
            action_handler: None,
            passthrough: None,
            bus: None,
        }
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Board run by `workflow_event` actions that do not name one.
    pub fn default_board_id(mut self, board_id: impl Into<String>) -> Self {
        self.default_board_id = Some(board_id.into());
        self
    }

    pub fn mode(mut self, mode: InteractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Asks the backend to stream intermediate state events.
    pub fn stream_state(mut self, stream_state: bool) -> Self {
        self.stream_state = stream_state;
        self
    }

    /// Shares an existing store. Takes precedence over `app_id` and
    /// `persistence`.
    pub fn store(mut self, store: DataStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn navigation_host(mut self, host: Arc<dyn NavigationHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn action_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.action_handler = Some(handler);
        self
    }

    pub fn passthrough_handler(mut self, handler: Arc<dyn PassthroughHandler>) -> Self {
        self.passthrough = Some(handler);
        self
    }

    pub fn notification_bus(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Builds the runtime. Must be called inside a Tokio runtime when the
    /// store is created here with an app id, so persistence writes have a
    /// writer task.
    pub fn build(self) -> SurfaceRuntime {
        let store = match self.store {
            Some(store) => store,
            None => {
                let persistence = self
                    .persistence
                    .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));
                DataStore::new(self.app_id, persistence)
            }
        };

        let mut dispatcher = ActionDispatcher::new(self.surface_id.clone(), self.mode);
        if let Some(handler) = self.action_handler {
            dispatcher = dispatcher.with_handler(handler);
        }

        let mut reconciler = Reconciler::new(store.clone(), self.bus.unwrap_or_default());
        if let Some(host) = self.host {
            reconciler = reconciler.with_host(host);
        }
        if let Some(handler) = self.passthrough {
            reconciler = reconciler.with_passthrough(handler);
        }

        let backend = self.backend.unwrap_or_else(|| Arc::new(NullExecutionBackend));
        debug!(surface_id = %self.surface_id, mode = %self.mode, app_id = store.app_id().unwrap_or("-"), "surface runtime built");

        SurfaceRuntime {
            surface_id: self.surface_id,
            default_board_id: self.default_board_id,
            stream_state: self.stream_state,
            store,
            dispatcher,
            reconciler,
            invoker: ExecutionInvoker::new(backend),
            components: Mutex::new(IndexMap::new()),
        }
    }
}

/// Runtime of one rendered surface tree.
pub struct SurfaceRuntime {
    surface_id: String,
    default_board_id: Option<String>,
    stream_state: bool,
    store: DataStore,
    dispatcher: ActionDispatcher,
    reconciler: Reconciler,
    invoker: ExecutionInvoker,
    /// Component descriptors currently on the surface, by component id.
    components: Mutex<IndexMap<String, Value>>,
}

impl SurfaceRuntime {
    pub fn builder(surface_id: impl Into<String>) -> SurfaceRuntimeBuilder {
        SurfaceRuntimeBuilder::new(surface_id)
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    pub fn mode(&self) -> InteractionMode {
        self.dispatcher.mode()
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn invoker(&self) -> &ExecutionInvoker {
        &self.invoker
    }

    pub fn notifications(&self) -> &NotificationBus {
        self.reconciler.notifications()
    }

    /// Loads application state. Call once when the session starts.
    pub async fn start_session(&self) {
        self.store.load_global().await;
    }

    /// Switches to a page: drops the element value ledger, makes the page
    /// active, records the route and loads the page's persisted state.
    pub async fn enter_page(&self, page_id: &str, route: &str) {
        self.dispatcher.clear_ledger();
        self.store.activate_page(page_id);
        self.reconciler.set_location(Location::parse(route));
        info!(surface_id = %self.surface_id, page_id = %page_id, route = %route, "entering page");
        self.store.load_page(page_id).await;
    }

    /// Adds or replaces component descriptors. Descriptors need an `id`.
    pub fn register_components(&self, descriptors: impl IntoIterator<Item = Value>) {
        let mut components = self.lock_components();
        for descriptor in descriptors {
            match descriptor.get("id").and_then(Value::as_str) {
                Some(id) => {
                    components.insert(id.to_string(), descriptor.clone());
                }
                None => warn!(surface_id = %self.surface_id, "ignoring component descriptor without an id"),
            }
        }
    }

    /// Removes a component and drops its local state.
    pub fn remove_component(&self, component_id: &str) {
        self.lock_components().shift_remove(component_id);
        self.store.unmount_component(component_id);
    }

    /// Every component on the surface, keyed by element address.
    pub fn known_elements(&self) -> IndexMap<String, Value> {
        self.lock_components()
            .iter()
            .map(|(id, descriptor)| (element_address(&self.surface_id, id), descriptor.clone()))
            .collect()
    }

    /// Resolves a binding against the effective view of `component_id`.
    pub fn resolve(&self, bound: &BoundValue, component_id: Option<&str>) -> Option<Value> {
        let context = component_id.map(PathContext::component).unwrap_or_default();
        resolve(bound, &self.store, &context)
    }

    /// Dispatches a user action. `workflow_event` actions run their board;
    /// everything else goes to the host action handler. A `change` on a
    /// registered component whose value is bound to a path also writes the
    /// new value there in page scope.
    pub async fn dispatch(&self, action: &Action, source_component_id: &str) -> ActionOutcome {
        if action.is_change() {
            self.write_bound_value(action, source_component_id);
        }
        if action.is_workflow_event() {
            if let Some(app_id) = self.store.app_id()
                && let Some(target) = ExecutionTarget::from_action(action, self.default_board_id.as_deref())
            {
                let message = self.dispatcher.record(action, source_component_id);
                let run = self.execute(app_id, target, action).await;
                return ActionOutcome::Executed { message, run };
            }
            warn!(
                surface_id = %self.surface_id,
                component_id = %source_component_id,
                "workflow event has no app id or board target; forwarding to action handler"
            );
        }
        ActionOutcome::Forwarded(self.dispatcher.dispatch(action, source_component_id))
    }

    /// Dispatches on behalf of a component, merging `extra_context` over the
    /// action's own context. Returns `None` on non-interactive surfaces.
    pub async fn trigger(
        &self,
        source_component_id: &str,
        action: impl Into<ActionRef>,
        extra_context: Map<String, Value>,
    ) -> Option<ActionOutcome> {
        let action = self.dispatcher.prepare_trigger(action, extra_context)?;
        Some(self.dispatch(&action, source_component_id).await)
    }

    pub fn report_error(&self, component_id: Option<&str>, message: impl Into<String>, code: impl Into<String>) -> ClientMessage {
        self.dispatcher.report_error(component_id, message, code)
    }

    /// Applies a server message pushed outside of a board run.
    pub fn apply_server_message(&self, message: ServerMessage) -> ReconcileOutcome {
        match message {
            ServerMessage::NavigateTo(navigation) => self.follow_navigation(&navigation),
            message => self.reconciler.apply(message),
        }
    }

    fn write_bound_value(&self, action: &Action, component_id: &str) {
        let Some(value) = action.context.get("value") else {
            return;
        };
        let Some(path) = self.lock_components().get(component_id).and_then(bound_path) else {
            return;
        };
        if self.store.set(StateScope::Page, &PathContext::new(), &path, value.clone()) {
            debug!(surface_id = %self.surface_id, component_id = %component_id, path = %path, "wrote change to bound path");
        }
    }

    async fn execute(&self, app_id: &str, target: ExecutionTarget, action: &Action) -> Option<RunMetadata> {
        let ledger = self.dispatcher.ledger_snapshot();
        let known_elements = self.known_elements();
        let invocation = Invocation {
            app_id,
            surface_id: &self.surface_id,
            target,
            action,
            ledger: &ledger,
            known_elements: &known_elements,
            snapshot: self.snapshot(),
            stream_state: self.stream_state,
        };
        self.invoker
            .invoke(invocation, |routed| match routed {
                RoutedMessage::Navigate(navigation) => {
                    self.follow_navigation(&navigation);
                }
                RoutedMessage::Reconcile(message) => {
                    self.reconciler.apply(message);
                }
            })
            .await
    }

    fn snapshot(&self) -> SurfaceSnapshot {
        let location = self.reconciler.location();
        let page_id = self.store.active_page();
        let page_state = page_id
            .as_deref()
            .map(|page_id| self.store.page_snapshot(page_id))
            .unwrap_or_default();
        SurfaceSnapshot {
            route: location.route,
            query_params: location.query,
            page_id,
            global_state: self.store.global_snapshot(),
            page_state,
        }
    }

    /// The ledger belongs to the page being left; it is dropped only once the
    /// host has taken an in-app navigation.
    fn follow_navigation(&self, navigation: &NavigateTo) -> ReconcileOutcome {
        let outcome = self.reconciler.navigate(navigation);
        if matches!(outcome, ReconcileOutcome::Navigated(_)) && is_internal_route(&navigation.route) {
            self.dispatcher.clear_ledger();
        }
        outcome
    }

    fn lock_components(&self) -> MutexGuard<'_, IndexMap<String, Value>> {
        self.components.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
