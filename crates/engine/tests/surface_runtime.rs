use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tempfile::tempdir;
use trellis_engine::{
    ActionOutcome, EventStream, ExecutionBackend, ExecutionError, NavigateOptions, NavigationHost, SurfaceRuntime,
};
use trellis_types::{
    Action, ClientMessage, ExecutionEvent, ExecutionRequest, InteractionMode, NavigateTo, ServerMessage, SetGlobalState,
    SetPageState,
};
use tokio::sync::Semaphore;
use trellis_util::{InMemoryPersistence, JsonFilePersistence, PersistenceError, ScopeKey, StatePersistence};

/// Backend that answers a fixed element list and replays scripted events.
#[derive(Default)]
struct ScriptedBackend {
    elements: IndexMap<String, Value>,
    events: Vec<ExecutionEvent>,
    element_calls: AtomicUsize,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedBackend {
    fn with_elements(elements: &[(&str, Value)]) -> Self {
        Self {
            elements: elements.iter().map(|(key, value)| (key.to_string(), value.clone())).collect(),
            ..Self::default()
        }
    }

    fn emitting(mut self, messages: &[ServerMessage]) -> Self {
        self.events.push(ExecutionEvent::new("run_initiated", json!({"run_id": "run-1"})));
        for message in messages {
            self.events.push(ExecutionEvent::ui(message).unwrap());
        }
        self.events.push(ExecutionEvent::new("completed", json!({"status": "success"})));
        self
    }

    fn last_request(&self) -> ExecutionRequest {
        self.requests.lock().unwrap().last().cloned().expect("a board run")
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn get_execution_elements(
        &self,
        _app_id: &str,
        _board_id: &str,
        _surface_id: &str,
        wildcard: bool,
    ) -> Result<IndexMap<String, Value>, ExecutionError> {
        assert!(!wildcard);
        self.element_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.elements.clone())
    }

    async fn execute_board(&self, request: ExecutionRequest) -> Result<EventStream, ExecutionError> {
        self.requests.lock().unwrap().push(request);
        Ok(stream::iter(self.events.clone().into_iter().map(Ok)).boxed())
    }
}

#[derive(Default)]
struct RecordingHost {
    urls: Mutex<Vec<String>>,
}

impl NavigationHost for RecordingHost {
    fn navigate(&self, url: &str, _options: NavigateOptions) {
        self.urls.lock().unwrap().push(url.to_string());
    }

    fn open_dialog(&self, _route: &str, _title: Option<&str>, _query_params: Option<&IndexMap<String, String>>, _dialog_id: Option<&str>) {}

    fn close_dialog(&self, _dialog_id: Option<&str>) {}
}

fn submit() -> Action {
    Action::new("workflow_event")
        .with_context("boardId", json!("checkout-board"))
        .with_context("eventId", json!("on-submit"))
}

fn change(value: Value) -> Action {
    Action::new("change").with_context("value", value)
}

#[tokio::test]
async fn elements_are_fetched_once_per_board_and_surface() {
    let backend = Arc::new(ScriptedBackend::with_elements(&[(
        "checkout/email",
        json!({"id": "email", "type": "textField", "value": {"path": "/form/email"}}),
    )]));
    let runtime = SurfaceRuntime::builder("checkout")
        .app_id("shop")
        .backend(backend.clone())
        .build();
    runtime.enter_page("/checkout", "/checkout").await;

    runtime.dispatch(&submit(), "pay").await;
    runtime.dispatch(&submit(), "pay").await;

    assert_eq!(backend.element_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn payload_carries_ledger_values_and_surface_context() {
    let backend = Arc::new(
        ScriptedBackend::with_elements(&[
            ("checkout/email", json!({"id": "email", "type": "textField", "value": {"path": "/form/email"}})),
            ("checkout/terms", json!({"id": "terms", "type": "checkbox", "checked": {"literalBool": false}})),
        ])
        .emitting(&[]),
    );
    let runtime = SurfaceRuntime::builder("checkout")
        .app_id("shop")
        .backend(backend.clone())
        .build();
    runtime.start_session().await;
    runtime.enter_page("/checkout", "/checkout?plan=pro").await;
    runtime.store().set_global_value("user.id", json!(42));

    runtime.dispatch(&change(json!("ada@example.com")), "email").await;
    runtime.dispatch(&change(json!(true)), "terms").await;
    let outcome = runtime.dispatch(&submit(), "pay").await;

    let ActionOutcome::Executed { run: Some(run), .. } = &outcome else {
        panic!("expected a board run, got {outcome:?}");
    };
    assert_eq!(run.run_id.as_deref(), Some("run-1"));
    assert_eq!(run.status.as_deref(), Some("success"));

    let request = backend.last_request();
    assert_eq!(request.app_id, "shop");
    assert_eq!(request.board_id, "checkout-board");
    assert_eq!(request.payload.id, "on-submit");

    let input = &request.payload.payload;
    assert_eq!(input.elements["checkout/email"]["value"], json!({"literalString": "ada@example.com"}));
    assert_eq!(input.elements["checkout/terms"]["checked"], json!({"literalBool": true}));
    assert_eq!(input.route, "/checkout");
    assert_eq!(input.query_params.get("plan").map(String::as_str), Some("pro"));
    assert_eq!(input.page_id.as_deref(), Some("/checkout"));
    assert_eq!(input.global_state.get("user"), Some(&json!({"id": 42})));
    assert_eq!(input.action.get("eventId"), Some(&json!("on-submit")));
}

#[tokio::test]
async fn empty_element_answer_sends_every_known_component() {
    let backend = Arc::new(ScriptedBackend::default());
    let runtime = SurfaceRuntime::builder("main")
        .app_id("shop")
        .backend(backend.clone())
        .build();
    runtime.register_components([json!({"id": "name", "type": "textField"}), json!({"id": "save", "type": "button"})]);

    runtime.dispatch(&change(json!("Grace")), "name").await;
    runtime.dispatch(&submit(), "save").await;

    let elements = backend.last_request().payload.payload.elements;
    assert_eq!(elements.keys().collect::<Vec<_>>(), ["main/name", "main/save"]);
    assert_eq!(elements["main/name"]["value"], json!({"literalString": "Grace"}));
}

#[tokio::test]
async fn stream_messages_update_state_and_navigation_clears_the_ledger() {
    let backend = Arc::new(
        ScriptedBackend::with_elements(&[("checkout/email", json!({"id": "email"}))]).emitting(&[
            ServerMessage::SetGlobalState(SetGlobalState {
                key: "cart.count".into(),
                value: json!(0),
            }),
            ServerMessage::NavigateTo(NavigateTo {
                route: "/thanks".into(),
                replace: true,
                query_params: None,
            }),
        ]),
    );
    let host = Arc::new(RecordingHost::default());
    let runtime = SurfaceRuntime::builder("checkout")
        .app_id("shop")
        .backend(backend)
        .navigation_host(host.clone())
        .build();
    runtime.enter_page("/checkout", "/checkout").await;

    runtime.dispatch(&change(json!("ada@example.com")), "email").await;
    runtime.dispatch(&submit(), "pay").await;

    assert_eq!(runtime.store().global_snapshot().get("cart"), Some(&json!({"count": 0})));
    assert_eq!(host.urls.lock().unwrap().as_slice(), ["/use?id=shop&route=%2Fthanks"]);
    assert!(runtime.dispatcher().ledger_snapshot().is_empty());
    assert_eq!(runtime.reconciler().location().route, "/thanks");
}

#[tokio::test]
async fn static_surfaces_ignore_triggers() {
    let backend = Arc::new(ScriptedBackend::default());
    let received = Arc::new(Mutex::new(Vec::<ClientMessage>::new()));
    let sink = received.clone();
    let runtime = SurfaceRuntime::builder("thumbnail")
        .app_id("shop")
        .mode(InteractionMode::Static)
        .backend(backend.clone())
        .action_handler(Arc::new(move |message: &ClientMessage| sink.lock().unwrap().push(message.clone())))
        .build();

    assert!(runtime.trigger("pay", submit(), Default::default()).await.is_none());
    assert!(runtime.trigger("name", "change", Default::default()).await.is_none());

    assert!(received.lock().unwrap().is_empty());
    assert!(backend.requests.lock().unwrap().is_empty());
    assert!(runtime.dispatcher().ledger_snapshot().is_empty());
}

#[tokio::test]
async fn page_state_for_another_page_is_visible_after_navigating_there() {
    let persistence = Arc::new(InMemoryPersistence::new());
    let runtime = SurfaceRuntime::builder("main")
        .app_id("shop")
        .persistence(persistence.clone())
        .build();
    runtime.enter_page("/cart", "/cart").await;

    runtime.apply_server_message(ServerMessage::SetPageState(SetPageState {
        page_id: "/receipt".into(),
        key: "banner".into(),
        value: json!("Paid"),
    }));
    let banner = trellis_types::BoundValue::path("banner");
    assert_eq!(runtime.resolve(&banner, None), None);

    runtime.enter_page("/receipt", "/receipt").await;
    assert_eq!(runtime.resolve(&banner, None), Some(json!("Paid")));

    runtime.store().flush().await;
    let persisted = persistence.get_all(&ScopeKey::page("shop", "/receipt")).await.unwrap();
    assert_eq!(persisted.get("banner"), Some(&json!("Paid")));
}

#[tokio::test]
async fn state_survives_a_new_session_on_disk() {
    let dir = tempdir().unwrap();
    {
        let runtime = SurfaceRuntime::builder("main")
            .app_id("shop")
            .persistence(Arc::new(JsonFilePersistence::new(dir.path())))
            .build();
        runtime.start_session().await;
        runtime.enter_page("/profile", "/profile").await;
        runtime.store().set_global_value("theme", json!("dark"));
        runtime.store().set_page_value("/profile", "form.name", json!("Ada"));
        runtime.store().flush().await;
    }

    let runtime = SurfaceRuntime::builder("main")
        .app_id("shop")
        .persistence(Arc::new(JsonFilePersistence::new(dir.path())))
        .build();
    runtime.start_session().await;
    runtime.enter_page("/profile", "/profile").await;

    assert_eq!(runtime.resolve(&trellis_types::BoundValue::path("theme"), None), Some(json!("dark")));
    assert_eq!(
        runtime.resolve(&trellis_types::BoundValue::path("/form/name"), None),
        Some(json!("Ada"))
    );
}

#[tokio::test]
async fn failed_runs_yield_no_metadata() {
    struct FailingBackend;

    #[async_trait]
    impl ExecutionBackend for FailingBackend {
        async fn get_execution_elements(
            &self,
            _app_id: &str,
            _board_id: &str,
            _surface_id: &str,
            _wildcard: bool,
        ) -> Result<IndexMap<String, Value>, ExecutionError> {
            Err(ExecutionError::Unavailable("offline".into()))
        }

        async fn execute_board(&self, _request: ExecutionRequest) -> Result<EventStream, ExecutionError> {
            Err(ExecutionError::Status {
                status: 503,
                body: "busy".into(),
            })
        }
    }

    let runtime = SurfaceRuntime::builder("main")
        .app_id("shop")
        .backend(Arc::new(FailingBackend))
        .build();
    let outcome = runtime.dispatch(&submit(), "pay").await;
    assert!(matches!(outcome, ActionOutcome::Executed { run: None, .. }));
    assert_eq!(runtime.invoker().cache().peek("checkout-board", "main"), None);
}

/// Persistence whose reads wait until the gate opens.
struct GatedPersistence {
    inner: InMemoryPersistence,
    gate: Semaphore,
}

impl GatedPersistence {
    fn closed() -> Self {
        Self {
            inner: InMemoryPersistence::new(),
            gate: Semaphore::new(0),
        }
    }

    fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl StatePersistence for GatedPersistence {
    async fn get_all(&self, scope: &ScopeKey) -> Result<Map<String, Value>, PersistenceError> {
        drop(self.gate.acquire().await.expect("gate is never closed"));
        self.inner.get_all(scope).await
    }

    async fn set(&self, scope: &ScopeKey, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.inner.set(scope, key, value).await
    }

    async fn clear(&self, scope: &ScopeKey) -> Result<(), PersistenceError> {
        self.inner.clear(scope).await
    }
}

#[tokio::test]
async fn change_writes_its_bound_path_and_later_writes_win_over_a_pending_load() {
    let persistence = Arc::new(GatedPersistence::closed());
    let mut seeded = Map::new();
    seeded.insert("form".into(), json!({"name": "stale", "email": "ada@example.com"}));
    persistence.inner.seed(ScopeKey::page("shop", "/profile"), seeded);

    let runtime = SurfaceRuntime::builder("profile")
        .app_id("shop")
        .persistence(persistence.clone())
        .build();
    runtime.register_components([json!({"id": "name", "type": "textField", "value": {"path": "/form/name"}})]);
    let name = trellis_types::BoundValue::path("/form/name");

    tokio::join!(runtime.enter_page("/profile", "/profile"), async {
        tokio::task::yield_now().await;
        assert!(!runtime.store().is_page_loaded("/profile"));

        runtime.dispatch(&change(json!("hello")), "name").await;
        assert_eq!(runtime.resolve(&name, None), Some(json!("hello")));

        runtime.apply_server_message(ServerMessage::SetPageState(SetPageState {
            page_id: "/profile".into(),
            key: "form.name".into(),
            value: json!("world"),
        }));
        persistence.open();
    });

    assert!(runtime.store().is_page_loaded("/profile"));
    assert_eq!(runtime.resolve(&name, None), Some(json!("world")));
    assert_eq!(runtime.resolve(&trellis_types::BoundValue::path("form.email"), None), Some(json!("ada@example.com")));
    assert_eq!(runtime.dispatcher().ledger_snapshot().get("profile/name"), Some(&json!("hello")));

    runtime.store().flush().await;
    let persisted = persistence.inner.snapshot(&ScopeKey::page("shop", "/profile"));
    assert_eq!(persisted.get("form"), Some(&json!({"name": "world", "email": "ada@example.com"})));
}

#[tokio::test]
async fn change_on_an_unbound_component_leaves_state_alone() {
    let runtime = SurfaceRuntime::builder("main").build();
    runtime.enter_page("/home", "/home").await;
    runtime.register_components([
        json!({"id": "title", "type": "text", "value": {"literalString": "Hi"}}),
        json!({"id": "agree", "type": "checkbox", "checked": {"path": "terms.accepted"}}),
    ]);

    runtime.dispatch(&change(json!("typed")), "title").await;
    runtime.dispatch(&change(json!("typed")), "unregistered").await;
    runtime.dispatch(&change(json!(true)), "agree").await;

    assert_eq!(runtime.store().page_snapshot("/home").keys().collect::<Vec<_>>(), ["terms"]);
    assert_eq!(runtime.resolve(&trellis_types::BoundValue::path("terms.accepted"), None), Some(json!(true)));
}

#[tokio::test]
async fn page_and_dialog_surfaces_keep_separate_ledgers() {
    let page_backend = Arc::new(ScriptedBackend::default().emitting(&[]));
    let dialog_backend = Arc::new(ScriptedBackend::default().emitting(&[]));
    let page = SurfaceRuntime::builder("page")
        .app_id("shop")
        .backend(page_backend.clone())
        .build();
    let dialog = SurfaceRuntime::builder("dialog")
        .app_id("shop")
        .store(page.store().clone())
        .backend(dialog_backend.clone())
        .build();
    page.enter_page("/checkout", "/checkout").await;
    page.register_components([json!({"id": "email", "type": "textField", "value": {"path": "form.email"}})]);
    dialog.register_components([json!({"id": "confirm", "type": "checkbox", "checked": {"literalBool": false}})]);

    page.dispatch(&change(json!("ada@example.com")), "email").await;
    dialog.dispatch(&change(json!(true)), "confirm").await;

    assert_eq!(page.dispatcher().ledger_snapshot().keys().collect::<Vec<_>>(), ["page/email"]);
    assert_eq!(dialog.dispatcher().ledger_snapshot().keys().collect::<Vec<_>>(), ["dialog/confirm"]);

    dialog.dispatch(&submit(), "confirm").await;
    let dialog_input = dialog_backend.last_request().payload.payload;
    assert_eq!(dialog_input.elements.keys().collect::<Vec<_>>(), ["dialog/confirm"]);
    assert_eq!(dialog_input.elements["dialog/confirm"]["checked"], json!({"literalBool": true}));
    assert_eq!(dialog_input.page_state.get("form"), Some(&json!({"email": "ada@example.com"})));

    page.dispatch(&submit(), "email").await;
    let page_input = page_backend.last_request().payload.payload;
    assert_eq!(page_input.elements.keys().collect::<Vec<_>>(), ["page/email"]);
    assert_eq!(page_input.elements["page/email"]["value"], json!({"literalString": "ada@example.com"}));
    assert_eq!(dialog.dispatcher().ledger_snapshot().get("dialog/confirm"), Some(&json!(true)));
}
