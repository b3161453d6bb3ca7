//! Session replay scripts.
//!
//! A script lists component descriptors and a sequence of steps played
//! against one surface runtime:
//!
//! ```yaml
//! surfaceId: checkout
//! components:
//!   - { id: email, type: textField, value: { path: /form/email } }
//! steps:
//!   - { kind: enter_page, pageId: /checkout }
//!   - { kind: action, componentId: email, name: change, context: { value: ada@example.com } }
//!   - { kind: server, message: { type: setGlobalState, key: cart.count, value: 2 } }
//!   - { kind: resolve, binding: { path: cart.count } }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use trellis_engine::{ActionOutcome, NavigateOptions, NavigationHost, SurfaceRuntime};
use trellis_types::{Action, BoundValue, ClientMessage, ServerMessage};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayScript {
    #[serde(default)]
    pub surface_id: Option<String>,
    #[serde(default)]
    pub components: Vec<Value>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayStep {
    #[serde(rename_all = "camelCase")]
    EnterPage { page_id: String, route: Option<String> },
    Server { message: Value },
    #[serde(rename_all = "camelCase")]
    Action {
        component_id: String,
        name: String,
        #[serde(default)]
        context: Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Resolve { binding: BoundValue, component_id: Option<String> },
}

/// Reads a script; `.json` files are parsed as JSON, anything else as YAML.
pub fn load_script(path: &Path) -> Result<ReplayScript> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let script = if is_json {
        serde_json::from_str(&content).with_context(|| format!("invalid replay script {}", path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid replay script {}", path.display()))?
    };
    Ok(script)
}

pub async fn run_step(runtime: &SurfaceRuntime, step: ReplayStep) -> Result<()> {
    match step {
        ReplayStep::EnterPage { page_id, route } => {
            runtime.enter_page(&page_id, route.as_deref().unwrap_or(&page_id)).await;
            println!("page {page_id}");
        }
        ReplayStep::Server { message } => {
            let message = ServerMessage::from_value(message).context("malformed server message")?;
            let kind = message.kind().to_string();
            let outcome = runtime.apply_server_message(message);
            println!("server {kind} -> {outcome:?}");
        }
        ReplayStep::Action {
            component_id,
            name,
            context,
        } => {
            let action = Action { name, context };
            match runtime.dispatch(&action, &component_id).await {
                ActionOutcome::Forwarded(_) => {}
                ActionOutcome::Executed { run: Some(run), .. } => {
                    println!("run {}", serde_json::to_string(&run)?);
                }
                ActionOutcome::Executed { run: None, .. } => println!("run failed"),
            }
        }
        ReplayStep::Resolve { binding, component_id } => {
            let label = binding.as_path().map(str::to_owned).unwrap_or_else(|| "literal".to_string());
            match runtime.resolve(&binding, component_id.as_deref()) {
                Some(value) => println!("{label} = {value}"),
                None => println!("{label} is unresolved"),
            }
        }
    }
    Ok(())
}

/// Prints every client message the surface emits.
pub fn print_client_message(message: &ClientMessage) {
    match serde_json::to_string(message) {
        Ok(encoded) => println!("client {encoded}"),
        Err(error) => tracing::warn!(error = %error, "failed to encode client message"),
    }
}

/// Navigation host that reports instead of navigating.
pub struct ConsoleHost;

impl NavigationHost for ConsoleHost {
    fn navigate(&self, url: &str, options: NavigateOptions) {
        println!("navigate {url} (replace: {}, shallow: {})", options.replace, options.shallow);
    }

    fn open_dialog(&self, route: &str, title: Option<&str>, query_params: Option<&IndexMap<String, String>>, dialog_id: Option<&str>) {
        let params = query_params.map(|params| params.len()).unwrap_or(0);
        println!(
            "open dialog {route} (title: {}, id: {}, params: {params})",
            title.unwrap_or("-"),
            dialog_id.unwrap_or("-")
        );
    }

    fn close_dialog(&self, dialog_id: Option<&str>) {
        println!("close dialog {}", dialog_id.unwrap_or("-"));
    }
}
