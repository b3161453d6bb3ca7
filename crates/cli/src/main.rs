mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis_engine::{ExecutionBackend, HttpExecutionBackend, NullExecutionBackend, SurfaceRuntime};
use trellis_types::InteractionMode;
use trellis_util::{JsonFilePersistence, RuntimeSettings, ScopeKey, StatePersistence, load_settings};

use crate::replay::{ConsoleHost, load_script, print_client_message, run_step};

const DEFAULT_SURFACE_ID: &str = "main";

#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Replay and inspect server-driven surface sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play a session script against a surface runtime
    Replay(ReplayArgs),
    /// Inspect or clear persisted state
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[derive(Debug, Args)]
struct ReplayArgs {
    /// Path to a YAML or JSON replay script
    script: PathBuf,
    #[arg(long)]
    app_id: Option<String>,
    #[arg(long)]
    state_dir: Option<PathBuf>,
    /// Execution backend base URL; boards run offline without one
    #[arg(long)]
    backend_url: Option<String>,
    /// live, preview, or static
    #[arg(long)]
    mode: Option<InteractionMode>,
    /// Board run by workflow events that do not name one
    #[arg(long)]
    board: Option<String>,
}

#[derive(Debug, Args)]
struct ScopeArgs {
    #[arg(long)]
    app_id: Option<String>,
    /// Page id; the application scope when omitted
    #[arg(long)]
    page: Option<String>,
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    Show(ScopeArgs),
    Clear(ScopeArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings().context("failed to load runtime settings")?;

    match cli.command {
        Command::Replay(args) => run_replay(args, &settings).await,
        Command::State { command } => run_state_command(command, &settings).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_replay(args: ReplayArgs, settings: &RuntimeSettings) -> Result<()> {
    let script = load_script(&args.script)?;
    let surface_id = script.surface_id.clone().unwrap_or_else(|| DEFAULT_SURFACE_ID.to_string());
    let state_dir = args.state_dir.unwrap_or_else(|| settings.resolved_state_dir());

    let backend: Arc<dyn ExecutionBackend> = match args.backend_url.or_else(|| settings.backend_url.clone()) {
        Some(url) => Arc::new(HttpExecutionBackend::new(&url, settings.backend_token()).context("invalid backend URL")?),
        None => Arc::new(NullExecutionBackend),
    };

    let mut builder = SurfaceRuntime::builder(surface_id.as_str())
        .mode(args.mode.unwrap_or(settings.interaction_mode))
        .persistence(Arc::new(JsonFilePersistence::new(&state_dir)))
        .backend(backend)
        .navigation_host(Arc::new(ConsoleHost))
        .action_handler(Arc::new(print_client_message))
        .passthrough_handler(Arc::new(|raw: &Value| println!("passthrough {raw}")));
    if let Some(app_id) = args.app_id.or_else(|| settings.app_id.clone()) {
        builder = builder.app_id(app_id);
    }
    if let Some(board) = args.board {
        builder = builder.default_board_id(board);
    }
    let runtime = builder.build();

    info!(surface_id = %surface_id, state_dir = %state_dir.display(), steps = script.steps.len(), "replaying session");
    runtime.start_session().await;
    runtime.register_components(script.components);
    for (index, step) in script.steps.into_iter().enumerate() {
        run_step(&runtime, step)
            .await
            .with_context(|| format!("replay step {} failed", index + 1))?;
    }
    runtime.store().flush().await;
    Ok(())
}

async fn run_state_command(command: StateCommand, settings: &RuntimeSettings) -> Result<()> {
    let (args, clear) = match command {
        StateCommand::Show(args) => (args, false),
        StateCommand::Clear(args) => (args, true),
    };
    let Some(app_id) = args.app_id.or_else(|| settings.app_id.clone()) else {
        bail!("an app id is required; pass --app-id or set appId in the runtime settings");
    };
    let state_dir = args.state_dir.unwrap_or_else(|| settings.resolved_state_dir());
    let persistence = JsonFilePersistence::new(&state_dir);
    let scope = match args.page {
        Some(page_id) => ScopeKey::page(app_id, page_id),
        None => ScopeKey::global(app_id),
    };

    if clear {
        persistence.clear(&scope).await?;
        println!("cleared {scope}");
    } else {
        let entries = persistence.get_all(&scope).await?;
        println!("{}", serde_json::to_string_pretty(&Value::Object(entries))?);
    }
    Ok(())
}
