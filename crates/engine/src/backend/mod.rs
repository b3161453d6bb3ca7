//! Execution backend contract and implementations.
//!
//! A backend answers two questions for the runtime: which elements a board
//! needs from a surface, and what happens when the board runs. Runs produce
//! an ordered, asynchronous stream of [`ExecutionEvent`]s.

mod http;
mod null;
mod sse;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use trellis_types::{ExecutionEvent, ExecutionRequest};

pub use http::HttpExecutionBackend;
pub use null::NullExecutionBackend;

/// Ordered events of one board run.
pub type EventStream = BoxStream<'static, Result<ExecutionEvent, ExecutionError>>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("execution backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid execution backend URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("execution event decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("execution backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Elements of `surface_id` the board reads, keyed by element address
    /// (`"{surface_id}/{component_id}"`). With `wildcard` set the backend
    /// returns every element it knows of.
    async fn get_execution_elements(
        &self,
        app_id: &str,
        board_id: &str,
        surface_id: &str,
        wildcard: bool,
    ) -> Result<IndexMap<String, Value>, ExecutionError>;

    /// Starts a board run and returns its event stream.
    async fn execute_board(&self, request: ExecutionRequest) -> Result<EventStream, ExecutionError>;
}
