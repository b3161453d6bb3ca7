use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;
use trellis_types::ExecutionRequest;

use super::{EventStream, ExecutionBackend, ExecutionError};

/// Backend for offline and static rendering: knows no elements and runs
/// every board as an empty stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExecutionBackend;

#[async_trait]
impl ExecutionBackend for NullExecutionBackend {
    async fn get_execution_elements(
        &self,
        _app_id: &str,
        _board_id: &str,
        _surface_id: &str,
        _wildcard: bool,
    ) -> Result<IndexMap<String, Value>, ExecutionError> {
        Ok(IndexMap::new())
    }

    async fn execute_board(&self, request: ExecutionRequest) -> Result<EventStream, ExecutionError> {
        debug!(board_id = %request.board_id, "null backend skipping board run");
        Ok(stream::empty().boxed())
    }
}
