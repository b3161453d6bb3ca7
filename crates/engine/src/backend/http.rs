use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use indexmap::IndexMap;
use reqwest::{Client, RequestBuilder, Response, header};
use serde_json::Value;
use tracing::{debug, info};
use trellis_types::ExecutionRequest;
use url::Url;

use super::sse::decode_event_stream;
use super::{EventStream, ExecutionBackend, ExecutionError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ELEMENTS_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend speaking HTTP to a board execution service.
///
/// - `GET  {base}/apps/{app_id}/board/{board_id}/elements?page_id=..&wildcard=..`
/// - `POST {base}/apps/{app_id}/board/{board_id}/invoke`, answered with a
///   Server-Sent Events stream of execution events
#[derive(Debug, Clone)]
pub struct HttpExecutionBackend {
    base_url: Url,
    http: Client,
    token: Option<String>,
}

impl HttpExecutionBackend {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ExecutionError> {
        let base_url = Url::parse(base_url.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(ExecutionError::Unavailable(format!("{base_url} cannot be used as a base URL")));
        }
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!("trellis/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url, http, token })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn board_endpoint(&self, app_id: &str, board_id: &str, action: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["apps", app_id, "board", board_id, action]);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, ExecutionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ExecutionError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    async fn get_execution_elements(
        &self,
        app_id: &str,
        board_id: &str,
        surface_id: &str,
        wildcard: bool,
    ) -> Result<IndexMap<String, Value>, ExecutionError> {
        let mut url = self.board_endpoint(app_id, board_id, "elements");
        url.query_pairs_mut()
            .append_pair("page_id", surface_id)
            .append_pair("wildcard", if wildcard { "true" } else { "false" });
        debug!(%url, "requesting execution elements");

        let request = self.authorize(self.http.get(url).timeout(ELEMENTS_TIMEOUT));
        let response = ensure_success(request.send().await?).await?;
        let elements: IndexMap<String, Value> = response.json().await?;
        info!(board_id = %board_id, surface_id = %surface_id, element_count = elements.len(), "execution elements fetched");
        Ok(elements)
    }

    async fn execute_board(&self, request: ExecutionRequest) -> Result<EventStream, ExecutionError> {
        let url = self.board_endpoint(&request.app_id, &request.board_id, "invoke");
        debug!(%url, start_node = %request.payload.id, "invoking board");

        let builder = self
            .http
            .post(url)
            .header(header::ACCEPT, "text/event-stream")
            .json(&request);
        let response = ensure_success(self.authorize(builder).send().await?).await?;
        Ok(decode_event_stream(response.bytes_stream().boxed()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_extend_the_base_path() {
        let backend = HttpExecutionBackend::new("https://flows.example.com/api/v1/", None).unwrap();
        assert_eq!(
            backend.board_endpoint("shop", "board 7", "invoke").as_str(),
            "https://flows.example.com/api/v1/apps/shop/board/board%207/invoke"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            HttpExecutionBackend::new("mailto:ops@example.com", None),
            Err(ExecutionError::Unavailable(_))
        ));
        assert!(matches!(HttpExecutionBackend::new("not a url", None), Err(ExecutionError::Url(_))));
    }
}
