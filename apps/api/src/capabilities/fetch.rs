//! fetch_page: bounded fetch plus extraction and optional chunked summary.
//!
//! An HTTP error status is still a `ready` result: the status is reported and
//! whatever content the error page carried is extracted. Only transport
//! failures (DNS, refused connection, timeout) produce `failed`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::capabilities::extract::{
    chunk_text, extract_page, truncate_chars, ExtractionMethod, CHUNK_OVERLAP_CHARS,
    CHUNK_WINDOW_CHARS, MAX_TEXT_PREVIEW_CHARS,
};
use crate::capabilities::prompts::{SUMMARIZE_CHUNK_PROMPT_TEMPLATE, SUMMARIZE_CHUNK_SYSTEM};
use crate::capabilities::{
    parse_input, schema_of, until_cancelled, Capability, CapabilityError, CapabilityErrorKind,
    CapabilityKind, CapabilityResult,
};
use crate::llm_client::cache::ResponseCache;
use crate::llm_client::LanguageModel;

pub const MAX_PAGE_BYTES: usize = 120_000;
const MAX_SUMMARY_CHUNKS: usize = 3;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; HiringEngineBot/0.1)";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchPageInput {
    /// Absolute http(s) URL to fetch.
    pub url: String,
    /// Produce a prose summary of the extracted text.
    #[serde(default)]
    pub summarize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPageOutput {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<String>,
    pub text_preview: String,
    pub links: Vec<String>,
    pub summary: Option<String>,
    pub extraction: ExtractionMethod,
    pub bytes_read: usize,
    pub truncated: bool,
}

/// Raw body of a byte-capped fetch.
#[derive(Debug, Clone)]
pub struct CappedBody {
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub bytes_read: usize,
    pub truncated: bool,
}

/// Validates that `raw` is an absolute http(s) URL.
pub fn parse_http_url(raw: &str) -> Result<Url, CapabilityError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| CapabilityError::invalid_input(format!("invalid url '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CapabilityError::invalid_input(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }
    Ok(url)
}

/// GETs `url`, reading at most `max_bytes` of the body. Error statuses are
/// returned like any other response.
pub async fn fetch_capped(
    http: &reqwest::Client,
    url: &Url,
    max_bytes: usize,
    cancel: &CancellationToken,
) -> Result<CappedBody, CapabilityError> {
    until_cancelled(cancel, async {
        let response = http
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let mut buffer: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let room = max_bytes - buffer.len();
            if chunk.len() >= room {
                buffer.extend_from_slice(&chunk[..room]);
                truncated = chunk.len() > room || chunks.next().await.is_some();
                break;
            }
            buffer.extend_from_slice(&chunk);
        }

        debug!(
            "fetched {} ({} bytes, status {}, truncated={})",
            final_url,
            buffer.len(),
            status,
            truncated
        );

        Ok::<_, CapabilityError>(CappedBody {
            final_url,
            status,
            headers,
            bytes_read: buffer.len(),
            body: String::from_utf8_lossy(&buffer).into_owned(),
            truncated,
        })
    })
    .await
}

pub struct FetchPageCapability {
    http: reqwest::Client,
    llm: Arc<dyn LanguageModel>,
    cache: Arc<ResponseCache>,
}

impl FetchPageCapability {
    pub fn new(http: reqwest::Client, llm: Arc<dyn LanguageModel>, cache: Arc<ResponseCache>) -> Self {
        Self { http, llm, cache }
    }

    /// Summarizes the first few overlapping windows of `text`. A failed
    /// summary call drops the summary rather than failing the fetch.
    async fn summarize(&self, text: &str, cancel: &CancellationToken) -> Option<String> {
        let chunks = chunk_text(text, CHUNK_WINDOW_CHARS, CHUNK_OVERLAP_CHARS);
        let mut parts = Vec::new();
        for chunk in chunks.iter().take(MAX_SUMMARY_CHUNKS) {
            let prompt = SUMMARIZE_CHUNK_PROMPT_TEMPLATE.replace("{chunk}", chunk);
            match self
                .cache
                .complete_cached(self.llm.as_ref(), &prompt, SUMMARIZE_CHUNK_SYSTEM, cancel)
                .await
            {
                Ok(part) => parts.push(part.trim().to_string()),
                Err(e) => {
                    warn!("chunk summary failed, continuing without summary: {e}");
                    return None;
                }
            }
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[async_trait]
impl Capability for FetchPageCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::FetchPage
    }

    fn description(&self) -> &'static str {
        "Fetch a web page and extract its title, description, headings, readable text and links"
    }

    fn input_schema(&self) -> Value {
        schema_of::<FetchPageInput>()
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> CapabilityResult {
        let input: FetchPageInput = parse_input(input)?;
        let url = parse_http_url(&input.url)?;

        let fetched = fetch_capped(&self.http, &url, MAX_PAGE_BYTES, cancel).await?;
        let content_type = fetched
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let page = extract_page(&fetched.body, &fetched.final_url);
        let summary = if input.summarize && !page.text.is_empty() {
            self.summarize(&page.text, cancel).await
        } else {
            None
        };

        let output = FetchPageOutput {
            url: url.to_string(),
            final_url: fetched.final_url.to_string(),
            status: fetched.status,
            content_type,
            title: page.title,
            description: page.description,
            headings: page.headings,
            text_preview: truncate_chars(&page.text, MAX_TEXT_PREVIEW_CHARS),
            links: page.links,
            summary,
            extraction: page.method,
            bytes_read: fetched.bytes_read,
            truncated: fetched.truncated,
        };

        serde_json::to_value(output)
            .map_err(|e| CapabilityError::new(CapabilityErrorKind::Internal, e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{invoke, CapabilityState};
    use crate::llm_client::testing::ScriptedModel;

    fn capability(model: ScriptedModel) -> FetchPageCapability {
        FetchPageCapability::new(
            reqwest::Client::new(),
            Arc::new(model),
            Arc::new(ResponseCache::new()),
        )
    }

    fn ready_output(state: &CapabilityState) -> FetchPageOutput {
        match state {
            CapabilityState::Ready { output } => serde_json::from_value(output.clone()).unwrap(),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_loading_then_failed() {
        let cap = capability(ScriptedModel::new(Vec::<String>::new()));
        let cancel = CancellationToken::new();
        // Port 1 on loopback refuses connections.
        let states: Vec<_> = invoke(&cap, serde_json::json!({"url": "http://127.0.0.1:1/"}), &cancel)
            .collect()
            .await;

        assert_eq!(states.len(), 2);
        assert_eq!(states[0], CapabilityState::Loading);
        match &states[1] {
            CapabilityState::Failed { error } => assert_eq!(error.kind, CapabilityErrorKind::Network),
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_404_is_ready_with_status() {
        let addr = test_server::spawn().await;
        let cap = capability(ScriptedModel::new(Vec::<String>::new()));
        let cancel = CancellationToken::new();
        let states: Vec<_> = invoke(
            &cap,
            serde_json::json!({"url": format!("http://{addr}/missing")}),
            &cancel,
        )
        .collect()
        .await;

        assert_eq!(states.len(), 2);
        let output = ready_output(&states[1]);
        assert_eq!(output.status, 404);
        assert!(output.text_preview.len() < 40);
    }

    #[tokio::test]
    async fn test_fetch_extracts_and_summarizes() {
        let addr = test_server::spawn().await;
        let cap = capability(ScriptedModel::new(["Scheduling software for vets."]));
        let cancel = CancellationToken::new();
        let states: Vec<_> = invoke(
            &cap,
            serde_json::json!({"url": format!("http://{addr}/"), "summarize": true}),
            &cancel,
        )
        .collect()
        .await;

        let output = ready_output(&states[1]);
        assert_eq!(output.status, 200);
        assert_eq!(output.title.as_deref(), Some("Fixture Co"));
        assert_eq!(output.extraction, ExtractionMethod::Readable);
        assert!(output.text_preview.contains("veterinary clinics"));
        assert_eq!(output.links, vec![format!("http://{addr}/team")]);
        assert_eq!(output.summary.as_deref(), Some("Scheduling software for vets."));
    }

    #[tokio::test]
    async fn test_body_is_capped() {
        let addr = test_server::spawn().await;
        let url = Url::parse(&format!("http://{addr}/big")).unwrap();
        let body = fetch_capped(&reqwest::Client::new(), &url, MAX_PAGE_BYTES, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body.bytes_read, MAX_PAGE_BYTES);
        assert!(body.truncated);
    }

    #[tokio::test]
    async fn test_invalid_input_fails_without_network() {
        let cap = capability(ScriptedModel::new(Vec::<String>::new()));
        let cancel = CancellationToken::new();
        let state = crate::capabilities::invoke_to_completion(
            &cap,
            serde_json::json!({"url": "ftp://example.com/file"}),
            &cancel,
        )
        .await;
        assert!(matches!(
            state,
            CapabilityState::Failed { ref error } if error.kind == CapabilityErrorKind::InvalidInput
        ));
    }
}
