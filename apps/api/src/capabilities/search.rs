//! web_search: single-attempt call to a hosted search API (Tavily request shape).

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capabilities::{
    parse_input, schema_of, until_cancelled, Capability, CapabilityError, CapabilityErrorKind,
    CapabilityKind, CapabilityResult,
};

const DEFAULT_MAX_RESULTS: u8 = 5;
const MAX_RESULTS_CEILING: u8 = 10;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchInput {
    pub query: String,
    /// 1-10, defaults to 5.
    #[serde(default)]
    pub max_results: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchOutput {
    pub query: String,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u8,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

pub struct WebSearchCapability {
    http: reqwest::Client,
    config: SearchConfig,
}

impl WebSearchCapability {
    pub fn new(http: reqwest::Client, config: SearchConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl Capability for WebSearchCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::WebSearch
    }

    fn description(&self) -> &'static str {
        "Search the web for recent information about a company (news, funding, products)"
    }

    fn input_schema(&self) -> Value {
        schema_of::<WebSearchInput>()
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> CapabilityResult {
        let input: WebSearchInput = parse_input(input)?;
        let query = input.query.trim();
        if query.is_empty() {
            return Err(CapabilityError::invalid_input("query cannot be empty"));
        }
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(CapabilityError::new(
                CapabilityErrorKind::Configuration,
                "web search is not configured (SEARCH_API_KEY is unset)",
            ));
        };
        let max_results = input
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CEILING);

        let request = SearchRequest {
            api_key,
            query,
            max_results,
        };
        let response = until_cancelled(cancel, async {
            Ok::<_, CapabilityError>(self
                .http
                .post(&self.config.api_url)
                .json(&request)
                .send()
                .await?)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::new(
                CapabilityErrorKind::Upstream,
                format!("search API returned {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = until_cancelled(cancel, async {
            response.json().await.map_err(|e| {
                CapabilityError::new(CapabilityErrorKind::Upstream, format!("bad search response: {e}"))
            })
        })
        .await?;
        debug!("web search for '{query}' returned {} results", parsed.results.len());

        let output = WebSearchOutput {
            query: query.to_string(),
            results: parsed.results.into_iter().take(max_results as usize).collect(),
        };
        serde_json::to_value(output)
            .map_err(|e| CapabilityError::new(CapabilityErrorKind::Internal, e.to_string()))
    }
}
