//! Response cache for repeatable LLM calls (page-chunk summaries).
//!
//! Lifecycle: one `ResponseCache` is built in `main`, shared through
//! `AppState`, and emptied on demand via `DELETE /api/v1/cache`. Nothing is
//! kept in module-level statics.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm_client::{LanguageModel, LlmError};

const DEFAULT_MAX_ENTRIES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    system: String,
    prompt: String,
}

pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, String>>,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Once `max_entries` is reached new responses are served but not stored.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub async fn get(&self, prompt: &str, system: &str) -> Option<String> {
        let key = CacheKey {
            system: system.to_string(),
            prompt: prompt.to_string(),
        };
        self.entries.read().await.get(&key).cloned()
    }

    pub async fn insert(&self, prompt: &str, system: &str, response: String) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            return;
        }
        entries.insert(
            CacheKey {
                system: system.to_string(),
                prompt: prompt.to_string(),
            },
            response,
        );
    }

    /// Returns the number of entries that were dropped.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Serves from the cache, falling back to `llm` and remembering the reply.
    pub async fn complete_cached(
        &self,
        llm: &dyn LanguageModel,
        prompt: &str,
        system: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if let Some(hit) = self.get(prompt, system).await {
            debug!("response cache hit ({} chars)", hit.len());
            return Ok(hit);
        }
        let response = llm.complete(prompt, system, cancel).await?;
        self.insert(prompt, system, response.clone()).await;
        Ok(response)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
