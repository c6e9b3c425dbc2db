use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::capabilities::CapabilityRegistry;
use crate::config::Config;
use crate::llm_client::cache::ResponseCache;
use crate::llm_client::LanguageModel;
use crate::predictions::PredictionClient;
use crate::rate_limit::RateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LanguageModel>,
    pub capabilities: Arc<CapabilityRegistry>,
    /// Shared with the capabilities that cache model replies; exposed for clearing.
    pub cache: Arc<ResponseCache>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub artifacts: Arc<dyn ArtifactStore>,
    /// `None` when no prediction endpoint is configured.
    pub predictions: Option<Arc<PredictionClient>>,
    pub config: Config,
}

#[cfg(test)]
pub mod testing {
    use std::time::Duration;

    use super::*;
    use crate::artifacts::testing::RecordingStore;
    use crate::llm_client::testing::ScriptedModel;
    use crate::rate_limit::InMemoryRateLimiter;

    /// State wired to a scripted model, an in-process limiter and a recording
    /// artifact store.
    pub struct TestState {
        pub state: AppState,
        pub llm: Arc<ScriptedModel>,
        pub artifacts: Arc<RecordingStore>,
    }

    pub fn build(llm: ScriptedModel, registry: CapabilityRegistry, max_requests: u32) -> TestState {
        let config = Config::for_tests();
        let llm = Arc::new(llm);
        let artifacts = Arc::new(RecordingStore::default());
        let state = AppState {
            llm: llm.clone(),
            capabilities: Arc::new(registry),
            cache: Arc::new(ResponseCache::new()),
            rate_limiter: Arc::new(InMemoryRateLimiter::new(
                max_requests,
                Duration::from_secs(config.rate_limit_window_secs),
            )),
            artifacts: artifacts.clone(),
            predictions: None,
            config,
        };
        TestState {
            state,
            llm,
            artifacts,
        }
    }
}
