//! Fixed-window rate limiting keyed by client address.
//!
//! Consulted before any generation run opens; a rejected request never
//! reaches a capability. Redis backs the counters when configured, otherwise
//! an in-process map does.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use redis::aio::MultiplexedConnection;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::state::AppState;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window closes.
    pub reset: u64,
}

impl RateLimitDecision {
    fn allow_unmetered(limit: u32, window: Duration) -> Self {
        Self {
            success: true,
            limit,
            remaining: limit,
            reset: window.as_secs(),
        }
    }

    fn from_count(count: u64, limit: u32, reset: u64) -> Self {
        Self {
            success: count <= limit as u64,
            limit,
            remaining: (limit as u64).saturating_sub(count) as u32,
            reset: reset.max(1),
        }
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset));
        headers
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateLimitDecision;
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// INCR + EXPIRE on a per-window key. Redis failures let the request through.
pub struct RedisRateLimiter {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    max_requests: u32,
    window: Duration,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client, max_requests: u32, window: Duration) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
            max_requests,
            window,
        }
    }

    async fn count(&self, key: &str, window_secs: u64, now_secs: u64) -> redis::RedisResult<u64> {
        let mut conn = self
            .connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?
            .clone();
        let bucket_key = format!("ratelimit:{key}:{}", now_secs / window_secs);
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&bucket_key, 1)
            .expire(&bucket_key, window_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        let window_secs = self.window.as_secs().max(1);
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        match self.count(key, window_secs, now_secs).await {
            Ok(count) => RateLimitDecision::from_count(
                count,
                self.max_requests,
                window_secs - now_secs % window_secs,
            ),
            Err(e) => {
                warn!("rate limiter unavailable, allowing request: {e}");
                RateLimitDecision::allow_unmetered(self.max_requests, self.window)
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process fallback
// ────────────────────────────────────────────────────────────────────────────

struct Window {
    started: Instant,
    count: u64,
}

pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    max_requests: u32,
    window: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started) < self.window);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        window.count += 1;
        let remaining = self.window.saturating_sub(now.duration_since(window.started));
        RateLimitDecision::from_count(
            window.count,
            self.max_requests,
            remaining.as_secs_f64().ceil() as u64,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Middleware
// ────────────────────────────────────────────────────────────────────────────

/// Client identity: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = client_key(request.headers(), peer);
    let decision = state.rate_limiter.check(&key).await;

    let mut response = if decision.success {
        debug!("rate limit ok for {key}: {} remaining", decision.remaining);
        next.run(request).await
    } else {
        warn!("rate limit exceeded for {key}");
        AppError::RateLimited {
            retry_after_secs: decision.reset,
        }
        .into_response()
    };
    response.headers_mut().extend(decision.headers());
    response
}
