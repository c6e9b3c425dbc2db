//! Hand-off of finished artifacts (rubrics, compiled company contexts).
//!
//! The payload is opaque JSON; readers of `generation_artifacts` own its
//! interpretation. A failed save is logged and never fails the stream that
//! produced the artifact.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Rubric,
    RubricScaffold,
    CompanyContext,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Rubric => "rubric",
            ArtifactKind::RubricScaffold => "rubric_scaffold",
            ArtifactKind::CompanyContext => "company_context",
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, kind: ArtifactKind, payload: &Value) -> anyhow::Result<Uuid>;
}

/// Stores artifacts as JSONB rows.
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn save(&self, kind: ArtifactKind, payload: &Value) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO generation_artifacts (id, kind, payload, created_at) VALUES ($1, $2, $3, NOW())",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }
}

/// Used when no database is configured: records that an artifact was produced.
pub struct LogArtifactStore;

#[async_trait]
impl ArtifactStore for LogArtifactStore {
    async fn save(&self, kind: ArtifactKind, payload: &Value) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        info!(
            "artifact {id} ({}) produced, {} bytes, not persisted",
            kind.as_str(),
            payload.to_string().len()
        );
        Ok(id)
    }
}

/// Saves `payload`, logging instead of failing.
pub async fn persist(store: &dyn ArtifactStore, kind: ArtifactKind, payload: &Value) {
    if let Err(e) = store.save(kind, payload).await {
        warn!("failed to store {} artifact: {e:#}", kind.as_str());
    }
}
