//! job_fit_rubric / company_fit_rubric: scaffold acknowledgments.
//!
//! These do no work of their own: they validate and echo the outline the
//! decision policy proposes so it lands in the transcript as a structured step.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capabilities::{
    parse_input, schema_of, Capability, CapabilityError, CapabilityErrorKind, CapabilityKind,
    CapabilityResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaffoldKind {
    JobFit,
    CompanyFit,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaffoldInput {
    /// Role title (job fit) or company name (company fit).
    pub subject: String,
    /// Proposed attribute names, in order.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldAck {
    pub acknowledged: bool,
    pub rubric: ScaffoldKind,
    pub input: ScaffoldInput,
}

pub struct RubricScaffoldCapability {
    kind: ScaffoldKind,
}

impl RubricScaffoldCapability {
    pub fn new(kind: ScaffoldKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Capability for RubricScaffoldCapability {
    fn kind(&self) -> CapabilityKind {
        match self.kind {
            ScaffoldKind::JobFit => CapabilityKind::JobFitRubric,
            ScaffoldKind::CompanyFit => CapabilityKind::CompanyFitRubric,
        }
    }

    fn description(&self) -> &'static str {
        match self.kind {
            ScaffoldKind::JobFit => {
                "Record a job-fit rubric outline (role plus proposed knowledge/skill/ability attributes)"
            }
            ScaffoldKind::CompanyFit => {
                "Record a company-fit rubric outline (company plus proposed culture and value attributes)"
            }
        }
    }

    fn input_schema(&self) -> Value {
        schema_of::<ScaffoldInput>()
    }

    async fn execute(&self, input: Value, _cancel: &CancellationToken) -> CapabilityResult {
        let input: ScaffoldInput = parse_input(input)?;
        if input.subject.trim().is_empty() {
            return Err(CapabilityError::invalid_input("subject cannot be empty"));
        }
        serde_json::to_value(ScaffoldAck {
            acknowledged: true,
            rubric: self.kind,
            input,
        })
        .map_err(|e| CapabilityError::new(CapabilityErrorKind::Internal, e.to_string()))
    }
}
