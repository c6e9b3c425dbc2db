use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::detect::TechnologySignal;
use crate::capabilities::{CapabilityError, CapabilityState};
use crate::rubric::RubricAttribute;

/// One unit of a generation stream. A stream is `start`, any number of
/// `progress` events, then exactly one of `complete` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start,
    Progress(ProgressPayload),
    Complete {
        result: Value,
        /// Wall-clock milliseconds from `start` to `complete`.
        duration: u64,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub current: usize,
    pub total: usize,
    pub category: String,
    #[serde(flatten)]
    pub detail: ProgressDetail,
}

impl ProgressPayload {
    /// Progress for one capability state change, keyed by capability name.
    pub fn step(current: usize, total: usize, capability: &str, state: &CapabilityState) -> Self {
        let (output, error) = match state {
            CapabilityState::Loading => (None, None),
            CapabilityState::Ready { output } => (Some(output.clone()), None),
            CapabilityState::Failed { error } => (None, Some(error.clone())),
        };
        Self {
            current,
            total,
            category: capability.to_string(),
            detail: ProgressDetail::Step(StepUpdate {
                capability: capability.to_string(),
                status: state.status().to_string(),
                output,
                error,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressDetail {
    Attribute(RubricAttribute),
    Signal(TechnologySignal),
    Step(StepUpdate),
}

/// State change of one orchestrator step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub capability: String,
    /// `loading`, `ready` or `failed`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CapabilityError>,
}
