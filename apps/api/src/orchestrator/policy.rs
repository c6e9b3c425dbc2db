//! Decision policy: prompt assembly and parsing of the model's next move.

use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::extract::truncate_chars;
use crate::capabilities::CapabilityRegistry;
use crate::llm_client::strip_json_fences;
use crate::orchestrator::prompts::DECISION_PROMPT_TEMPLATE;
use crate::orchestrator::{LoopConfig, StepRecord};

/// Per-step output budget inside the transcript.
const MAX_TRANSCRIPT_OUTPUT_CHARS: usize = 1500;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Capability {
        name: String,
        #[serde(default)]
        input: Value,
    },
    Final {
        answer: Value,
    },
}

/// Reads a decision out of a model reply. Anything that is not a recognizable
/// decision object is taken as the final answer text.
pub fn parse_decision(reply: &str) -> Decision {
    let stripped = strip_json_fences(reply);
    if let Ok(decision) = serde_json::from_str::<Decision>(stripped) {
        return decision;
    }
    if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
        if start < end {
            if let Ok(decision) = serde_json::from_str::<Decision>(&stripped[start..=end]) {
                return decision;
            }
        }
    }
    Decision::Final {
        answer: Value::String(reply.trim().to_string()),
    }
}

fn render_step(step: &StepRecord) -> String {
    let input = serde_json::to_string(&step.input).unwrap_or_default();
    let result = match (&step.output, &step.error) {
        (_, Some(error)) => format!("FAILED ({:?}): {}", error.kind, error.message),
        (Some(output), None) => truncate_chars(
            &serde_json::to_string(output).unwrap_or_default(),
            MAX_TRANSCRIPT_OUTPUT_CHARS,
        ),
        (None, None) => "(no output)".to_string(),
    };
    format!(
        "{}. {} input={}\n   result: {}",
        step.step, step.capability, input, result
    )
}

pub fn build_decision_prompt(
    config: &LoopConfig,
    registry: &CapabilityRegistry,
    brief: &str,
    steps: &[StepRecord],
) -> String {
    let transcript = if steps.is_empty() {
        "(none)".to_string()
    } else {
        steps.iter().map(render_step).collect::<Vec<_>>().join("\n")
    };
    DECISION_PROMPT_TEMPLATE
        .replace("{goal}", config.goal)
        .replace("{brief}", brief)
        .replace("{capabilities}", &registry.describe(config.allowed))
        .replace("{suggested_order}", config.suggested_order)
        .replace("{steps_used}", &steps.len().to_string())
        .replace("{max_steps}", &config.max_steps.to_string())
        .replace("{transcript}", &transcript)
        .replace("{final_answer_shape}", config.final_answer_shape)
        .replace("{final_answer_rules}", config.final_answer_rules)
}
