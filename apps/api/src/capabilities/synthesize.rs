//! synthesize: blends page text, detected stack and search results into a
//! short bulleted company briefing with one LLM call.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capabilities::detect::{StackBreakdown, TechnologySignal};
use crate::capabilities::extract::truncate_chars;
use crate::capabilities::prompts::{SYNTHESIZE_PROMPT_TEMPLATE, SYNTHESIZE_SYSTEM};
use crate::capabilities::search::SearchHit;
use crate::capabilities::{
    parse_input, schema_of, Capability, CapabilityError, CapabilityErrorKind, CapabilityKind,
    CapabilityResult,
};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::LanguageModel;

pub const MIN_BULLETS: usize = 5;
pub const MAX_BULLETS: usize = 7;
const MAX_SOURCE_TEXT_CHARS: usize = 6000;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeInput {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Extracted page text or a compiled content preview.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub stack: Option<StackBreakdown>,
    #[serde(default)]
    pub signals: Option<Vec<TechnologySignal>>,
    #[serde(default)]
    pub search_results: Option<Vec<SearchHit>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeOutput {
    pub summary: String,
    pub bullets: Vec<String>,
}

/// Pulls `- ` / `* ` / `•` prefixed lines out of a model reply.
pub fn parse_bullets(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix('•'))
        })
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .take(MAX_BULLETS)
        .collect()
}

fn render_stack(stack: &StackBreakdown) -> String {
    if stack.is_empty() {
        return "(nothing detected)".to_string();
    }
    stack
        .iter()
        .map(|(category, names)| format!("{}: {}", category.as_str(), names.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_signals(signals: &[TechnologySignal]) -> String {
    if signals.is_empty() {
        return "(none)".to_string();
    }
    signals
        .iter()
        .map(|s| format!("- {} ({})", s.technology, s.evidence))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_search(results: &[SearchHit]) -> String {
    if results.is_empty() {
        return "(no search performed)".to_string();
    }
    results
        .iter()
        .map(|r| format!("- {} <{}>: {}", r.title, r.url, truncate_chars(&r.content, 400)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(input: &SynthesizeInput) -> String {
    let company = input
        .company_name
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("the company");
    SYNTHESIZE_PROMPT_TEMPLATE
        .replace("{company}", company)
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{url}", input.url.as_deref().unwrap_or("(unknown)"))
        .replace(
            "{text}",
            &truncate_chars(input.text.as_deref().unwrap_or(""), MAX_SOURCE_TEXT_CHARS),
        )
        .replace("{stack}", &render_stack(&input.stack.clone().unwrap_or_default()))
        .replace("{signals}", &render_signals(input.signals.as_deref().unwrap_or(&[])))
        .replace(
            "{search_results}",
            &render_search(input.search_results.as_deref().unwrap_or(&[])),
        )
}

pub struct SynthesizeCapability {
    llm: Arc<dyn LanguageModel>,
}

impl SynthesizeCapability {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Capability for SynthesizeCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Synthesize
    }

    fn description(&self) -> &'static str {
        "Write a 5-7 bullet company briefing from page text, detected stack, signals and search results"
    }

    fn input_schema(&self) -> Value {
        schema_of::<SynthesizeInput>()
    }

    async fn execute(&self, input: Value, cancel: &CancellationToken) -> CapabilityResult {
        let input: SynthesizeInput = parse_input(input)?;
        let has_material = input.text.as_deref().is_some_and(|t| !t.trim().is_empty())
            || input.stack.as_ref().is_some_and(|s| !s.is_empty())
            || input.search_results.as_ref().is_some_and(|r| !r.is_empty());
        if !has_material {
            return Err(CapabilityError::invalid_input(
                "synthesize needs text, stack or searchResults",
            ));
        }

        let reply = self
            .llm
            .complete(&build_prompt(&input), SYNTHESIZE_SYSTEM, cancel)
            .await?;
        let bullets = parse_bullets(&reply);
        if bullets.len() < MIN_BULLETS {
            return Err(CapabilityError::new(
                CapabilityErrorKind::Upstream,
                format!(
                    "model reply had {} bullet points, expected {MIN_BULLETS} to {MAX_BULLETS}",
                    bullets.len()
                ),
            ));
        }

        let output = SynthesizeOutput {
            summary: bullets
                .iter()
                .map(|b| format!("- {b}"))
                .collect::<Vec<_>>()
                .join("\n"),
            bullets,
        };
        serde_json::to_value(output)
            .map_err(|e| CapabilityError::new(CapabilityErrorKind::Internal, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::detect::TechCategory;
    use crate::capabilities::{invoke_to_completion, CapabilityState};
    use crate::llm_client::testing::ScriptedModel;

    #[test]
    fn test_parse_bullets_caps_at_seven() {
        let reply = "Here you go:\n- one\n* two\n• three\n- four\n- five\n- six\n- seven\n- eight\nthanks";
        let bullets = parse_bullets(reply);
        assert_eq!(bullets.len(), MAX_BULLETS);
        assert_eq!(bullets[0], "one");
        assert_eq!(bullets[2], "three");
    }

    #[test]
    fn test_prompt_includes_stack_and_search() {
        let input = SynthesizeInput {
            company_name: Some("Acme".into()),
            stack: Some(
                [(TechCategory::Languages, vec!["Rust".to_string()])]
                    .into_iter()
                    .collect(),
            ),
            search_results: Some(vec![SearchHit {
                title: "Acme raises Series B".into(),
                url: "https://news.example/acme".into(),
                content: "Acme raised $40M.".into(),
            }]),
            ..Default::default()
        };
        let prompt = build_prompt(&input);
        assert!(prompt.contains("briefing for Acme"));
        assert!(prompt.contains("languages: Rust"));
        assert!(prompt.contains("Acme raises Series B"));
        assert!(!prompt.contains("{search_results}"));
    }

    #[tokio::test]
    async fn test_synthesize_returns_bullets() {
        let model = ScriptedModel::new([
            "- Acme makes robots\n- Stack: React and Rust\n- 40 staff\n- Based in Leeds\n- Series B",
        ]);
        let cap = SynthesizeCapability::new(Arc::new(model));
        let state = invoke_to_completion(
            &cap,
            serde_json::json!({"companyName": "Acme", "text": "Acme makes robots."}),
            &CancellationToken::new(),
        )
        .await;
        match state {
            CapabilityState::Ready { output } => {
                assert_eq!(output["bullets"].as_array().unwrap().len(), 5);
                assert!(output["summary"].as_str().unwrap().starts_with("- Acme"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_short_summary_is_rejected() {
        let model = ScriptedModel::new(["- Acme makes robots\n- Based in Leeds"]);
        let cap = SynthesizeCapability::new(Arc::new(model));
        let state = invoke_to_completion(
            &cap,
            serde_json::json!({"companyName": "Acme", "text": "Acme makes robots."}),
            &CancellationToken::new(),
        )
        .await;
        match state {
            CapabilityState::Failed { error } => {
                assert_eq!(error.kind, CapabilityErrorKind::Upstream);
                assert!(error.message.contains("had 2 bullet points"));
            }
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_synthesize_without_material_is_invalid() {
        let cap = SynthesizeCapability::new(Arc::new(ScriptedModel::new(Vec::<String>::new())));
        let state =
            invoke_to_completion(&cap, serde_json::json!({}), &CancellationToken::new()).await;
        assert!(matches!(
            state,
            CapabilityState::Failed { ref error } if error.kind == CapabilityErrorKind::InvalidInput
        ));
    }
}
