//! Orchestrator Loop: a bounded decision loop over the capability set.
//!
//! Idle → Deciding → (CapabilityInvoked → Deciding)* → Terminated
//!
//! The model picks one capability per turn; its terminal state (including
//! failures and unknown names) is appended to the transcript for the next
//! decision. The loop ends on a final answer or at the step ceiling, which is
//! a normal outcome rather than an error.

pub mod handlers;
pub mod memory;
pub mod policy;
pub mod prompts;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capabilities::compile::CompiledContext;
use crate::capabilities::detect::DetectStackOutput;
use crate::capabilities::{
    invoke, CapabilityError, CapabilityErrorKind, CapabilityKind, CapabilityRegistry,
    CapabilityState,
};
use crate::errors::GenerationError;
use crate::llm_client::{strip_json_fences, LanguageModel};
use crate::transport::{Emitter, ProgressDetail, ProgressPayload};
use memory::RunMemory;
use policy::{build_decision_prompt, parse_decision, Decision};
use prompts::{
    DECISION_SYSTEM, RESEARCH_FINAL_RULES, RESEARCH_FINAL_SHAPE, RESEARCH_GOAL,
    RESEARCH_SUGGESTED_ORDER, SCAFFOLD_FINAL_RULES, SCAFFOLD_FINAL_SHAPE, SCAFFOLD_GOAL,
    SCAFFOLD_SUGGESTED_ORDER,
};

/// Static description of one loop flavour.
#[derive(Debug)]
pub struct LoopConfig {
    pub name: &'static str,
    pub max_steps: usize,
    pub allowed: &'static [CapabilityKind],
    pub goal: &'static str,
    pub suggested_order: &'static str,
    pub final_answer_shape: &'static str,
    pub final_answer_rules: &'static str,
}

pub const COMPANY_RESEARCH: LoopConfig = LoopConfig {
    name: "company_research",
    max_steps: 8,
    allowed: &[
        CapabilityKind::FetchPage,
        CapabilityKind::DetectStack,
        CapabilityKind::WebSearch,
        CapabilityKind::CompileContext,
        CapabilityKind::Synthesize,
    ],
    goal: RESEARCH_GOAL,
    suggested_order: RESEARCH_SUGGESTED_ORDER,
    final_answer_shape: RESEARCH_FINAL_SHAPE,
    final_answer_rules: RESEARCH_FINAL_RULES,
};

pub const RUBRIC_SCAFFOLD: LoopConfig = LoopConfig {
    name: "rubric_scaffold",
    max_steps: 6,
    allowed: &[
        CapabilityKind::JobFitRubric,
        CapabilityKind::CompanyFitRubric,
        CapabilityKind::CompileContext,
    ],
    goal: SCAFFOLD_GOAL,
    suggested_order: SCAFFOLD_SUGGESTED_ORDER,
    final_answer_shape: SCAFFOLD_FINAL_SHAPE,
    final_answer_rules: SCAFFOLD_FINAL_RULES,
};

/// One completed step as it appears in the transcript and the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub capability: String,
    pub input: Value,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CapabilityError>,
}

/// Attribute outline pulled from a scaffold answer. Best effort only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldAttribute {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOutcome {
    pub answer: Value,
    pub steps: Vec<StepRecord>,
    pub compiled_context: Option<CompiledContext>,
    pub step_ceiling_reached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<ScaffoldAttribute>>,
}

/// Pulls `attributes` out of a final answer, whether it arrived as an object
/// or as JSON text.
pub fn parse_scaffold_attributes(answer: &Value) -> Option<Vec<ScaffoldAttribute>> {
    let parsed;
    let object = match answer {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(strip_json_fences(text)).ok()?;
            &parsed
        }
        other => other,
    };
    let attributes: Vec<ScaffoldAttribute> =
        serde_json::from_value(object.get("attributes")?.clone()).ok()?;
    (!attributes.is_empty()).then_some(attributes)
}

/// Everything a run borrows from the application.
pub struct Orchestrator<'a> {
    pub llm: &'a dyn LanguageModel,
    pub registry: &'a CapabilityRegistry,
    pub config: &'a LoopConfig,
}

impl Orchestrator<'_> {
    /// Runs the loop to completion. Only cancellation, a failed decision call
    /// or a closed stream end it early with an error.
    pub async fn run(
        &self,
        brief: &str,
        company_name: Option<String>,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, GenerationError> {
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut memory = RunMemory::new(company_name);
        let mut answer = None;

        info!("Starting {} loop (ceiling {})", self.config.name, self.config.max_steps);
        while steps.len() < self.config.max_steps {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            let prompt = build_decision_prompt(self.config, self.registry, brief, &steps);
            let reply = self.llm.complete(&prompt, DECISION_SYSTEM, cancel).await?;

            let (name, input) = match parse_decision(&reply) {
                Decision::Final { answer: final_answer } => {
                    answer = Some(final_answer);
                    break;
                }
                Decision::Capability { name, input } => (name, input),
            };

            let step = steps.len() + 1;
            let record = self.run_step(step, name, input, &mut memory, emitter, cancel).await?;
            steps.push(record);
        }

        let step_ceiling_reached = answer.is_none();
        if step_ceiling_reached {
            warn!(
                "{} loop hit its ceiling of {} steps",
                self.config.name, self.config.max_steps
            );
        }
        let answer = answer.unwrap_or_else(|| partial_answer(&memory));
        let attributes = if self.config.allowed.contains(&CapabilityKind::JobFitRubric) {
            parse_scaffold_attributes(&answer)
        } else {
            None
        };
        info!("{} loop finished after {} steps", self.config.name, steps.len());

        Ok(LoopOutcome {
            answer,
            compiled_context: memory.final_context(),
            steps,
            step_ceiling_reached,
            attributes,
        })
    }

    async fn run_step(
        &self,
        step: usize,
        name: String,
        input: Value,
        memory: &mut RunMemory,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) -> Result<StepRecord, GenerationError> {
        let capability = CapabilityKind::from_name(&name)
            .filter(|kind| self.config.allowed.contains(kind))
            .and_then(|kind| self.registry.get(kind));

        let Some(capability) = capability else {
            warn!("decision named unavailable capability '{name}'");
            let error = CapabilityError::new(
                CapabilityErrorKind::UnknownCapability,
                format!(
                    "'{name}' is not available here; choose one of: {}",
                    self.config
                        .allowed
                        .iter()
                        .map(|k| k.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
            self.emit_step(step, &name, &CapabilityState::Failed { error: error.clone() }, emitter)
                .await?;
            return Ok(StepRecord {
                step,
                capability: name,
                input,
                status: "failed".to_string(),
                output: None,
                error: Some(error),
            });
        };

        let kind = capability.kind();
        let input = memory.complete_input(kind, input);
        let mut states = invoke(capability.as_ref(), input.clone(), cancel);
        let mut terminal = CapabilityState::Loading;
        while let Some(state) = states.next().await {
            self.emit_step(step, kind.name(), &state, emitter).await?;
            terminal = state;
        }

        let (output, error) = match terminal {
            CapabilityState::Ready { output } => {
                memory.observe(kind, &output);
                if kind == CapabilityKind::DetectStack {
                    self.emit_signals(step, &output, emitter).await?;
                }
                (Some(output), None)
            }
            CapabilityState::Failed { error } => {
                warn!("step {step} {} failed: {}", kind.name(), error.message);
                (None, Some(error))
            }
            CapabilityState::Loading => (None, None),
        };
        Ok(StepRecord {
            step,
            capability: kind.name().to_string(),
            input,
            status: if error.is_some() { "failed" } else { "ready" }.to_string(),
            output,
            error,
        })
    }

    async fn emit_step(
        &self,
        step: usize,
        capability: &str,
        state: &CapabilityState,
        emitter: &Emitter,
    ) -> Result<(), GenerationError> {
        emitter
            .progress(ProgressPayload::step(
                step,
                self.config.max_steps,
                capability,
                state,
            ))
            .await
    }

    async fn emit_signals(
        &self,
        step: usize,
        output: &Value,
        emitter: &Emitter,
    ) -> Result<(), GenerationError> {
        let Ok(detection) = serde_json::from_value::<DetectStackOutput>(output.clone()) else {
            return Ok(());
        };
        for signal in detection.signals {
            emitter
                .progress(ProgressPayload {
                    current: step,
                    total: self.config.max_steps,
                    category: signal.category.as_str().to_string(),
                    detail: ProgressDetail::Signal(signal),
                })
                .await?;
        }
        Ok(())
    }
}

/// Best available answer when the ceiling cut the run short.
fn partial_answer(memory: &RunMemory) -> Value {
    if let Some(synthesis) = memory.synthesis() {
        return serde_json::to_value(synthesis).unwrap_or(Value::Null);
    }
    if let Some(compiled) = memory.compiled() {
        return Value::String(compiled.content_preview.clone());
    }
    Value::Null
}
