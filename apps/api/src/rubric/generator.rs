//! Progressive rubric generation.
//!
//! K/S/A attributes are produced one model call at a time and streamed as
//! they arrive. VALUE attributes are derived from the culture values without a
//! model call. Weights change exactly twice after creation: the K/S/A rescale
//! that makes room for values, then the final normalization.

use std::time::Instant;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::GenerationError;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{complete_json, LanguageModel};
use crate::models::{CompanyContext, GenerationRequest};
use crate::rubric::prompts::{
    ABILITY_GUIDANCE, ATTRIBUTE_PROMPT_TEMPLATE, KNOWLEDGE_GUIDANCE, SKILL_GUIDANCE,
};
use crate::rubric::weights::{
    category_style, clamp_ksa_weight, normalize, rescale, round1, total_weight, value_style,
    value_weight_total, weight_per_value,
};
use crate::rubric::{AttributeCategory, GeneratedRubric, RubricAttribute, SubAttribute};
use crate::transport::{Emitter, ProgressDetail, ProgressPayload};

pub const KSA_TARGET_WITH_VALUES: usize = 4;
pub const KSA_TARGET_WITHOUT_VALUES: usize = 6;
const MAX_SUB_ATTRIBUTES: usize = 3;
const DEFAULT_PROVISIONAL_WEIGHT: f64 = 15.0;

/// Everything the generator needs from a request.
#[derive(Debug, Clone, Default)]
pub struct RubricBrief {
    pub role: Option<String>,
    pub brief: String,
    pub context: CompanyContext,
    pub requested: Vec<String>,
}

impl From<&GenerationRequest> for RubricBrief {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            role: request.role().map(str::to_string),
            brief: request.brief(),
            context: request.context(),
            requested: request.requested_attributes().to_vec(),
        }
    }
}

impl RubricBrief {
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.brief.trim().is_empty()
    }
}

/// Shape of one model-produced attribute.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftAttribute {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    sub_attributes: Vec<SubAttribute>,
}

pub fn ksa_target(has_values: bool) -> usize {
    if has_values {
        KSA_TARGET_WITH_VALUES
    } else {
        KSA_TARGET_WITHOUT_VALUES
    }
}

/// Round-robin category assignment, at most `ceil(target / 3)` slots each.
/// 4 → K,S,A,K; 6 → K,S,A,K,S,A.
pub fn plan_slots(target: usize) -> Vec<AttributeCategory> {
    let cap = target.div_ceil(AttributeCategory::KSA.len());
    let mut counts = [0usize; 3];
    let mut slots = Vec::with_capacity(target);
    let mut i = 0;
    while slots.len() < target {
        let idx = i % AttributeCategory::KSA.len();
        if counts[idx] < cap {
            counts[idx] += 1;
            slots.push(AttributeCategory::KSA[idx]);
        }
        i += 1;
    }
    slots
}

fn guidance(category: AttributeCategory) -> &'static str {
    match category {
        AttributeCategory::Knowledge => KNOWLEDGE_GUIDANCE,
        AttributeCategory::Skill => SKILL_GUIDANCE,
        AttributeCategory::Ability | AttributeCategory::Value => ABILITY_GUIDANCE,
    }
}

pub fn build_attribute_prompt(
    brief: &RubricBrief,
    category: AttributeCategory,
    existing: &[RubricAttribute],
) -> String {
    let existing = if existing.is_empty() {
        "(none yet)".to_string()
    } else {
        existing
            .iter()
            .map(|a| format!("- {} ({})", a.name, a.category.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let requested = if brief.requested.is_empty() {
        "(none)".to_string()
    } else {
        brief.requested.join(", ")
    };
    ATTRIBUTE_PROMPT_TEMPLATE
        .replace("{role}", brief.role.as_deref().unwrap_or("(see request)"))
        .replace("{brief}", &brief.brief)
        .replace("{context}", &brief.context.describe())
        .replace("{category_guidance}", guidance(category))
        .replace("{category}", category.as_str())
        .replace("{existing}", &existing)
        .replace("{requested}", &requested)
}

fn into_attribute(
    draft: DraftAttribute,
    category: AttributeCategory,
) -> Result<RubricAttribute, GenerationError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(GenerationError::InvalidOutput(format!(
            "{} attribute has no name",
            category.as_str()
        )));
    }
    let (icon, color) = category_style(category);
    let mut sub_attributes = draft.sub_attributes;
    sub_attributes.truncate(MAX_SUB_ATTRIBUTES);
    Ok(RubricAttribute {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: draft.description.trim().to_string(),
        category,
        icon: icon.to_string(),
        color: color.to_string(),
        weight: round1(clamp_ksa_weight(
            draft.weight.unwrap_or(DEFAULT_PROVISIONAL_WEIGHT),
        )),
        sub_attributes,
    })
}

/// VALUE attributes for `values`, styled by position.
pub fn derive_value_attributes(values: &[String]) -> Vec<RubricAttribute> {
    let weight = weight_per_value(values.len());
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let (icon, color) = value_style(i);
            RubricAttribute {
                id: Uuid::new_v4(),
                name: value.clone(),
                description: format!("Shows {value} in how they work, decide and collaborate."),
                category: AttributeCategory::Value,
                icon: icon.to_string(),
                color: color.to_string(),
                weight,
                sub_attributes: Vec::new(),
            }
        })
        .collect()
}

/// Runs the full pipeline, emitting one progress event per attribute.
/// Any failed model call aborts the run.
pub async fn generate_rubric(
    llm: &dyn LanguageModel,
    brief: &RubricBrief,
    emitter: &Emitter,
    cancel: &CancellationToken,
) -> Result<GeneratedRubric, GenerationError> {
    let started = Instant::now();
    let values = brief.context.culture_values();
    let slots = plan_slots(ksa_target(!values.is_empty()));
    let total = slots.len() + values.len();
    info!(
        "Generating rubric: {} K/S/A slots, {} culture values",
        slots.len(),
        values.len()
    );

    let mut attributes: Vec<RubricAttribute> = Vec::with_capacity(total);
    for category in slots {
        let prompt = build_attribute_prompt(brief, category, &attributes);
        let draft: DraftAttribute = complete_json(llm, &prompt, JSON_ONLY_SYSTEM, cancel).await?;
        let attribute = into_attribute(draft, category)?;
        debug!(
            "{} attribute '{}' provisional weight {}",
            category.as_str(),
            attribute.name,
            attribute.weight
        );
        attributes.push(attribute.clone());
        emitter
            .progress(ProgressPayload {
                current: attributes.len(),
                total,
                category: category.as_str().to_string(),
                detail: ProgressDetail::Attribute(attribute),
            })
            .await?;
    }

    if !values.is_empty() {
        rescale(&mut attributes, 100.0 - value_weight_total(values.len()));
        for attribute in derive_value_attributes(&values) {
            attributes.push(attribute.clone());
            emitter
                .progress(ProgressPayload {
                    current: attributes.len(),
                    total,
                    category: AttributeCategory::Value.as_str().to_string(),
                    detail: ProgressDetail::Attribute(attribute),
                })
                .await?;
        }
    }

    if normalize(&mut attributes) {
        debug!("rubric weights normalized to 100");
    }
    let total_weight = round1(total_weight(&attributes));
    info!(
        "Rubric complete: {} attributes, total weight {} in {:?}",
        attributes.len(),
        total_weight,
        started.elapsed()
    );

    Ok(GeneratedRubric {
        role: brief.role.clone(),
        attributes,
        total_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::ScriptedModel;
    use crate::models::context::Culture;
    use crate::transport::StreamEvent;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    fn reply(name: &str, weight: f64) -> String {
        serde_json::json!({
            "name": name,
            "description": format!("{name} matters"),
            "weight": weight,
            "subAttributes": [
                {"name": "a", "description": "a"},
                {"name": "b", "description": "b"},
                {"name": "c", "description": "c"},
                {"name": "d", "description": "d"}
            ]
        })
        .to_string()
    }

    fn brief(values: &[&str]) -> RubricBrief {
        RubricBrief {
            role: Some("Backend Engineer".into()),
            brief: "Role: Backend Engineer".into(),
            context: CompanyContext {
                culture: Culture {
                    values: values.iter().map(|v| v.to_string()).collect(),
                },
                ..Default::default()
            },
            requested: vec![],
        }
    }

    async fn run(
        model: &ScriptedModel,
        brief: &RubricBrief,
    ) -> (Result<GeneratedRubric, GenerationError>, Vec<StreamEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let emitter = Emitter::new(tx);
        let result = generate_rubric(model, brief, &emitter, &CancellationToken::new()).await;
        drop(emitter);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    fn progress_attributes(events: &[StreamEvent]) -> Vec<RubricAttribute> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress(ProgressPayload {
                    detail: ProgressDetail::Attribute(a),
                    ..
                }) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_slot_plan_round_robin() {
        use AttributeCategory::*;
        assert_eq!(plan_slots(4), vec![Knowledge, Skill, Ability, Knowledge]);
        assert_eq!(
            plan_slots(6),
            vec![Knowledge, Skill, Ability, Knowledge, Skill, Ability]
        );
    }

    #[test]
    fn test_slot_plan_category_bounds() {
        for target in 1..=12 {
            let slots = plan_slots(target);
            assert_eq!(slots.len(), target);
            let cap = target.div_ceil(3);
            for category in AttributeCategory::KSA {
                let n = slots.iter().filter(|c| **c == category).count();
                assert!(n <= cap + 1, "target {target}: {n} {category:?}");
                if target >= 3 {
                    assert!(n >= 1, "target {target}: no {category:?}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_values_scenario_reserves_fifteen_percent() {
        let model = ScriptedModel::new([
            reply("Payments domain", 20.0),
            reply("Rust", 18.0),
            reply("Systems thinking", 12.0),
            reply("Distributed systems", 25.0),
        ]);
        let (result, events) = run(&model, &brief(&["Integrity", "Speed"])).await;
        let rubric = result.unwrap();

        assert_eq!(model.call_count(), 4);
        assert_eq!(rubric.attributes.len(), 6);
        let values: Vec<_> = rubric
            .attributes
            .iter()
            .filter(|a| a.category == AttributeCategory::Value)
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.weight == 7.5));

        let ksa: f64 = rubric
            .attributes
            .iter()
            .filter(|a| a.category != AttributeCategory::Value)
            .map(|a| a.weight)
            .sum();
        assert!((ksa - 85.0).abs() <= 0.2, "ksa total {ksa}");
        assert!((rubric.total_weight - 100.0).abs() <= 0.5);
        assert_eq!(progress_attributes(&events).len(), 6);
    }

    #[tokio::test]
    async fn test_no_values_yields_six_progress_events() {
        let model = ScriptedModel::new(
            ["A", "B", "C", "D", "E", "F"].map(|n| reply(n, 40.0)),
        );
        let (result, events) = run(&model, &brief(&[])).await;
        let rubric = result.unwrap();

        assert_eq!(events.len(), 6);
        assert!(rubric
            .attributes
            .iter()
            .all(|a| a.category != AttributeCategory::Value));
        // 6 x 25 (clamped) = 150, normalized back to 100.
        let total: f64 = rubric.attributes.iter().map(|a| a.weight).sum();
        assert!((99.5..=100.5).contains(&total), "total {total}");
        assert!(rubric.attributes.iter().all(|a| a.sub_attributes.len() == 3));

        let currents: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress(p) => Some(p.current),
                _ => None,
            })
            .collect();
        assert_eq!(currents, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_value_palette_pairs_are_unique() {
        let names = ["V1", "V2", "V3", "V4", "V5", "V6", "V7", "V8"];
        let attrs = derive_value_attributes(&names.map(String::from));
        let pairs: HashSet<_> = attrs
            .iter()
            .map(|a| (a.color.clone(), a.icon.clone()))
            .collect();
        assert_eq!(pairs.len(), 8);
        assert_eq!(attrs[0].weight, round1(25.0 / 8.0));
    }

    #[tokio::test]
    async fn test_failed_call_aborts_generation() {
        let model = ScriptedModel::new([reply("A", 20.0)]).then_fail(400);
        let (result, events) = run(&model, &brief(&[])).await;
        assert!(matches!(result, Err(GenerationError::Llm(_))));
        assert_eq!(events.len(), 1);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_nameless_attribute_is_invalid_output() {
        let model = ScriptedModel::new([r#"{"name": "  ", "weight": 12}"#]);
        let (result, _) = run(&model, &brief(&[])).await;
        assert!(matches!(result, Err(GenerationError::InvalidOutput(_))));
    }

    #[test]
    fn test_prompt_lists_existing_attributes() {
        let existing = derive_value_attributes(&["Ownership".to_string()]);
        let prompt = build_attribute_prompt(&brief(&[]), AttributeCategory::Skill, &existing);
        assert!(prompt.contains("exactly ONE SKILL attribute"));
        assert!(prompt.contains("- Ownership (VALUE)"));
        assert!(!prompt.contains("{context}"));
    }
}
