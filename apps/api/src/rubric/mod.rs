//! Progressive Attribute Generator: weighted Knowledge/Skill/Ability/Value rubrics.
//!
//! Pipeline: slot plan → one model call per K/S/A slot → derived VALUE
//! attributes from culture values → weight normalization.

pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod weights;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeCategory {
    Knowledge,
    Skill,
    Ability,
    Value,
}

impl AttributeCategory {
    /// Model-produced categories, in slot order.
    pub const KSA: [AttributeCategory; 3] = [
        AttributeCategory::Knowledge,
        AttributeCategory::Skill,
        AttributeCategory::Ability,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeCategory::Knowledge => "KNOWLEDGE",
            AttributeCategory::Skill => "SKILL",
            AttributeCategory::Ability => "ABILITY",
            AttributeCategory::Value => "VALUE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAttribute {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricAttribute {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: AttributeCategory,
    pub icon: String,
    pub color: String,
    /// Percentage of the whole rubric.
    pub weight: f64,
    #[serde(default)]
    pub sub_attributes: Vec<SubAttribute>,
}

/// Terminal payload of a generator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRubric {
    pub role: Option<String>,
    pub attributes: Vec<RubricAttribute>,
    pub total_weight: f64,
}
