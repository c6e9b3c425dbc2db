// LLM prompt constants for the rubric generator.
// Reuses the JSON-only system fragment from llm_client::prompts.

/// Single-attribute prompt. Replace every `{placeholder}` before sending.
pub const ATTRIBUTE_PROMPT_TEMPLATE: &str = r#"You are designing a candidate-evaluation rubric for a hiring team.

ROLE: {role}

REQUEST:
{brief}

COMPANY CONTEXT:
{context}

Generate exactly ONE {category} attribute. {category_guidance}

Attributes already in the rubric (do not repeat or overlap with them):
{existing}

Attributes the hiring team asked to see covered (use one if it fits this category):
{requested}

Return a JSON object with this EXACT schema (no extra fields):
{
  "name": "Distributed systems design",
  "description": "One or two sentences on what this covers and why it matters for the role.",
  "weight": 18,
  "subAttributes": [
    {"name": "Consistency models", "description": "One sentence."},
    {"name": "Failure handling", "description": "One sentence."},
    {"name": "Capacity planning", "description": "One sentence."}
  ]
}

Rules:
- "weight" is the attribute's share of the whole rubric as a percentage between 10 and 25.
- Provide exactly 3 subAttributes.
- Keep the name under 6 words."#;

pub const KNOWLEDGE_GUIDANCE: &str =
    "Knowledge is a body of information the candidate must already know (domains, theory, regulations, systems).";
pub const SKILL_GUIDANCE: &str =
    "A skill is a learned, demonstrable proficiency the candidate applies hands-on (tools, techniques, practices).";
pub const ABILITY_GUIDANCE: &str =
    "An ability is a broader, enduring capacity (reasoning, communication, leadership, adaptability).";
