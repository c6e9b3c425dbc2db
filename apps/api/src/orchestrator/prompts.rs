// LLM prompt constants for the orchestrator's decision policy.

/// System prompt for every decision turn: enforces a single JSON decision.
pub const DECISION_SYSTEM: &str = "You are the planner of a research agent. \
    Each turn you either call exactly one capability or give the final answer. \
    You MUST respond with a single JSON object only. \
    Do NOT use markdown code fences. \
    Do NOT include any text outside the JSON object.";

/// Decision prompt. Replace every `{placeholder}` before sending.
pub const DECISION_PROMPT_TEMPLATE: &str = r#"GOAL:
{goal}

REQUEST:
{brief}

AVAILABLE CAPABILITIES:
{capabilities}
SUGGESTED ORDER: {suggested_order}
Earlier outputs are passed forward automatically: you may omit inputs that an earlier step already produced.

STEPS SO FAR ({steps_used} of {max_steps} used):
{transcript}

Respond with ONE of:
{"type": "capability", "name": "<capability name>", "input": { ... }}
{"type": "final", "answer": {final_answer_shape}}

{final_answer_rules}"#;

pub const RESEARCH_GOAL: &str = "Research the company described in the request and produce a \
    factual company profile a hiring team can use when writing job descriptions and interviewing.";

pub const RESEARCH_SUGGESTED_ORDER: &str = "fetch_page → detect_stack → web_search → compile_context → synthesize";

pub const RESEARCH_FINAL_SHAPE: &str =
    r#"{"summary": "<one paragraph>", "bullets": ["<5 to 7 factual bullets>"]}"#;

pub const RESEARCH_FINAL_RULES: &str = "Give the final answer once you have synthesized a briefing, \
    or earlier if the remaining capabilities cannot add anything. Only state facts found in the steps above.";

pub const SCAFFOLD_GOAL: &str = "Outline an evaluation rubric for the role in the request: a job-fit \
    section (knowledge, skills, abilities) and a company-fit section (culture values).";

pub const SCAFFOLD_SUGGESTED_ORDER: &str = "job_fit_rubric → company_fit_rubric → compile_context (only if a page was supplied)";

pub const SCAFFOLD_FINAL_SHAPE: &str = r#"{"attributes": [{"name": "...", "category": "KNOWLEDGE|SKILL|ABILITY|VALUE", "description": "...", "weight": 20}]}"#;

pub const SCAFFOLD_FINAL_RULES: &str = "Weights are percentages and should sum to 100. \
    Include every attribute recorded by the scaffold steps.";
