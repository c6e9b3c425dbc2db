// Shared prompt fragments.
// Each subsystem that needs LLM calls defines its own prompts.rs alongside it.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to prompts that summarize fetched material.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only state facts supported by the material provided. \
    Do NOT infer, interpolate, or invent details about the company. \
    If the material does not support a claim, omit it entirely.";
