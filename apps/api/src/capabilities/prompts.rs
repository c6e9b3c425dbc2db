// LLM prompt constants for capabilities that delegate prose generation.

/// System prompt for per-chunk page summaries.
pub const SUMMARIZE_CHUNK_SYSTEM: &str = "You are a concise analyst summarizing company web pages. \
    Respond with plain prose only: no headings, no bullet points, no preamble.";

/// Chunk summary template. Replace `{chunk}` before sending.
pub const SUMMARIZE_CHUNK_PROMPT_TEMPLATE: &str = r#"Summarize the following excerpt from a company web page in at most two sentences.
Keep concrete facts (products, customers, size, locations, technology). Drop navigation and marketing filler.

EXCERPT:
{chunk}"#;

/// System prompt for company profile synthesis.
pub const SYNTHESIZE_SYSTEM: &str = "You are a research analyst preparing a company briefing \
    for a hiring team. You write short, factual bullet points.";

/// Synthesis template. Replace every `{placeholder}` before sending.
pub const SYNTHESIZE_PROMPT_TEMPLATE: &str = r#"Write a company briefing for {company}.

{grounding_instruction}

Return between 5 and 7 bullet points, one per line, each starting with "- ".
Exactly one bullet MUST summarize the company's technology stack, using the detected stack below
(say plainly if nothing was detected). Other bullets cover what the company does, its customers,
its scale or stage, and anything relevant to hiring.

SOURCE URL: {url}

EXTRACTED PAGE TEXT:
{text}

DETECTED STACK:
{stack}

TECHNOLOGY SIGNALS:
{signals}

SEARCH RESULTS:
{search_results}"#;
