//! Page extraction: pure functions over fetched markup.
//!
//! Readable extraction picks the element whose direct `<p>` children carry the
//! most text. When no block clears `MIN_READABLE_CHARS`, a sentence heuristic
//! runs over the raw markup instead.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

const MIN_READABLE_CHARS: usize = 200;
const MIN_SENTENCE_CHARS: usize = 40;
pub const MAX_SENTENCES: usize = 14;
pub const MAX_HEADINGS: usize = 12;
pub const MAX_LINKS: usize = 20;
pub const MAX_TEXT_PREVIEW_CHARS: usize = 4000;

pub const CHUNK_WINDOW_CHARS: usize = 1400;
pub const CHUNK_OVERLAP_CHARS: usize = 120;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script regex"));
static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("style regex"));
static NOSCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<noscript\b[^>]*>.*?</noscript\s*>").expect("noscript regex"));
static SVG_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<svg\b[^>]*>.*?</svg\s*>").expect("svg regex"));
static COMMENT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static LETTER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{3}").expect("letter regex"));
static CSS_ARTIFACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[{}]|!important|@media|@font-face|@keyframes|var\(--|\b\d+(?:\.\d+)?(?:px|rem|vh|vw)\b|rgba?\(|^\s*[.#][\w-]+\s*[,:]",
    )
    .expect("css artifact regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Readable,
    Heuristic,
}

/// Everything pulled out of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<String>,
    pub text: String,
    pub links: Vec<String>,
    pub method: ExtractionMethod,
}

pub fn extract_page(html: &str, base: &Url) -> ExtractedPage {
    let document = Html::parse_document(html);

    let (text, method) = match readable_text(&document) {
        Some(text) => (text, ExtractionMethod::Readable),
        None => (
            heuristic_sentences(html).join(" "),
            ExtractionMethod::Heuristic,
        ),
    };

    ExtractedPage {
        title: page_title(&document),
        description: meta_description(&document),
        headings: headings(&document),
        text,
        links: outbound_links(&document, base),
        method,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Readable extraction
// ────────────────────────────────────────────────────────────────────────────

static BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article, main, [role=\"main\"], section, div").expect("block selector")
});

fn readable_text(document: &Html) -> Option<String> {
    let mut best: Option<(usize, Vec<String>)> = None;

    for block in document.select(&BLOCK_SELECTOR) {
        let paragraphs: Vec<String> = block
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "p")
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect();
        let score: usize = paragraphs.iter().map(|p| p.chars().count()).sum();
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, paragraphs));
        }
    }

    match best {
        Some((score, paragraphs)) if score >= MIN_READABLE_CHARS => Some(paragraphs.join(" ")),
        _ => None,
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

// ────────────────────────────────────────────────────────────────────────────
// Heuristic fallback
// ────────────────────────────────────────────────────────────────────────────

/// Strips non-content blocks, splits the remaining text into sentences and
/// keeps the ones that read like prose.
pub fn heuristic_sentences(html: &str) -> Vec<String> {
    let mut cleaned = html.to_string();
    for block in [
        &*SCRIPT_BLOCK,
        &*STYLE_BLOCK,
        &*NOSCRIPT_BLOCK,
        &*SVG_BLOCK,
        &*COMMENT_BLOCK,
    ] {
        cleaned = block.replace_all(&cleaned, " ").into_owned();
    }
    let text = TAG.replace_all(&cleaned, "\n");
    let text = html_escape::decode_html_entities(&text);

    let mut seen = HashSet::new();
    let mut sentences = Vec::new();
    for line in text.lines() {
        for candidate in split_sentences(line) {
            let sentence = collapse_whitespace(&candidate);
            if is_prose(&sentence) && seen.insert(sentence.clone()) {
                sentences.push(sentence);
                if sentences.len() == MAX_SENTENCES {
                    return sentences;
                }
            }
        }
    }
    sentences
}

fn split_sentences(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn is_prose(sentence: &str) -> bool {
    sentence.chars().count() >= MIN_SENTENCE_CHARS
        && LETTER_RUN.is_match(sentence)
        && !CSS_ARTIFACT.is_match(sentence)
}

// ────────────────────────────────────────────────────────────────────────────
// Metadata, headings, links
// ────────────────────────────────────────────────────────────────────────────

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[property=\"og:title\"]").expect("og:title selector"));
static META_DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name=\"description\"], meta[property=\"og:description\"]")
        .expect("description selector")
});
static HEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3").expect("heading selector"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

fn page_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(document, &OG_TITLE))
}

fn meta_description(document: &Html) -> Option<String> {
    meta_content(document, &META_DESCRIPTION)
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|c| !c.is_empty())
}

fn headings(document: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    document
        .select(&HEADINGS)
        .map(element_text)
        .filter(|h| !h.is_empty() && seen.insert(h.to_lowercase()))
        .take(MAX_HEADINGS)
        .collect()
}

fn outbound_links(document: &Html, base: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if let Some(resolved) = resolve_link(href, base) {
            if seen.insert(resolved.clone()) {
                links.push(resolved);
                if links.len() == MAX_LINKS {
                    break;
                }
            }
        }
    }
    links
}

/// Resolves `href` against `base`, dropping mail/script/empty anchors.
pub fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("mailto:")
        || lower.starts_with("javascript:")
        || lower.starts_with("tel:")
    {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Text helpers
// ────────────────────────────────────────────────────────────────────────────

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters without splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Splits text into overlapping windows of `window` chars, each starting
/// `window - overlap` chars after the previous one.
pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || window == 0 {
        return Vec::new();
    }
    let step = window.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + window).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
