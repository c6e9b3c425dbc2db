//! Per-run memory of typed capability outputs.
//!
//! Lets a decision omit inputs an earlier step already produced: before a
//! capability runs, missing fields of its input object are filled from what
//! the run has seen so far. Lives for one run only.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::capabilities::compile::{compile_context, CompileContextInput, CompiledContext};
use crate::capabilities::detect::DetectStackOutput;
use crate::capabilities::fetch::FetchPageOutput;
use crate::capabilities::search::WebSearchOutput;
use crate::capabilities::synthesize::SynthesizeOutput;
use crate::capabilities::CapabilityKind;

#[derive(Debug, Default)]
pub struct RunMemory {
    company_name: Option<String>,
    page: Option<FetchPageOutput>,
    detection: Option<DetectStackOutput>,
    search: Option<WebSearchOutput>,
    compiled: Option<CompiledContext>,
    synthesis: Option<SynthesizeOutput>,
}

fn fill(object: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    let missing = object.get(key).map_or(true, Value::is_null);
    if missing {
        if let Some(value) = value {
            object.insert(key.to_string(), value);
        }
    }
}

fn json<T: serde::Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

impl RunMemory {
    pub fn new(company_name: Option<String>) -> Self {
        Self {
            company_name,
            ..Default::default()
        }
    }

    /// Records a `ready` output. Outputs that do not match the expected shape
    /// are ignored.
    pub fn observe(&mut self, kind: CapabilityKind, output: &Value) {
        let output = output.clone();
        match kind {
            CapabilityKind::FetchPage => self.page = serde_json::from_value(output).ok(),
            CapabilityKind::DetectStack => self.detection = serde_json::from_value(output).ok(),
            CapabilityKind::WebSearch => self.search = serde_json::from_value(output).ok(),
            CapabilityKind::CompileContext => self.compiled = serde_json::from_value(output).ok(),
            CapabilityKind::Synthesize => self.synthesis = serde_json::from_value(output).ok(),
            CapabilityKind::JobFitRubric | CapabilityKind::CompanyFitRubric => {}
        }
    }

    #[cfg(test)]
    pub fn fetched(&self) -> bool {
        self.page.is_some()
    }

    pub fn compiled(&self) -> Option<&CompiledContext> {
        self.compiled.as_ref()
    }

    pub fn synthesis(&self) -> Option<&SynthesizeOutput> {
        self.synthesis.as_ref()
    }

    /// Returns `input` with absent fields taken from earlier outputs. A null
    /// input is treated as an empty object.
    pub fn complete_input(&self, kind: CapabilityKind, input: Value) -> Value {
        let mut object = match input {
            Value::Null => Map::new(),
            Value::Object(object) => object,
            other => return other,
        };
        let page = self.page.as_ref();
        let detection = self.detection.as_ref();

        match kind {
            CapabilityKind::DetectStack => {
                if !object.contains_key("html") {
                    fill(&mut object, "url", page.map(|p| Value::from(p.final_url.clone())));
                }
            }
            CapabilityKind::CompileContext => {
                fill(&mut object, "url", page.map(|p| Value::from(p.final_url.clone())));
                fill(&mut object, "title", page.and_then(|p| json(&p.title)));
                fill(&mut object, "description", page.and_then(|p| json(&p.description)));
                fill(&mut object, "textPreview", page.map(|p| Value::from(p.text_preview.clone())));
                fill(&mut object, "links", page.and_then(|p| json(&p.links)));
                fill(&mut object, "stack", detection.and_then(|d| json(&d.stack)));
                fill(&mut object, "signals", detection.and_then(|d| json(&d.signals)));
            }
            CapabilityKind::Synthesize => {
                fill(&mut object, "companyName", self.company_name.clone().map(Value::from));
                let url = self
                    .compiled
                    .as_ref()
                    .map(|c| c.url.clone())
                    .or_else(|| page.map(|p| p.final_url.clone()));
                fill(&mut object, "url", url.map(Value::from));
                let text = self
                    .compiled
                    .as_ref()
                    .map(|c| c.content_preview.clone())
                    .or_else(|| page.map(|p| p.summary.clone().unwrap_or_else(|| p.text_preview.clone())));
                fill(&mut object, "text", text.map(Value::from));
                let stack = self
                    .compiled
                    .as_ref()
                    .map(|c| &c.stack_breakdown)
                    .or(detection.map(|d| &d.stack));
                fill(&mut object, "stack", stack.and_then(json));
                fill(&mut object, "signals", detection.and_then(|d| json(&d.signals)));
                fill(&mut object, "searchResults", self.search.as_ref().and_then(|s| json(&s.results)));
            }
            _ => {}
        }
        Value::Object(object)
    }

    /// Compiled context for the outcome: the one a step produced, or one
    /// built from the fetched page when no compile step ran.
    pub fn final_context(&self) -> Option<CompiledContext> {
        if let Some(compiled) = &self.compiled {
            return Some(compiled.clone());
        }
        let page = self.page.as_ref()?;
        let detection = self.detection.as_ref();
        Some(compile_context(
            CompileContextInput {
                url: page.final_url.clone(),
                title: page.title.clone(),
                description: page.description.clone(),
                text_preview: Some(page.text_preview.clone()),
                stack: detection.map(|d| d.stack.clone()),
                signals: detection.map(|d| d.signals.clone()),
                links: Some(page.links.clone()),
                timestamp: None,
            },
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_output() -> Value {
        serde_json::json!({
            "url": "https://acme.example",
            "finalUrl": "https://acme.example/",
            "status": 200,
            "contentType": "text/html",
            "title": "Acme",
            "description": "Robots",
            "headings": [],
            "textPreview": "Acme builds warehouse robots.",
            "links": ["https://acme.example/careers"],
            "summary": null,
            "extraction": "readable",
            "bytesRead": 1000,
            "truncated": false
        })
    }

    #[test]
    fn test_compile_input_is_filled_from_fetch() {
        let mut memory = RunMemory::new(Some("Acme".into()));
        memory.observe(CapabilityKind::FetchPage, &page_output());
        assert!(memory.fetched());

        let input = memory.complete_input(CapabilityKind::CompileContext, Value::Null);
        assert_eq!(input["url"], "https://acme.example/");
        assert_eq!(input["textPreview"], "Acme builds warehouse robots.");
        assert_eq!(input["links"][0], "https://acme.example/careers");
    }

    #[test]
    fn test_explicit_fields_are_kept() {
        let mut memory = RunMemory::new(None);
        memory.observe(CapabilityKind::FetchPage, &page_output());
        let input = memory.complete_input(
            CapabilityKind::Synthesize,
            serde_json::json!({"text": "caller text"}),
        );
        assert_eq!(input["text"], "caller text");
        assert_eq!(input["url"], "https://acme.example/");
        assert!(input.get("companyName").is_none());
    }

    #[test]
    fn test_final_context_built_from_fetch_when_not_compiled() {
        let mut memory = RunMemory::new(None);
        assert!(memory.final_context().is_none());
        memory.observe(CapabilityKind::FetchPage, &page_output());
        let ctx = memory.final_context().unwrap();
        assert_eq!(ctx.title, "Acme");
        assert_eq!(ctx.content_preview, "Acme builds warehouse robots.");
    }

    #[test]
    fn test_malformed_output_is_ignored() {
        let mut memory = RunMemory::new(None);
        memory.observe(CapabilityKind::FetchPage, &serde_json::json!({"unexpected": true}));
        assert!(!memory.fetched());
    }
}
