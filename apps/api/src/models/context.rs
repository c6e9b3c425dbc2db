use serde::{Deserialize, Serialize};

/// Loosely structured company context supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyContext {
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub culture: Culture,
    #[serde(default)]
    pub business_model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Culture {
    #[serde(default)]
    pub values: Vec<String>,
}

impl CompanyContext {
    /// Culture values with blanks and case-insensitive duplicates removed.
    pub fn culture_values(&self) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for value in &self.culture.values {
            let value = value.trim();
            if !value.is_empty() && !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                values.push(value.to_string());
            }
        }
        values
    }

    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.industry)
            && blank(&self.size)
            && blank(&self.stage)
            && blank(&self.business_model)
            && self.tech_stack.is_empty()
            && self.culture_values().is_empty()
    }

    /// Prompt-ready rendering; empty fields are omitted.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        let mut push = |label: &str, value: Option<&str>| {
            if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
                lines.push(format!("{label}: {v}"));
            }
        };
        push("Industry", self.industry.as_deref());
        push("Size", self.size.as_deref());
        push("Stage", self.stage.as_deref());
        push("Business model", self.business_model.as_deref());
        if !self.tech_stack.is_empty() {
            lines.push(format!("Tech stack: {}", self.tech_stack.join(", ")));
        }
        let values = self.culture_values();
        if !values.is_empty() {
            lines.push(format!("Culture values: {}", values.join(", ")));
        }
        if lines.is_empty() {
            "(no company context supplied)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRequest {
    #[serde(default)]
    pub context: CompanyContext,
    #[serde(default)]
    pub role: Option<String>,
    /// Attribute names the caller wants covered.
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

/// Body accepted by every generation endpoint: either a chat transcript or
/// a structured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationRequest {
    Conversation { messages: Vec<ChatMessage> },
    Structured(StructuredRequest),
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl GenerationRequest {
    /// Free-text statement of what the caller asked for.
    pub fn brief(&self) -> String {
        match self {
            GenerationRequest::Conversation { messages } => messages
                .iter()
                .filter(|m| m.role == "user")
                .map(|m| m.content.trim())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            GenerationRequest::Structured(req) => {
                let mut lines = Vec::new();
                if let Some(company) = non_empty(req.company_name.as_ref()) {
                    lines.push(format!("Company: {company}"));
                }
                if let Some(url) = non_empty(req.url.as_ref()) {
                    lines.push(format!("Website: {url}"));
                }
                if let Some(role) = non_empty(req.role.as_ref()) {
                    lines.push(format!("Role: {role}"));
                }
                if !req.attributes.is_empty() {
                    lines.push(format!("Requested attributes: {}", req.attributes.join(", ")));
                }
                lines.join("\n")
            }
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            GenerationRequest::Structured(req) => non_empty(req.role.as_ref()),
            GenerationRequest::Conversation { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            GenerationRequest::Structured(req) => non_empty(req.url.as_ref()),
            GenerationRequest::Conversation { .. } => None,
        }
    }

    pub fn company_name(&self) -> Option<&str> {
        match self {
            GenerationRequest::Structured(req) => non_empty(req.company_name.as_ref()),
            GenerationRequest::Conversation { .. } => None,
        }
    }

    pub fn requested_attributes(&self) -> &[String] {
        match self {
            GenerationRequest::Structured(req) => &req.attributes,
            GenerationRequest::Conversation { .. } => &[],
        }
    }

    pub fn context(&self) -> CompanyContext {
        match self {
            GenerationRequest::Structured(req) => req.context.clone(),
            GenerationRequest::Conversation { .. } => CompanyContext::default(),
        }
    }
}
