//! Query expansion through an external LLM service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    #[error("expansion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("expansion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("expansion service returned no text")]
    Empty,
}

/// Turns a query into a longer query with related keywords.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<String, ExpansionError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL, without the `/v1beta/...` path.
    pub endpoint: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Read the API key from `GEMINI_API_KEY`; `None` when it is unset or blank.
    pub fn from_env(model: &str, endpoint: &str, timeout: Duration) -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        Some(Self { api_key, model: model.to_string(), endpoint: endpoint.to_string(), timeout })
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReq<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize, Debug, Default)]
struct GenerateResp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiExpander {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiExpander {
    pub fn new(config: GeminiConfig) -> Result<Self, ExpansionError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

fn prompt(query: &str) -> String {
    format!(
        "You expand search queries for a keyword search engine over court judgment summaries.\n\
         Rewrite the query below by appending closely related keywords and synonyms in the same language.\n\
         Reply with the expanded query on a single line and nothing else.\n\n\
         Query: {query}"
    )
}

/// First candidate text with markdown fences removed and lines joined.
fn extract_text(resp: GenerateResp) -> Result<String, ExpansionError> {
    let raw: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let cleaned = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        return Err(ExpansionError::Empty);
    }
    Ok(cleaned)
}

#[async_trait]
impl QueryExpander for GeminiExpander {
    async fn expand(&self, query: &str) -> Result<String, ExpansionError> {
        let text = prompt(query);
        let body = GenerateReq {
            contents: vec![Content { parts: vec![Part { text: &text }] }],
            generation_config: GenerationConfig { temperature: 0.1, max_output_tokens: 256 },
        };
        tracing::debug!(model = %self.config.model, query, "requesting query expansion");
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExpansionError::Status { status: status.as_u16(), body });
        }
        let parsed: GenerateResp = resp.json().await?;
        let expanded = extract_text(parsed)?;
        tracing::debug!(expanded = %expanded, "query expanded");
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(json: &str) -> GenerateResp {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn extracts_first_candidate() {
        let r = resp(r#"{"candidates":[{"content":{"parts":[{"text":"詐欺 詐騙 集團\n"}]}},{"content":{"parts":[{"text":"other"}]}}]}"#);
        assert_eq!(extract_text(r).unwrap(), "詐欺 詐騙 集團");
    }

    #[test]
    fn strips_code_fences() {
        let r = resp(r#"{"candidates":[{"content":{"parts":[{"text":"```\n擴充 查詢\n```"}]}}]}"#);
        assert_eq!(extract_text(r).unwrap(), "擴充 查詢");
    }

    #[test]
    fn empty_reply_is_an_error() {
        assert!(matches!(extract_text(resp(r#"{"candidates":[]}"#)), Err(ExpansionError::Empty)));
        assert!(matches!(extract_text(resp(r#"{}"#)), Err(ExpansionError::Empty)));
        assert!(matches!(
            extract_text(resp(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)),
            Err(ExpansionError::Empty)
        ));
    }

    #[test]
    fn prompt_embeds_query() {
        assert!(prompt("洗錢").ends_with("Query: 洗錢"));
    }

    #[test]
    fn url_joins_model() {
        let e = GeminiExpander::new(GeminiConfig {
            api_key: "k".into(),
            model: "m1".into(),
            endpoint: "http://localhost:1/".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(e.url(), "http://localhost:1/v1beta/models/m1:generateContent");
    }
}
