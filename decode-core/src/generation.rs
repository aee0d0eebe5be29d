//! Generation - Design Image to Artifact
//!
//! The generator is an opaque remote call: an image payload plus guidance
//! (and, when refining, the previous artifact) in, an [`Artifact`] or a
//! failure out. Failures are surfaced as-is; nothing here retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::artifact::Artifact;

pub const SYSTEM_PROMPT: &str = r#"You are a lead frontend engineer converting a design image into one self-contained page section.

Constraints:
- Markup MUST start with a <section> carrying a unique, descriptive class (e.g. "section-feature-xyz"); everything else lives inside it.
- The section's maximum width is exactly 1350px; use a .section-wrapper class if needed.
- Main headings use the classes page_hdng5 or page-hdng. All font sizes are in px.
- Style is complete CSS wrapped in <style> tags. Every rule is prefixed with the section class. Never style :root, html or body. No @import or font links.
- Script is complete JavaScript wrapped in <script> tags. Bootstrap 5 and Slick Slider are available globally.
- Every image uses a placeholder of the form {{ASSET_ID_UNIQUE_NAME}}.
- When previous code is supplied, modify it according to the guidance instead of starting over.

Reply with exactly one JSON object:
{"html": "...", "css": "<style>...</style>", "javascript": "<script>...</script>"}"#;

const DEFAULT_GUIDANCE: &str = "Follow the design exactly.";
const DEFAULT_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generator not configured: {0}")]
    NotConfigured(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generator API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty or unexpected generator response")]
    EmptyResponse,

    #[error("Unable to parse generator reply: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_endpoint() -> String { "https://openrouter.ai/api/v1/chat/completions".to_string() }
fn default_model() -> String { "openai/gpt-4o-mini".to_string() }
fn default_temperature() -> f32 { 0.1 }
fn default_max_tokens() -> u32 { 6000 }
fn default_timeout_secs() -> u64 { 180 }
fn default_referer() -> String { "http://localhost:3000".to_string() }
fn default_title() -> String { "Design-To-Code".to_string() }
fn default_api_key_env() -> String { "OPENROUTER_API_KEY".to_string() }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            referer: default_referer(),
            title: default_title(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Base64 image or a `data:` URL
    pub image_payload: String,
    #[serde(default)]
    pub guidance: String,
    #[serde(default)]
    pub previous: Option<Artifact>,
}

impl GenerationRequest {
    /// Instruction text sent alongside the image
    pub fn prompt_text(&self) -> String {
        let mut text = SYSTEM_PROMPT.to_string();
        match &self.previous {
            Some(previous) => {
                text.push_str(&format!(
                    "\n\n### CURRENT CODE TO MODIFY:\nHTML: {}\nCSS: {}\nJS: {}\n\n### NEW GUIDANCE:\n{}\n\n\
                     Update the current code based on this guidance. Keep the 1350px width and the heading classes.",
                    previous.markup, previous.style, previous.script, self.guidance
                ));
            }
            None => {
                let guidance = if self.guidance.trim().is_empty() {
                    DEFAULT_GUIDANCE
                } else {
                    self.guidance.as_str()
                };
                text.push_str(&format!("\n\n### INITIAL GUIDANCE:\n{}", guidance));
            }
        }
        text
    }

    pub fn image_data_url(&self) -> String {
        if self.image_payload.starts_with("data:") {
            return self.image_payload.clone();
        }
        format!("data:{};base64,{}", DEFAULT_MIME, self.image_payload)
    }
}

/// Anything that turns a request into an artifact
pub trait CodeGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Artifact, GenerationError>;
}

/// Chat-completions client for OpenRouter-compatible endpoints
pub struct HttpGenerator {
    config: GenerationConfig,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpGenerator {
    pub fn new(config: GenerationConfig, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured("empty API key".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, api_key, client })
    }

    /// Read the key from `config.api_key_env`, falling back to `API_KEY`
    pub fn from_env(config: GenerationConfig) -> Result<Self, GenerationError> {
        let key = std::env::var(&config.api_key_env)
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| GenerationError::NotConfigured(format!("{} is not set", config.api_key_env)))?;
        Self::new(config, key)
    }

    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.prompt_text() },
                        { "type": "image_url", "image_url": { "url": request.image_data_url() } }
                    ]
                }
            ]
        })
    }
}

impl CodeGenerator for HttpGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Artifact, GenerationError> {
        info!(
            model = %self.config.model,
            refine = request.previous.is_some(),
            payload_bytes = request.image_payload.len(),
            "requesting generation"
        );
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&self.request_body(request))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            let message = api_error_message(&body);
            error!(status = status.as_u16(), %message, "generator API error");
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        let text = extract_message_text(&payload).ok_or(GenerationError::EmptyResponse)?;
        parse_artifact(&text)
    }
}

/// Pull the reply text out of a chat-completions response.
///
/// Content may be a plain string, a list of typed parts, or an object with
/// a `text` field.
pub fn extract_message_text(response: &Value) -> Option<String> {
    let content = response.pointer("/choices/0/message/content")?;
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .find(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|p| p.get("text"))
            .and_then(Value::as_str)?
            .to_string(),
        Value::Object(map) => map.get("text").and_then(Value::as_str)?.to_string(),
        _ => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

/// Parse the generator's JSON reply, tolerating a Markdown code fence
pub fn parse_artifact(text: &str) -> Result<Artifact, GenerationError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).map_err(|e| GenerationError::MalformedResponse(e.to_string()))
}

/// Best human-readable message from an error body
pub fn api_error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    parsed
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("error").and_then(Value::as_str))
        .or_else(|| parsed.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_prompt_uses_default_guidance() {
        let request = GenerationRequest {
            image_payload: "abc".into(),
            guidance: "  ".into(),
            previous: None,
        };
        let text = request.prompt_text();
        assert!(text.ends_with("### INITIAL GUIDANCE:\nFollow the design exactly."));
    }

    #[test]
    fn test_refine_prompt_embeds_previous_code() {
        let request = GenerationRequest {
            image_payload: "abc".into(),
            guidance: "Make the title red".into(),
            previous: Some(Artifact::new("<section>x</section>", "<style></style>", "")),
        };
        let text = request.prompt_text();
        assert!(text.contains("### CURRENT CODE TO MODIFY:\nHTML: <section>x</section>"));
        assert!(text.contains("### NEW GUIDANCE:\nMake the title red"));
    }

    #[test]
    fn test_image_data_url_normalized() {
        let mut request = GenerationRequest {
            image_payload: "/9j/AAA".into(),
            guidance: String::new(),
            previous: None,
        };
        assert_eq!(request.image_data_url(), "data:image/jpeg;base64,/9j/AAA");
        request.image_payload = "data:image/png;base64,iVBO".into();
        assert_eq!(request.image_data_url(), "data:image/png;base64,iVBO");
    }

    #[test]
    fn test_extract_message_text_variants() {
        let s = json!({"choices": [{"message": {"content": "{\"html\":\"a\"}"}}]});
        assert_eq!(extract_message_text(&s).as_deref(), Some("{\"html\":\"a\"}"));

        let parts = json!({"choices": [{"message": {"content": [
            {"type": "image", "url": "x"},
            {"type": "text", "text": "body"}
        ]}}]});
        assert_eq!(extract_message_text(&parts).as_deref(), Some("body"));

        let obj = json!({"choices": [{"message": {"content": {"text": "t"}}}]});
        assert_eq!(extract_message_text(&obj).as_deref(), Some("t"));

        assert!(extract_message_text(&json!({"choices": []})).is_none());
        assert!(extract_message_text(&json!({"choices": [{"message": {"content": ""}}]})).is_none());
    }

    #[test]
    fn test_parse_artifact_with_fence() {
        let artifact = parse_artifact("```json\n{\"html\":\"<section></section>\",\"css\":\"\",\"javascript\":\"\"}\n```").unwrap();
        assert_eq!(artifact.markup, "<section></section>");
        assert!(matches!(parse_artifact("nope"), Err(GenerationError::MalformedResponse(_))));
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(api_error_message(r#"{"error":{"message":"quota"}}"#), "quota");
        assert_eq!(api_error_message(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(api_error_message(r#"{"message":"down"}"#), "down");
        assert_eq!(api_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_request_body_shape() {
        let generator = HttpGenerator::new(GenerationConfig::default(), "key").unwrap();
        let request = GenerationRequest {
            image_payload: "AAA".into(),
            guidance: String::new(),
            previous: None,
        };
        let body = generator.request_body(&request);
        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["max_tokens"], 6000);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][1]["content"][1]["image_url"]["url"], "data:image/jpeg;base64,AAA");
    }

    #[test]
    fn test_empty_key_not_configured() {
        assert!(matches!(
            HttpGenerator::new(GenerationConfig::default(), " "),
            Err(GenerationError::NotConfigured(_))
        ));
    }
}
