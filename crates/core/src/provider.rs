//! Provider trait: the abstraction over the generative-AI backend.
//!
//! A Provider knows how to send a list of turns (plus optional system
//! instruction, inline attachments and function declarations) to a model
//! and get the generated content back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Attachment, Turn};

/// How the model should shape its answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Text,
    /// Ask the provider to emit `application/json`.
    Json,
}

/// A function declaration the model may call instead of answering in text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The function name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

/// A single generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The model to use (e.g., "gemini-2.5-flash")
    pub model: String,

    /// Instruction applied to the whole exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// The conversation turns, oldest first
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 2.0 = most random)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Functions the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerateRequest {
    /// A single-turn text request.
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            turns: vec![Turn::user(prompt)],
            temperature: default_temperature(),
            max_output_tokens: None,
            response_mode: ResponseMode::Text,
            tools: Vec::new(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Switch to JSON response mode.
    pub fn json(mut self) -> Self {
        self.response_mode = ResponseMode::Json;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Attach an inline binary part to the last turn.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        if let Some(last) = self.turns.last_mut() {
            last.attachments.push(attachment);
        }
        self
    }

    /// All outgoing text, used for token estimation.
    ///
    /// Attachments are not counted.
    pub fn outgoing_text(&self) -> String {
        let mut out = String::new();
        if let Some(system) = &self.system_instruction {
            out.push_str(system);
        }
        for turn in &self.turns {
            out.push_str(&turn.text);
        }
        out
    }
}

/// A function call emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Token usage information reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated text, if the model answered in text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Function calls, if the model chose to call declared tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

impl GenerateResponse {
    /// A plain text response with no usage metadata.
    pub fn from_text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
            usage: None,
            model: model.into(),
        }
    }

    /// The response text, or [`ProviderError::EmptyResponse`] when it is
    /// absent or blank.
    pub fn require_text(&self) -> std::result::Result<&str, ProviderError> {
        match self.text.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ProviderError::EmptyResponse),
        }
    }
}

/// The core Provider trait.
///
/// The generative-AI backend implements this trait; request handlers call
/// `generate()` without knowing which backend serves it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_request_defaults() {
        let req = GenerateRequest::text("gemini-2.5-flash", "hello");
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.response_mode, ResponseMode::Text);
        assert_eq!(req.turns.len(), 1);
    }

    #[test]
    fn outgoing_text_includes_system_instruction() {
        let req = GenerateRequest::text("m", "abcd").with_system_instruction("wxyz");
        assert_eq!(req.outgoing_text(), "wxyzabcd");
    }

    #[test]
    fn attachment_goes_on_last_turn() {
        let req = GenerateRequest::text("m", "read").with_attachment(Attachment {
            mime_type: "text/plain".into(),
            data: "aGk=".into(),
        });
        assert_eq!(req.turns[0].attachments.len(), 1);
    }

    #[test]
    fn require_text_rejects_blank() {
        let resp = GenerateResponse::from_text("m", "  \n");
        assert!(matches!(
            resp.require_text(),
            Err(ProviderError::EmptyResponse)
        ));

        let resp = GenerateResponse::from_text("m", "Hello");
        assert_eq!(resp.require_text().unwrap(), "Hello");
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "set_field".into(),
            description: "Fill a form field".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "field": { "type": "string" }
                },
                "required": ["field"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("set_field"));
        assert!(json.contains("required"));
    }
}
