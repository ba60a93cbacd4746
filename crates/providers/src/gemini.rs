//! Gemini provider implementation.
//!
//! Uses the `generateContent` REST endpoint directly.
//!
//! Features:
//! - `x-goog-api-key` header authentication
//! - System instruction as a top-level `systemInstruction` field
//! - Inline binary parts (`inlineData`) for documents and audio
//! - JSON response mode via `responseMimeType`
//! - Function declarations and `functionCall` parts

use std::time::Duration;

use async_trait::async_trait;
use labprompt_core::error::ProviderError;
use labprompt_core::message::Turn;
use labprompt_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_timeout(api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider whose requests give up after `timeout`.
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Override the API base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn to_api_contents(turns: &[Turn]) -> Vec<GeminiContent> {
        turns
            .iter()
            .map(|turn| {
                let mut parts = Vec::with_capacity(1 + turn.attachments.len());
                if !turn.text.is_empty() || turn.attachments.is_empty() {
                    parts.push(GeminiPart::Text {
                        text: turn.text.clone(),
                    });
                }
                for attachment in &turn.attachments {
                    parts.push(GeminiPart::InlineData {
                        inline_data: InlineData {
                            mime_type: attachment.mime_type.clone(),
                            data: attachment.data.clone(),
                        },
                    });
                }
                GeminiContent {
                    role: Some(turn.role.to_string()),
                    parts,
                }
            })
            .collect()
    }

    /// Build the JSON request body for `request`.
    pub fn build_body(request: &GenerateRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&request.turns),
        });

        if let Some(system) = request.system_instruction.as_deref() {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }

        let mut generation_config = serde_json::json!({ "temperature": request.temperature });
        if let Some(max) = request.max_output_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max);
        }
        if request.response_mode == ResponseMode::Json {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }
        body["generationConfig"] = generation_config;

        if !request.tools.is_empty() {
            let declarations: Vec<FunctionDeclaration> = request
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect();
            body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    /// Map an error response to a [`ProviderError`].
    ///
    /// The message keeps the provider's status string in front
    /// (`"UNAVAILABLE: The model is overloaded."`) so the transient
    /// predicate can see it.
    pub fn map_error(status: u16, body: &str, retry_after: Option<u64>) -> ProviderError {
        let message = serde_json::from_str::<GeminiErrorEnvelope>(body)
            .ok()
            .map(|env| match env.error.status {
                Some(s) if !s.is_empty() => format!("{s}: {}", env.error.message),
                _ => env.error.message,
            })
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            401 | 403 => ProviderError::AuthenticationFailed(message),
            _ => ProviderError::ApiError {
                status_code: status,
                message,
            },
        }
    }

    /// Convert a parsed API response into a [`GenerateResponse`].
    pub fn parse_response(resp: GeminiResponse, model: &str) -> GenerateResponse {
        let mut text = String::new();
        let mut function_calls = Vec::new();

        if let Some(candidate) = resp.candidates.into_iter().next() {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                match part {
                    ResponsePart::FunctionCall { function_call } => {
                        function_calls.push(FunctionCall {
                            name: function_call.name,
                            args: function_call.args,
                        });
                    }
                    ResponsePart::Text { text: t } => text.push_str(&t),
                    ResponsePart::Other(_) => {}
                }
            }
        }

        GenerateResponse {
            text: if text.is_empty() { None } else { Some(text) },
            function_calls,
            usage: resp.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
            model: resp.model_version.unwrap_or_else(|| model.to_string()),
        }
    }
}

#[async_trait]
impl labprompt_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "no Gemini API key configured".into(),
            ));
        }

        let url = self.endpoint(&request.model);
        let body = Self::build_body(&request);

        debug!(
            provider = "gemini",
            model = %request.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(Self::map_error(status, &error_body, retry_after));
        }

        let api_resp: GeminiResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::ApiError {
                    status_code: 200,
                    message: format!("Failed to parse Gemini response: {e}"),
                })?;

        Ok(Self::parse_response(api_resp, &request.model))
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponsePart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: ApiFunctionCall,
    },
    Text {
        text: String,
    },
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use labprompt_core::message::Attachment;
    use labprompt_core::Provider;

    #[test]
    fn constructor() {
        let p = GeminiProvider::new("key");
        assert_eq!(p.name(), "gemini");
        assert_eq!(p.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let p = GeminiProvider::new("key").with_base_url("http://localhost:9999/v1beta/");
        assert_eq!(p.base_url(), "http://localhost:9999/v1beta");
        assert_eq!(
            p.endpoint("gemini-2.5-flash"),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn body_for_plain_text_request() {
        let req = GenerateRequest::text("gemini-2.5-flash", "Hello");
        let body = GeminiProvider::build_body(&req);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("tools").is_none());
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn body_with_system_json_mode_and_attachment() {
        let req = GenerateRequest::text("m", "Read this")
            .with_system_instruction("You are an analyst.")
            .json()
            .with_attachment(Attachment {
                mime_type: "application/pdf".into(),
                data: "JVBERi0=".into(),
            });
        let body = GeminiProvider::build_body(&req);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are an analyst."
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[1]["inlineData"]["data"], "JVBERi0=");
    }

    #[test]
    fn body_with_function_declarations() {
        let req = GenerateRequest::text("m", "add a rule").with_tools(vec![ToolDefinition {
            name: "add_rule".into(),
            description: "Add a rule".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]);
        let body = GeminiProvider::build_body(&req);
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "add_rule"
        );
    }

    #[test]
    fn model_turns_keep_role() {
        let mut req = GenerateRequest::text("m", "first");
        req.turns.push(Turn::model("reply"));
        req.turns.push(Turn::user("second"));
        let body = GeminiProvider::build_body(&req);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "second");
    }

    #[test]
    fn parse_text_response() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hel" }, { "text": "lo" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 3,
                "candidatesTokenCount": 2,
                "totalTokenCount": 5
            },
            "modelVersion": "gemini-2.5-flash-001"
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let out = GeminiProvider::parse_response(resp, "gemini-2.5-flash");
        assert_eq!(out.text.as_deref(), Some("Hello"));
        assert_eq!(out.usage.unwrap().total_tokens, 5);
        assert_eq!(out.model, "gemini-2.5-flash-001");
    }

    #[test]
    fn parse_function_call_response() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "functionCall": { "name": "add_rule", "args": { "rule": "Be brief" } } }
                ]}
            }]
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let out = GeminiProvider::parse_response(resp, "m");
        assert!(out.text.is_none());
        assert_eq!(out.function_calls.len(), 1);
        assert_eq!(out.function_calls[0].args["rule"], "Be brief");
        assert_eq!(out.model, "m");
    }

    #[test]
    fn unknown_parts_are_skipped() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "parts": [
                    { "executableCode": { "language": "PYTHON", "code": "print(1)" } },
                    { "text": "Done" }
                ]}
            }]
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let out = GeminiProvider::parse_response(resp, "m");
        assert_eq!(out.text.as_deref(), Some("Done"));
        assert!(out.function_calls.is_empty());
    }

    #[test]
    fn parse_empty_candidates() {
        let resp: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        let out = GeminiProvider::parse_response(resp, "m");
        assert!(out.require_text().is_err());
    }

    #[test]
    fn error_mapping_keeps_status_marker() {
        let body = r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        let err = GeminiProvider::map_error(503, body, None);
        match &err {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(*status_code, 503);
                assert_eq!(message, "UNAVAILABLE: The model is overloaded.");
            }
            other => panic!("Expected ApiError, got: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[test]
    fn error_mapping_by_status() {
        assert!(matches!(
            GeminiProvider::map_error(429, "", Some(12)),
            ProviderError::RateLimited {
                retry_after_secs: 12
            }
        ));
        assert!(matches!(
            GeminiProvider::map_error(403, "{}", None),
            ProviderError::AuthenticationFailed(_)
        ));
        let err = GeminiProvider::map_error(400, "not json", None);
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.message(), "not json");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let p = GeminiProvider::new("");
        let err = p
            .generate(GenerateRequest::text("m", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
