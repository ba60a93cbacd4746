//! The request pipeline shared by every route that calls the model.
//!
//! Each flow builds a [`GenerateRequest`], then goes through the same
//! sequence in [`PromptService::call`]: quota pre-check, provider call
//! through a [`RetryingProvider`], background usage recording. Flow-specific
//! post-processing (normalization, parsing) happens afterwards.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use labprompt_config::{AppConfig, GenerationConfig};
use labprompt_core::error::ValidationError;
use labprompt_core::message::{Attachment, Turn};
use labprompt_core::prompt::{Correction, GeneratedPrompt, MasterPromptFormat, PromptData};
use labprompt_core::provider::{GenerateRequest, GenerateResponse, Provider};
use labprompt_core::session::ChatSession;
use labprompt_core::{Error, Result};
use labprompt_prompt::voice::{self, VoiceCommand};
use labprompt_prompt::{TargetFormat, analysis, build_generation_prompt, normalize};
use labprompt_providers::{RetryPolicy, RetryingProvider};
use labprompt_quota::{
    AllowanceService, CharHeuristicEstimator, InMemoryUsageStore, LimitAllowance, QuotaGuard,
    UsageKey, UsageRecord, UsageStore,
};
use tracing::{debug, info, warn};

/// Usage key used when the caller does not identify an API key.
pub const SYSTEM_CALLER: &str = "system";

/// An uploaded document, base64-encoded.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub file_base64: String,
    pub mime_type: String,
    pub file_name: String,
}

/// A voice command: a transcript, or recorded audio for the model to hear.
#[derive(Debug, Clone, Default)]
pub struct VoiceInput {
    pub transcript: Option<String>,
    pub audio: Option<Attachment>,
}

/// Orchestrates model calls for all routes.
pub struct PromptService {
    provider: RetryingProvider,
    model: String,
    temperature: f32,
    quota: QuotaGuard,
    generation: GenerationConfig,
    max_document_bytes: usize,
}

impl PromptService {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, quota: QuotaGuard) -> Self {
        Self {
            provider: RetryingProvider::new(provider, RetryPolicy::default()),
            model: model.into(),
            temperature: 0.7,
            quota,
            generation: GenerationConfig::default(),
            max_document_bytes: 10 * 1024 * 1024,
        }
    }

    /// Build the service from configuration, with an in-process usage
    /// store and the configured static limits.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Self {
        let store: Arc<dyn UsageStore> = Arc::new(InMemoryUsageStore::new());
        let allowance: Arc<dyn AllowanceService> =
            Arc::new(LimitAllowance::new(&config.quota, store.clone()));
        let quota = QuotaGuard::new(Arc::new(CharHeuristicEstimator), allowance, store)
            .with_enabled(config.quota.enabled);
        Self::new(provider, &config.provider.model, quota).with_settings(config)
    }

    /// Apply the non-quota settings from `config`.
    pub fn with_settings(mut self, config: &AppConfig) -> Self {
        self.temperature = config.provider.temperature;
        self.provider = self.provider.with_policy(RetryPolicy::from_config(&config.retry));
        self.generation = config.generation.clone();
        self.max_document_bytes = config.gateway.max_document_bytes;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.provider = self.provider.with_policy(retry);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.provider.policy()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn usage_key(&self, caller: &str) -> UsageKey {
        let caller = caller.trim();
        let caller = if caller.is_empty() { SYSTEM_CALLER } else { caller };
        UsageKey::new(caller, self.provider.name())
    }

    fn request(&self, text: impl Into<String>) -> GenerateRequest {
        GenerateRequest::text(&self.model, text).with_temperature(self.temperature)
    }

    /// Quota pre-check, provider call with retry, usage recording.
    pub async fn call(&self, caller: &str, request: GenerateRequest) -> Result<GenerateResponse> {
        let key = self.usage_key(caller);
        let outgoing = request.outgoing_text();
        let estimate = self.quota.precheck(&key, &outgoing, None).await?;

        debug!(
            provider = %self.provider.name(),
            model = %request.model,
            estimated_tokens = estimate,
            "Calling provider"
        );

        let response = self.provider.generate(request).await?;

        let incoming = match response.text.as_deref() {
            Some(text) => text.to_string(),
            None if !response.function_calls.is_empty() => {
                serde_json::to_string(&response.function_calls)?
            }
            None => String::new(),
        };
        self.quota.record(key, &outgoing, &incoming);

        Ok(response)
    }

    /// Target size for the master prompt: the configured default for 0,
    /// clamped to the configured maximum.
    pub fn resolve_prompt_size(&self, requested: usize) -> usize {
        if requested == 0 {
            return self.generation.default_prompt_size;
        }
        if requested > self.generation.max_prompt_size {
            warn!(
                requested,
                max = self.generation.max_prompt_size,
                "Requested prompt size above maximum, clamping"
            );
            return self.generation.max_prompt_size;
        }
        requested
    }

    /// Expand a brief into a master prompt.
    pub async fn generate(&self, caller: &str, data: &PromptData) -> Result<GeneratedPrompt> {
        let target = self.resolve_prompt_size(data.prompt_size);
        let format = data.master_prompt_format;
        let instruction = build_generation_prompt(data, target)?;

        let mut request = self.request(instruction);
        if format == MasterPromptFormat::Json {
            request = request.json();
        }

        let response = self.call(caller, request).await?;
        let text = response.require_text()?;
        let normalized = normalize(text, TargetFormat::from(format));

        info!(
            format = %format,
            target_chars = target,
            chars = normalized.text.chars().count(),
            "Master prompt generated"
        );

        Ok(GeneratedPrompt {
            text: normalized.text,
            format,
            warning: normalized.warning,
        })
    }

    /// Extract a partial brief from an uploaded document.
    pub async fn analyze_document(&self, caller: &str, doc: DocumentInput) -> Result<PromptData> {
        analysis::check_mime(&doc.mime_type)?;

        let payload = strip_data_url(&doc.file_base64);
        let size = self.decoded_size("fileBase64", payload)?;

        info!(file = %doc.file_name, mime = %doc.mime_type, size, "Analyzing document");

        let request = self
            .request(analysis::extraction_instruction(&doc.file_name))
            .json()
            .with_attachment(Attachment {
                mime_type: doc.mime_type,
                data: payload.to_string(),
            });

        let response = self.call(caller, request).await?;
        analysis::parse_extracted(response.require_text()?)
    }

    /// Rewrite a prompt so it produces the corrected responses.
    pub async fn optimize(
        &self,
        caller: &str,
        current_prompt: &str,
        corrections: &[Correction],
        format: MasterPromptFormat,
    ) -> Result<GeneratedPrompt> {
        let instruction =
            labprompt_prompt::refactor_instruction(current_prompt, corrections, format)?;

        let mut request = self.request(instruction);
        if format == MasterPromptFormat::Json {
            request = request.json();
        }

        let response = self.call(caller, request).await?;
        let normalized = normalize(response.require_text()?, TargetFormat::from(format));
        Ok(GeneratedPrompt {
            text: normalized.text,
            format,
            warning: normalized.warning,
        })
    }

    /// Send `message` within `session` and record both turns.
    ///
    /// On failure the session is left unchanged.
    pub async fn chat(&self, caller: &str, session: &mut ChatSession, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::MissingField("message").into());
        }

        let request = session
            .request_for(&self.model, message)
            .with_temperature(self.temperature);
        let response = self.call(caller, request).await?;
        let reply = response.require_text()?.trim().to_string();

        session.push(Turn::user(message));
        session.push(Turn::model(&reply));
        debug!(session = %session.id, exchanges = session.exchange_count(), "Chat turn recorded");
        Ok(reply)
    }

    /// Turn a spoken request into brief edits.
    ///
    /// Calls the model makes with unknown names or bad arguments are
    /// dropped with a warning.
    pub async fn voice_command(&self, caller: &str, input: VoiceInput) -> Result<Vec<VoiceCommand>> {
        let transcript = input.transcript.as_deref().filter(|t| !t.trim().is_empty());
        if transcript.is_none() && input.audio.is_none() {
            return Err(ValidationError::MissingField("transcript").into());
        }

        let mut request = self
            .request(voice::instruction(transcript))
            .with_tools(voice::command_declarations());
        if let Some(audio) = input.audio {
            check_audio_mime(&audio.mime_type)?;
            let data = strip_data_url(&audio.data).to_string();
            let size = self.decoded_size("audioBase64", &data)?;
            debug!(mime = %audio.mime_type, size, "Voice command carries audio");
            request = request.with_attachment(Attachment {
                mime_type: audio.mime_type,
                data,
            });
        }

        let response = self.call(caller, request).await?;
        let commands = response
            .function_calls
            .iter()
            .filter_map(|call| match VoiceCommand::from_call(call) {
                Ok(cmd) => Some(cmd),
                Err(e) => {
                    warn!(function = %call.name, error = %e, "Dropping invalid voice command");
                    None
                }
            })
            .collect();
        Ok(commands)
    }

    /// Usage recorded so far.
    pub async fn usage(&self) -> Result<Vec<UsageRecord>> {
        self.quota.usage().await
    }

    /// Decode an inline base64 payload and check it against the document
    /// size limit. Returns the decoded size in bytes.
    fn decoded_size(&self, field: &'static str, payload: &str) -> Result<usize> {
        let bytes = BASE64
            .decode(payload)
            .map_err(|_| ValidationError::Invalid(format!("{field} is not valid base64")))?;
        if bytes.is_empty() {
            return Err(ValidationError::MissingField(field).into());
        }
        if bytes.len() > self.max_document_bytes {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_document_bytes,
            });
        }
        Ok(bytes.len())
    }
}

fn check_audio_mime(mime_type: &str) -> std::result::Result<(), ValidationError> {
    if mime_type.trim().to_ascii_lowercase().starts_with("audio/") {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFile(mime_type.to_string()))
    }
}

/// Drop a `data:<mime>;base64,` prefix if the client sent a data URL.
fn strip_data_url(input: &str) -> &str {
    let trimmed = input.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload;
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use labprompt_core::error::ProviderError;
    use labprompt_core::provider::FunctionCall;
    use labprompt_quota::{Allowance, QuotaError, Unlimited};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses and records every request it receives.
    struct ScriptedProvider {
        script: Mutex<Vec<std::result::Result<GenerateResponse, ProviderError>>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<std::result::Result<GenerateResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn text(text: &str) -> Self {
            Self::new(vec![Ok(GenerateResponse::from_text("mock", text))])
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> GenerateRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> std::result::Result<GenerateResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    struct DenyAll;

    #[async_trait]
    impl AllowanceService for DenyAll {
        async fn check(&self, _key: &UsageKey, _estimate: u64) -> std::result::Result<Allowance, QuotaError> {
            Ok(Allowance::deny("free plan exhausted"))
        }
    }

    fn service(provider: Arc<ScriptedProvider>) -> PromptService {
        PromptService::new(provider, "mock-model", QuotaGuard::unlimited())
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)))
    }

    fn brief() -> PromptData {
        PromptData {
            persona: "X".into(),
            objective: "Y".into(),
            business_context: "Z".into(),
            interaction_context: "W".into(),
            rules: vec!["R1".into()],
            prompt_size: 1000,
            ..PromptData::default()
        }
    }

    #[tokio::test]
    async fn generate_markdown_passes_text_through() {
        let provider = Arc::new(ScriptedProvider::text("Hello"));
        let svc = service(provider.clone());

        let out = svc.generate(SYSTEM_CALLER, &brief()).await.unwrap();
        assert_eq!(out.text, "Hello");
        assert_eq!(out.format, MasterPromptFormat::Markdown);
        assert!(out.warning.is_none());

        let req = provider.last_request();
        assert!(req.turns[0].text.contains("approximately 1000 characters"));
        assert!(req.turns[0].text.contains("- R1"));
    }

    #[tokio::test]
    async fn generate_json_requests_json_mode_and_pretty_prints() {
        let provider = Arc::new(ScriptedProvider::text("```json\n{\"persona\":\"X\"}\n```"));
        let svc = service(provider.clone());
        let mut data = brief();
        data.master_prompt_format = MasterPromptFormat::Json;

        let out = svc.generate(SYSTEM_CALLER, &data).await.unwrap();
        assert_eq!(out.text, "{\n  \"persona\": \"X\"\n}");
        assert_eq!(
            provider.last_request().response_mode,
            labprompt_core::ResponseMode::Json
        );
    }

    #[tokio::test]
    async fn validation_failure_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::text("Hello"));
        let svc = service(provider.clone());
        let mut data = brief();
        data.business_context = "  ".into();

        let err = svc.generate(SYSTEM_CALLER, &data).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField("business context"))
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn quota_denial_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::text("Hello"));
        let quota = QuotaGuard::new(
            Arc::new(CharHeuristicEstimator),
            Arc::new(DenyAll),
            Arc::new(InMemoryUsageStore::new()),
        );
        let svc = PromptService::new(provider.clone(), "mock-model", quota);

        let err = svc.generate(SYSTEM_CALLER, &brief()).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { reason } if reason == "free plan exhausted"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let overloaded = ProviderError::ApiError {
            status_code: 503,
            message: "UNAVAILABLE: overloaded".into(),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(overloaded.clone()),
            Err(overloaded),
            Ok(GenerateResponse::from_text("mock", "Hello")),
        ]));
        let svc = service(provider.clone());

        let out = svc.generate(SYSTEM_CALLER, &brief()).await.unwrap();
        assert_eq!(out.text, "Hello");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let provider = Arc::new(ScriptedProvider::text("   "));
        let svc = service(provider);
        let err = svc.generate(SYSTEM_CALLER, &brief()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::EmptyResponse)));
    }

    #[tokio::test]
    async fn usage_is_recorded_per_caller() {
        let provider = Arc::new(ScriptedProvider::text("Hello"));
        let svc = PromptService::new(
            provider,
            "mock-model",
            QuotaGuard::new(
                Arc::new(CharHeuristicEstimator),
                Arc::new(Unlimited),
                Arc::new(InMemoryUsageStore::new()),
            ),
        );
        svc.generate("key-1", &brief()).await.unwrap();

        // Recording runs in the background.
        for _ in 0..50 {
            if !svc.usage().await.unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let usage = svc.usage().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].key, UsageKey::new("key-1", "mock"));
        assert_eq!(usage[0].calls, 1);
    }

    #[test]
    fn prompt_size_resolution() {
        let svc = service(Arc::new(ScriptedProvider::text("x")));
        assert_eq!(svc.resolve_prompt_size(0), 8_000);
        assert_eq!(svc.resolve_prompt_size(1_000), 1_000);
        assert_eq!(svc.resolve_prompt_size(1_000_000), 50_000);
    }

    #[tokio::test]
    async fn analyze_document_sends_inline_file() {
        let provider = Arc::new(ScriptedProvider::text(
            r#"{"persona": "Barista", "rules": ["Be kind"]}"#,
        ));
        let svc = service(provider.clone());

        let data = svc
            .analyze_document(
                SYSTEM_CALLER,
                DocumentInput {
                    file_base64: format!("data:text/plain;base64,{}", BASE64.encode("menu")),
                    mime_type: "text/plain".into(),
                    file_name: "menu.txt".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(data.persona, "Barista");

        let req = provider.last_request();
        assert_eq!(req.response_mode, labprompt_core::ResponseMode::Json);
        assert_eq!(req.turns[0].attachments[0].data, BASE64.encode("menu"));
    }

    #[tokio::test]
    async fn analyze_document_rejects_bad_input_before_calling() {
        let provider = Arc::new(ScriptedProvider::text("{}"));
        let svc = service(provider.clone());

        let unsupported = DocumentInput {
            file_base64: BASE64.encode("x"),
            mime_type: "application/zip".into(),
            file_name: "a.zip".into(),
        };
        assert!(matches!(
            svc.analyze_document(SYSTEM_CALLER, unsupported).await,
            Err(Error::Validation(ValidationError::UnsupportedFile(_)))
        ));

        let garbage = DocumentInput {
            file_base64: "%%%not-base64%%%".into(),
            mime_type: "text/plain".into(),
            file_name: "a.txt".into(),
        };
        assert!(matches!(
            svc.analyze_document(SYSTEM_CALLER, garbage).await,
            Err(Error::Validation(ValidationError::Invalid(_)))
        ));

        let mut small = AppConfig::default();
        small.gateway.max_document_bytes = 4;
        let svc = service(provider.clone()).with_settings(&small);
        let big = DocumentInput {
            file_base64: BASE64.encode("0123456789"),
            mime_type: "text/plain".into(),
            file_name: "a.txt".into(),
        };
        assert!(matches!(
            svc.analyze_document(SYSTEM_CALLER, big).await,
            Err(Error::PayloadTooLarge { size: 10, limit: 4 })
        ));

        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn chat_keeps_history_per_session() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(GenerateResponse::from_text("mock", "Hi! What can I get you?")),
            Ok(GenerateResponse::from_text("mock", "One latte coming up.")),
        ]));
        let svc = service(provider.clone());
        let mut session = ChatSession::new(Some("You are a barista.".into()));

        svc.chat(SYSTEM_CALLER, &mut session, "hello").await.unwrap();
        let reply = svc
            .chat(SYSTEM_CALLER, &mut session, "a latte")
            .await
            .unwrap();

        assert_eq!(reply, "One latte coming up.");
        assert_eq!(session.history.len(), 4);
        let req = provider.last_request();
        assert_eq!(req.turns.len(), 3);
        assert_eq!(req.system_instruction.as_deref(), Some("You are a barista."));
    }

    #[tokio::test]
    async fn failed_chat_turn_leaves_session_untouched() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let svc = service(provider);
        let mut session = ChatSession::new(None);

        assert!(svc.chat(SYSTEM_CALLER, &mut session, "hi").await.is_err());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn voice_command_parses_function_calls() {
        let response = GenerateResponse {
            text: None,
            function_calls: vec![
                FunctionCall {
                    name: "add_rule".into(),
                    args: serde_json::json!({"rule": "Always greet"}),
                },
                FunctionCall {
                    name: "launch_rocket".into(),
                    args: serde_json::json!({}),
                },
            ],
            usage: None,
            model: "mock".into(),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(response)]));
        let svc = service(provider.clone());

        let commands = svc
            .voice_command(
                SYSTEM_CALLER,
                VoiceInput {
                    transcript: Some("add a rule to always greet".into()),
                    audio: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            commands,
            vec![VoiceCommand::AddRule {
                rule: "Always greet".into()
            }]
        );
        assert_eq!(provider.last_request().tools.len(), 6);
    }

    fn audio(mime_type: &str, data: String) -> VoiceInput {
        VoiceInput {
            transcript: None,
            audio: Some(Attachment {
                mime_type: mime_type.into(),
                data,
            }),
        }
    }

    #[tokio::test]
    async fn voice_audio_is_checked_before_calling() {
        let provider = Arc::new(ScriptedProvider::text("x"));
        let svc = service(provider.clone());

        let pdf = audio("application/pdf", BASE64.encode("%PDF-1.4"));
        assert!(matches!(
            svc.voice_command(SYSTEM_CALLER, pdf).await,
            Err(Error::Validation(ValidationError::UnsupportedFile(_)))
        ));

        let garbage = audio("audio/webm", "%%%not-base64%%%".into());
        assert!(matches!(
            svc.voice_command(SYSTEM_CALLER, garbage).await,
            Err(Error::Validation(ValidationError::Invalid(_)))
        ));

        let mut small = AppConfig::default();
        small.gateway.max_document_bytes = 4;
        let svc = service(provider.clone()).with_settings(&small);
        let long = audio("audio/webm", BASE64.encode("0123456789"));
        assert!(matches!(
            svc.voice_command(SYSTEM_CALLER, long).await,
            Err(Error::PayloadTooLarge { size: 10, limit: 4 })
        ));

        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn voice_audio_data_url_is_sent_bare() {
        let response = GenerateResponse {
            text: None,
            function_calls: Vec::new(),
            usage: None,
            model: "mock".into(),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(response)]));
        let svc = service(provider.clone());

        let input = audio(
            "audio/webm",
            format!("data:audio/webm;base64,{}", BASE64.encode("RIFF")),
        );
        let commands = svc.voice_command(SYSTEM_CALLER, input).await.unwrap();
        assert!(commands.is_empty());

        let sent = &provider.last_request().turns[0].attachments[0];
        assert_eq!(sent.mime_type, "audio/webm");
        assert_eq!(sent.data, BASE64.encode("RIFF"));
    }

    #[test]
    fn retry_policy_follows_settings() {
        let mut config = AppConfig::default();
        config.retry.max_retries = 5;
        config.retry.base_delay_ms = 250;
        let svc = service(Arc::new(ScriptedProvider::text("x"))).with_settings(&config);
        assert_eq!(
            svc.retry_policy(),
            RetryPolicy::new(5, Duration::from_millis(250))
        );
        assert_eq!(svc.provider_name(), "mock");
    }

    #[tokio::test]
    async fn blank_rule_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::text("Hello"));
        let svc = service(provider.clone());
        let mut data = brief();
        data.rules.push("   ".into());

        let err = svc.generate(SYSTEM_CALLER, &data).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Invalid(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn voice_command_requires_input() {
        let provider = Arc::new(ScriptedProvider::text("x"));
        let svc = service(provider.clone());
        let err = svc
            .voice_command(SYSTEM_CALLER, VoiceInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn optimize_requires_corrections() {
        let provider = Arc::new(ScriptedProvider::text("x"));
        let svc = service(provider.clone());
        let err = svc
            .optimize(SYSTEM_CALLER, "prompt", &[], MasterPromptFormat::Markdown)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url(" AAAA "), "AAAA");
    }
}
