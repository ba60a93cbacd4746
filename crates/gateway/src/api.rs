//! HTTP API routes.
//!
//! Endpoints:
//!
//! - `POST   /api/generate-prompt`: Expand a brief into a master prompt
//! - `POST   /api/analyze-document`: Pre-fill a brief from an uploaded file
//! - `POST   /api/optimize-prompt`: Rewrite a prompt from reviewer corrections
//! - `POST   /api/chat/sessions`: Start a chat session
//! - `POST   /api/chat/sessions/{id}/messages`: Send a message in a session
//! - `DELETE /api/chat/sessions/{id}`: End a session
//! - `POST   /api/voice-command`: Turn speech into brief edits
//! - `POST   /api/admin/users`: Create a user (admin only)
//! - `GET    /api/usage`: Usage records

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{
        FromRequest, Path, State,
        rejection::{BytesRejection, JsonRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use labprompt_backend::{AdminService, NewUser};
use labprompt_core::message::Attachment;
use labprompt_core::prompt::{Correction, MasterPromptFormat, PromptData};
use labprompt_core::session::SessionId;
use labprompt_core::{AuthError, Error};
use labprompt_prompt::VoiceCommand;
use labprompt_quota::UsageRecord;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::service::{DocumentInput, PromptService, SYSTEM_CALLER, VoiceInput};
use crate::sessions::SessionRegistry;

/// Header carrying the caller's API key id for usage accounting.
pub const API_KEY_ID_HEADER: &str = "x-api-key-id";

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the API routes.
pub struct ApiState {
    pub service: Arc<PromptService>,
    pub sessions: SessionRegistry,
    /// `None` when no hosted backend is configured.
    pub admin: Option<Arc<AdminService>>,
}

pub type SharedApiState = Arc<ApiState>;

/// Build the API router. Nest this under "/api" in the main router.
pub fn api_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/generate-prompt", post(generate_prompt_handler))
        .route("/analyze-document", post(analyze_document_handler))
        .route("/optimize-prompt", post(optimize_prompt_handler))
        .route("/chat/sessions", post(create_session_handler))
        .route("/chat/sessions/{id}/messages", post(send_message_handler))
        .route("/chat/sessions/{id}", delete(delete_session_handler))
        .route("/voice-command", post(voice_command_handler))
        .route("/admin/users", post(create_user_handler))
        .route("/usage", get(usage_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// An error on its way out as `(status, {success: false, error})`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// HTTP status for a domain error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::Auth(AuthError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
        Error::Auth(AuthError::Forbidden(_)) => StatusCode::FORBIDDEN,
        Error::Provider(e) => match e.status_code() {
            Some(503) => StatusCode::SERVICE_UNAVAILABLE,
            Some(429) => StatusCode::TOO_MANY_REQUESTS,
            Some(400) => StatusCode::BAD_REQUEST,
            Some(401 | 403) => StatusCode::UNAUTHORIZED,
            _ if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        Error::Parse(_)
        | Error::Backend(_)
        | Error::Config { .. }
        | Error::Serialization(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %err, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %err, "Request rejected");
        }
        Self::new(status, err.to_string())
    }
}

/// Malformed or oversized bodies keep the JSON error shape. Anything
/// other than the body limit is the client's fault.
fn rejection_status(status: StatusCode) -> StatusCode {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        status
    } else {
        StatusCode::BAD_REQUEST
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection_status(rejection.status());
        warn!(status = status.as_u16(), error = %rejection.body_text(), "Request body rejected");
        Self::new(status, rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        let status = rejection_status(rejection.status());
        warn!(status = status.as_u16(), error = %rejection.body_text(), "Request body rejected");
        Self::new(status, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Json` whose rejection is an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

/// The caller's usage key from `X-Api-Key-Id`, or the system key.
fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get(API_KEY_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(SYSTEM_CALLER)
        .to_string()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePromptResponse {
    pub success: bool,
    pub prompt: String,
    pub format: MasterPromptFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeDocumentRequest {
    file_base64: String,
    mime_type: String,
    #[serde(default)]
    file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizePromptRequest {
    current_prompt: String,
    #[serde(default)]
    corrections: Vec<Correction>,
    #[serde(default)]
    format: MasterPromptFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    #[serde(default, alias = "systemInstruction")]
    system_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub reply: String,
    pub exchanges: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceCommandRequest {
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct VoiceCommandData {
    commands: Vec<VoiceCommand>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub success: bool,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct UsageResponse {
    records: Vec<UsageRecord>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn generate_prompt_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    ApiJson(data): ApiJson<PromptData>,
) -> ApiResult<GeneratePromptResponse> {
    let caller = caller_id(&headers);
    info!(caller = %caller, format = %data.master_prompt_format, "generate-prompt request");

    let generated = state.service.generate(&caller, &data).await?;
    Ok(Json(GeneratePromptResponse {
        success: true,
        prompt: generated.text,
        format: generated.format,
        warning: generated.warning,
    }))
}

async fn analyze_document_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<AnalyzeDocumentRequest>,
) -> ApiResult<DataResponse<PromptData>> {
    let caller = caller_id(&headers);
    let data = state
        .service
        .analyze_document(
            &caller,
            DocumentInput {
                file_base64: payload.file_base64,
                mime_type: payload.mime_type,
                file_name: payload.file_name,
            },
        )
        .await?;
    Ok(DataResponse::ok(data))
}

async fn optimize_prompt_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<OptimizePromptRequest>,
) -> ApiResult<GeneratePromptResponse> {
    let caller = caller_id(&headers);
    info!(
        caller = %caller,
        corrections = payload.corrections.len(),
        "optimize-prompt request"
    );

    let optimized = state
        .service
        .optimize(
            &caller,
            &payload.current_prompt,
            &payload.corrections,
            payload.format,
        )
        .await?;
    Ok(Json(GeneratePromptResponse {
        success: true,
        prompt: optimized.text,
        format: optimized.format,
        warning: optimized.warning,
    }))
}

async fn create_session_handler(
    State(state): State<SharedApiState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    // The body is optional; an empty one starts a session with no system prompt.
    let body = body?;
    let payload: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid body: {e}")))?
    };
    let id = state.sessions.create(payload.system_prompt).await;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            success: true,
            session_id: id.to_string(),
        }),
    ))
}

async fn send_message_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SendMessageRequest>,
) -> ApiResult<SendMessageResponse> {
    let handle = state
        .sessions
        .get(&SessionId::from(&id))
        .await
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown session: {id}")))?;

    let caller = caller_id(&headers);
    let mut session = handle.lock().await;
    let reply = state
        .service
        .chat(&caller, &mut session, &payload.message)
        .await?;

    Ok(Json(SendMessageResponse {
        success: true,
        reply,
        exchanges: session.exchange_count(),
    }))
}

async fn delete_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.sessions.remove(&SessionId::from(&id)).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn voice_command_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<VoiceCommandRequest>,
) -> Result<Json<DataResponse<VoiceCommandData>>, ApiError> {
    let caller = caller_id(&headers);
    let audio = payload.audio_base64.map(|data| Attachment {
        mime_type: payload
            .mime_type
            .unwrap_or_else(|| "audio/webm".to_string()),
        data,
    });

    let commands = state
        .service
        .voice_command(
            &caller,
            VoiceInput {
                transcript: payload.transcript,
                audio,
            },
        )
        .await?;
    Ok(DataResponse::ok(VoiceCommandData { commands }))
}

async fn create_user_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ApiError> {
    let admin = state.admin.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "user administration requires a configured backend",
        )
    })?;

    let token = bearer_token(&headers).unwrap_or_default();
    let user = admin.create_user(token, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            success: true,
            user_id: user.id,
            email: user.email,
        }),
    ))
}

async fn usage_handler(State(state): State<SharedApiState>) -> ApiResult<UsageResponse> {
    let records = state.service.usage().await?;
    Ok(Json(UsageResponse { records }))
}
