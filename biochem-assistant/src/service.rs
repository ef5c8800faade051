use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
};
use analysis_flow::{FlowError, InMemorySessionStorage};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    assistant::Assistant,
    client::{GeminiClient, InferenceClient},
    config::Config,
    error::{ActionError, AssistantError, Result},
    export::export_file_name,
    models::{AnalyzeRequest, DemoRequest, QueryRequest, SelectFilesRequest, SessionView},
};

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "details": format!("session_id: {}", id)
        })),
    )
}

/// Map an action failure to its status code and a `{error, details}` body.
fn action_error(err: ActionError, session_id: &str) -> ApiError {
    let status = match &err {
        ActionError::Assistant(e) => match e {
            AssistantError::FileNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AssistantError::UpstreamError { .. } | AssistantError::MalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            AssistantError::NetworkFailure(_) => StatusCode::GATEWAY_TIMEOUT,
            AssistantError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AssistantError::Io { .. }
            | AssistantError::MissingCredential
            | AssistantError::InvalidConfig(_)
            | AssistantError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ActionError::Flow(FlowError::SessionNotFound(_)) => {
            return not_found_error("Session not found", session_id);
        }
        ActionError::Flow(FlowError::Superseded(_)) => StatusCode::CONFLICT,
        ActionError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(session_id, kind = err.kind(), error = %err, "action failed");
    } else {
        warn!(session_id, kind = err.kind(), error = %err, "action rejected");
    }

    (
        status,
        Json(json!({
            "error": err.kind(),
            "details": err.to_string()
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub assistant: Assistant,
}

impl AppState {
    pub fn new(client: Arc<dyn InferenceClient>, config: &Config) -> Self {
        Self {
            assistant: Assistant::new(client, Arc::new(InMemorySessionStorage::new()), config),
        }
    }
}

pub fn create_app(config: &Config) -> Result<Router> {
    let client = Arc::new(GeminiClient::new(config)?);
    Ok(build_router(AppState::new(client, config)))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route(
            "/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route("/sessions/{session_id}/result", delete(clear_result))
        .route("/sessions/{session_id}/files", put(select_files))
        .route("/sessions/{session_id}/analyze", post(analyze))
        .route("/sessions/{session_id}/demo", post(run_demo))
        .route("/sessions/{session_id}/query", post(query))
        .route("/sessions/{session_id}/export", get(export))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "BioChem Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Model-assisted interpretation of biochemical lab data",
        "endpoints": {
            "POST /sessions": "Create a session",
            "GET /sessions/{session_id}": "Session state and current result",
            "DELETE /sessions/{session_id}": "Delete a session",
            "DELETE /sessions/{session_id}/result": "Clear the current result",
            "PUT /sessions/{session_id}/files": "Replace the selected files",
            "POST /sessions/{session_id}/analyze": "Analyze the selected files",
            "POST /sessions/{session_id}/demo": "Analyze the bundled sample file",
            "POST /sessions/{session_id}/query": "Ask a follow-up question",
            "GET /sessions/{session_id}/export": "Download the last response as text",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_session(State(state): State<AppState>) -> ApiResult<Value> {
    let session_id = state
        .assistant
        .create_session()
        .await
        .map_err(|e| action_error(e, ""))?;

    Ok(Json(json!({ "session_id": session_id })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    state
        .assistant
        .view(&session_id)
        .await
        .map(Json)
        .map_err(|e| action_error(e, &session_id))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    state
        .assistant
        .delete_session(&session_id)
        .await
        .map_err(|e| action_error(e, &session_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    state
        .assistant
        .clear_result(&session_id)
        .await
        .map_err(|e| action_error(e, &session_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn select_files(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SelectFilesRequest>,
) -> ApiResult<SessionView> {
    let assistant = &state.assistant;
    assistant
        .select_files(&session_id, request.files)
        .await
        .map_err(|e| action_error(e, &session_id))?;
    assistant
        .view(&session_id)
        .await
        .map(Json)
        .map_err(|e| action_error(e, &session_id))
}

async fn analyze(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    request: Option<Json<AnalyzeRequest>>,
) -> ApiResult<Value> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    info!(
        session_id = %session_id,
        analysis_type = %request.analysis_type,
        "starting analysis"
    );

    let analysis = state
        .assistant
        .analyze(&session_id, request)
        .await
        .map_err(|e| action_error(e, &session_id))?;

    Ok(Json(json!({
        "session_id": session_id,
        "analysis": analysis
    })))
}

async fn run_demo(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    request: Option<Json<DemoRequest>>,
) -> ApiResult<Value> {
    let language = request.and_then(|Json(r)| r.language);
    info!(session_id = %session_id, "starting demo analysis");

    let analysis = state
        .assistant
        .run_demo(&session_id, language)
        .await
        .map_err(|e| action_error(e, &session_id))?;

    Ok(Json(json!({
        "session_id": session_id,
        "analysis": analysis
    })))
}

async fn query(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Value> {
    let answer = state
        .assistant
        .ask(&session_id, &request.question, request.language)
        .await
        .map_err(|e| action_error(e, &session_id))?;

    Ok(Json(json!({
        "session_id": session_id,
        "answer": answer
    })))
}

async fn export(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let text = state
        .assistant
        .export(&session_id)
        .await
        .map_err(|e| action_error(e, &session_id))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "nothing_to_export",
                    "details": "The session has no response yet"
                })),
            )
        })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(chrono::Utc::now())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}
