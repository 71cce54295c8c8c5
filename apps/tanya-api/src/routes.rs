use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tanya_service::{AskRequest, AskResponse, ChatTurn};
use tanya_storage::jobs;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/query", post(query))
        .route("/v1/jobs/{job_id}", get(job_status))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: Option<String>,
    #[serde(rename = "projectId")]
    project_id: Option<String>,
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
    #[serde(default)]
    min_cosine: Option<f32>,
    #[serde(default)]
    top_k: Option<u32>,
    #[serde(rename = "districtHints", default)]
    district_hints: Vec<String>,
    #[serde(rename = "chatHistory", default)]
    chat_history: Option<Vec<ChatTurn>>,
}

impl QueryRequest {
    fn into_ask_request(self) -> Result<AskRequest, ApiError> {
        let query = self
            .query
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| validation_error("query is required."))?
            .to_string();
        let project_id = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| validation_error("projectId is required."))?
            .to_string();

        if let Some(min_cosine) = self.min_cosine
            && !(0.0..=1.0).contains(&min_cosine)
        {
            return Err(validation_error("min_cosine must be in the range 0.0-1.0."));
        }
        if let Some(top_k) = self.top_k
            && !(1..=20).contains(&top_k)
        {
            return Err(validation_error("top_k must be in the range 1-20."));
        }

        Ok(AskRequest {
            query,
            project_id,
            user_id: self.user_id,
            min_cosine: self.min_cosine,
            top_k: self.top_k,
            district_hints: self.district_hints,
            chat_history: self.chat_history,
        })
    }
}

async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    authorize(&state, &headers)?;

    let request = payload.into_ask_request()?;
    let response = state.service.ask(request).await?;

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct JobResponse {
    #[serde(rename = "jobId")]
    job_id: Uuid,
    status: String,
    #[serde(rename = "totalFiles")]
    total_files: i32,
    #[serde(rename = "processedFiles")]
    processed_files: i32,
    #[serde(rename = "successfulFiles")]
    successful_files: i32,
    #[serde(rename = "failedFiles")]
    failed_files: i32,
    #[serde(rename = "totalDocuments")]
    total_documents: i32,
    #[serde(rename = "processedFileNames")]
    processed_file_names: serde_json::Value,
}

async fn job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    authorize(&state, &headers)?;

    let job = jobs::fetch_job(&state.service.db.pool, job_id)
        .await
        .map_err(tanya_service::Error::from)?
        .ok_or_else(|| {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("Unknown job {job_id}."))
        })?;

    Ok(Json(JobResponse {
        job_id: job.job_id,
        status: job.status,
        total_files: job.total_files,
        processed_files: job.processed_files,
        successful_files: job.successful_files,
        failed_files: job.failed_files,
        total_documents: job.total_documents,
        processed_file_names: job.processed_file_names,
    }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.service.cfg.security.api_auth_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if presented == Some(expected) {
        Ok(())
    } else {
        Err(json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Missing or invalid API token."))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    details: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: String,
}

fn json_error(status: StatusCode, error: &str, details: impl Into<String>) -> ApiError {
    ApiError { status, error: error.to_string(), details: details.into() }
}

fn validation_error(details: impl Into<String>) -> ApiError {
    json_error(StatusCode::BAD_REQUEST, "validation_error", details)
}

impl From<tanya_service::Error> for ApiError {
    fn from(err: tanya_service::Error) -> Self {
        use tanya_service::Error;

        match err {
            Error::InvalidRequest { message } => validation_error(message),
            Error::NotFound { message } => {
                json_error(StatusCode::NOT_FOUND, "not_found", message)
            }
            // Message only; full detail stays in the server logs.
            Error::Provider { message } | Error::Storage { message } => {
                tracing::error!(error = %message, "Request failed.");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.error, details: self.details };

        (self.status, Json(body)).into_response()
    }
}
