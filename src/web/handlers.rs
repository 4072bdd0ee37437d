//! HTTP handlers for the score API

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::any::Any;
use tracing::{debug, error};

use crate::scores::{DecodeError, ExamReport, Score, ScoreQueries, StudentReport};
use crate::store::{StoreError, StoreStats};

/// Shared application state
pub type AppState = ScoreQueries;

/// Generic status/error body
#[derive(Debug, Default, Serialize)]
pub struct GenericResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl GenericResponse {
    fn message(message: impl Into<String>) -> Self {
        GenericResponse {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    fn error(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        GenericResponse {
            message: Some(message.into()),
            error: Some(error.to_string()),
            code: Some(status.as_u16()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StudentListResponse {
    pub students: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExamIdListResponse {
    pub exams: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExamListResponse {
    pub exams: Vec<Score>,
}

/// Errors a handler can answer with
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    MethodNotAllowed,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                GenericResponse::error(StatusCode::BAD_REQUEST, "Bad Request", message),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                GenericResponse::error(StatusCode::NOT_FOUND, "Not Found", "Resource not found"),
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                GenericResponse::error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Not Allowed",
                    "You are not authorized to access this resource",
                ),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GenericResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    "An error has occurred",
                ),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!("Store error: {}", e);
        ApiError::Internal
    }
}

fn parse_exam_id(id: &str) -> Result<i64, ApiError> {
    id.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid exam id '{}'", id)))
}

/// GET /students
pub async fn list_students(
    State(queries): State<AppState>,
) -> Result<Json<StudentListResponse>, ApiError> {
    let students = queries.students()?;
    Ok(Json(StudentListResponse { students }))
}

/// GET /students/:id
pub async fn get_student(
    State(queries): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StudentReport>, ApiError> {
    queries.student(&id)?.map(Json).ok_or(ApiError::NotFound)
}

/// GET /exams
pub async fn list_exam_ids(
    State(queries): State<AppState>,
) -> Result<Json<ExamIdListResponse>, ApiError> {
    let exams = queries.exams()?;
    Ok(Json(ExamIdListResponse { exams }))
}

/// GET /exams/all
pub async fn list_all_scores(
    State(queries): State<AppState>,
) -> Result<Json<ExamListResponse>, ApiError> {
    let exams = queries.all()?;
    Ok(Json(ExamListResponse { exams }))
}

/// GET /exams/:id
pub async fn get_exam(
    State(queries): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExamReport>, ApiError> {
    let exam = parse_exam_id(&id)?;
    queries.exam(exam)?.map(Json).ok_or(ApiError::NotFound)
}

/// DELETE /exams/:id
pub async fn delete_exam(
    State(queries): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GenericResponse>, ApiError> {
    let exam = parse_exam_id(&id)?;
    let removed = queries.delete_exam(exam)?;
    Ok(Json(GenericResponse::message(format!(
        "Successfully deleted {} exams",
        removed
    ))))
}

/// POST /exams
pub async fn add_exam(
    State(queries): State<AppState>,
    body: Bytes,
) -> Result<Json<GenericResponse>, ApiError> {
    let score = Score::from_json(&body).map_err(|e| match e {
        DecodeError::Json(e) => {
            debug!("Rejecting request body: {}", e);
            ApiError::BadRequest("unable to parse request".to_string())
        }
        DecodeError::Invalid(e) => ApiError::BadRequest(e.to_string()),
    })?;

    let exam = score.exam;
    queries.add(score)?;

    Ok(Json(GenericResponse::message(format!(
        "Successfully added exam: {}",
        exam
    ))))
}

/// GET /stats
pub async fn stats_handler(State(queries): State<AppState>) -> Json<StoreStats> {
    Json(queries.stats())
}

/// Fallback for unknown paths
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Fallback for known paths with an unsupported method
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Turn a handler panic into a 500 response
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Recovering from panic in request handler: {}", detail);

    let body = GenericResponse {
        error: Some("Internal Server Error".to_string()),
        ..Default::default()
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
