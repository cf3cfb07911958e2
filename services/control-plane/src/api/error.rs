use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::db::DbError;
use crate::gameservers::GameserverServiceError;
use crate::games::GameError;
use crate::rpc::RpcError;

/// RFC 7807 problem document.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://hearth.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    /// 503 for store failures a retry may get past.
    pub fn unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message);
        err.problem.retryable = true;
        err
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::NotFound(_) => ApiError::not_found("not_found", err.to_string()),
            DbError::AlreadyExists(_) => ApiError::conflict("already_exists", err.to_string()),
            e if e.is_transient() => ApiError::unavailable("store_unavailable", err.to_string()),
            _ => {
                error!(error = %err, "Store error");
                ApiError::internal("internal_error", "internal store error")
            }
        }
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        match &err {
            GameError::UnsupportedGameKind(_) => {
                ApiError::bad_request("unsupported_game_kind", err.to_string())
            }
            GameError::InvalidParameters { .. } => {
                ApiError::bad_request("invalid_parameters", err.to_string())
            }
            GameError::EndpointNotReady(_) => {
                ApiError::unavailable("endpoint_not_ready", err.to_string())
            }
            GameError::DuplicateGameKind(_) => {
                ApiError::internal("internal_error", err.to_string())
            }
        }
    }
}

impl From<GameserverServiceError> for ApiError {
    fn from(err: GameserverServiceError) -> Self {
        match err {
            GameserverServiceError::InvalidRequest(msg) => {
                ApiError::bad_request("invalid_request", msg)
            }
            GameserverServiceError::Game(e) => e.into(),
            GameserverServiceError::NotFound(uuid) => {
                ApiError::not_found("gameserver_not_found", format!("gameserver {uuid} not found"))
            }
            GameserverServiceError::Store(e) => e.into(),
        }
    }
}

impl From<RpcError> for ApiError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::InvalidArgument(msg) => ApiError::bad_request("invalid_argument", msg),
            RpcError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
