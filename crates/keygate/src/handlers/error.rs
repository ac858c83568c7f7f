//! api error handling for http handlers

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use keygate_access::{AccessError, CascadeAborted};

/// api error type for handler responses
#[derive(Debug)]
pub enum ApiError {
    /// malformed request (400)
    BadRequest(String),
    /// missing user, server or grant (404)
    NotFound(String),
    /// uniqueness violation or protected resource (409)
    Conflict(String),
    /// classified access failure
    Access(AccessError),
    /// internal server error (500)
    Internal(String),
}

impl ApiError {
    /// create bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// create not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// create conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// create internal server error from any error type
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        Self::Access(err)
    }
}

impl From<keygate_db::Error> for ApiError {
    fn from(err: keygate_db::Error) -> Self {
        match err {
            keygate_db::Error::NotFound(msg) => Self::NotFound(msg),
            keygate_db::Error::Conflict(msg) => Self::Conflict(msg),
            other => Self::internal(other),
        }
    }
}

fn access_status(err: &AccessError) -> StatusCode {
    match err {
        AccessError::Validation(_) => StatusCode::BAD_REQUEST,
        AccessError::UserNotFound(_)
        | AccessError::ServerNotFound(_)
        | AccessError::GrantNotFound(_) => StatusCode::NOT_FOUND,
        AccessError::Connection { .. }
        | AccessError::RemoteCommand { .. }
        | AccessError::CascadeAborted(_) => StatusCode::BAD_GATEWAY,
        AccessError::Persistence { .. } | AccessError::Consistency { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AccessError::Store(e) if e.is_conflict() => StatusCode::CONFLICT,
        AccessError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
        AccessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cascade_report(report: &CascadeAborted) -> Value {
    json!({
        "subject": report.subject,
        "revoked": report.revoked,
        "failed": report.failed,
        "failure": {
            "error": report.error.kind(),
            "message": report.error.to_string(),
        },
        "not_attempted": report.not_attempted,
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "bad_request", "message": msg }),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": msg }),
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                json!({ "error": "conflict", "message": msg }),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal", "message": msg }),
            ),
            ApiError::Access(err) => {
                let mut body = json!({ "error": err.kind(), "message": err.to_string() });
                if let Some(divergence) = err.divergence() {
                    body["divergence"] = json!(divergence);
                }
                if let AccessError::CascadeAborted(report) = &err {
                    body["report"] = cascade_report(report);
                }
                (access_status(&err), body)
            }
        };
        (status, Json(body)).into_response()
    }
}

/// json body extractor that reports malformed input as a 400 [`ApiError`].
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(rejection.body_text())
}
