// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boundary translation: error kinds to status codes and JSON bodies.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API-facing error with a status code and a JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: serde_json::Value,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "ok": false, "error": message.into() }),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<precog_core::Error> for ApiError {
    fn from(err: precog_core::Error) -> Self {
        use precog_core::Error;
        match &err {
            Error::Validation(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            Error::Auth(_) => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            Error::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            Error::Conflict(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            Error::RateLimited { retry_after_secs } => Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: json!({
                    "ok": false,
                    "error": "rate limit exceeded",
                    "retry_after": retry_after_secs,
                }),
                retry_after_secs: Some(*retry_after_secs),
            },
            Error::UpstreamFetch(_) => Self::new(StatusCode::BAD_GATEWAY, err.to_string()),
            Error::QaGate {
                errors,
                fix_suggestions,
            } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({
                    "ok": false,
                    "errors": errors,
                    "fix_suggestions": fix_suggestions,
                }),
                retry_after_secs: None,
            },
            Error::Processor(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::TransientInfra(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        }
    }
}

impl From<precog_store::StoreError> for ApiError {
    fn from(err: precog_store::StoreError) -> Self {
        precog_core::Error::from(err).into()
    }
}

impl From<precog_ingest::IngestError> for ApiError {
    fn from(err: precog_ingest::IngestError) -> Self {
        precog_core::Error::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut resp = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert("retry-after", value);
            }
        }
        resp
    }
}
