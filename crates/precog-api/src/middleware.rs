// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack: request ids, request logging, bearer auth, CORS.

use crate::error::ApiError;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use precog_core::PlatformConfig;
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request id + logging
// ---------------------------------------------------------------------------

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Generates a [`RequestId`] per request and sets `x-request-id`, logging
/// method, path, status, and duration on completion.
pub async fn observe_request(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        resp.headers_mut().insert("x-request-id", value);
    }
    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

// ---------------------------------------------------------------------------
// Bearer auth
// ---------------------------------------------------------------------------

/// Enforce the shared bearer secret, when one is configured.
///
/// The token is accepted from the `Authorization: Bearer` header or, for
/// browser event sources that cannot set headers, from `query_token`.
pub fn check_bearer(
    config: &PlatformConfig,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = config.bearer_token.as_deref() else {
        return Ok(());
    };

    let header_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match header_token.or(query_token) {
        Some(provided) if provided == expected => Ok(()),
        Some(_) => Err(ApiError::auth("invalid token")),
        None => Err(ApiError::auth("missing bearer token")),
    }
}

/// Best-effort client address for rate limiting: the first
/// `x-forwarded-for` entry, else a process-local placeholder (direct
/// connections on a trusted network all share one bucket).
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "local".to_string())
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// Build the CORS layer from the configured origin list.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(token: Option<&str>) -> PlatformConfig {
        let mut config = PlatformConfig::default();
        config.bearer_token = token.map(str::to_string);
        config
    }

    #[test]
    fn no_configured_token_allows_everything() {
        let headers = HeaderMap::new();
        assert!(check_bearer(&config_with_token(None), &headers, None).is_ok());
    }

    #[test]
    fn header_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(check_bearer(&config_with_token(Some("s3cret")), &headers, None).is_ok());
    }

    #[test]
    fn query_token_is_accepted() {
        let headers = HeaderMap::new();
        assert!(check_bearer(&config_with_token(Some("s3cret")), &headers, Some("s3cret")).is_ok());
    }

    #[test]
    fn wrong_or_missing_token_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer nope"));
        let config = config_with_token(Some("s3cret"));
        assert!(check_bearer(&config, &headers, None).is_err());
        assert!(check_bearer(&config, &HeaderMap::new(), None).is_err());
        assert!(check_bearer(&config, &HeaderMap::new(), Some("nope")).is_err());
    }
}
