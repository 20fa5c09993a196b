//! API Middleware
//!
//! Caller identity, correlation and request logging middleware.
//!
//! Authentication happens upstream; this service trusts the
//! `X-Request-User-Id` header set by the authenticating gateway.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;

pub const REQUEST_USER_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

// =========================================================================
// Operation Context Middleware
// =========================================================================

/// Build the [`OperationContext`] for a request.
///
/// A malformed `X-Request-User-Id` is rejected here; a missing one is left
/// for [`require_identity_middleware`] so that service routes work without it.
/// A missing or malformed correlation id is replaced by a fresh one.
pub async fn context_middleware(
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let mut context = OperationContext::new();

    if let Some(raw) = headers.get(REQUEST_USER_HEADER) {
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .filter(|id| !id.is_nil())
            .ok_or_else(|| AppError::InvalidHeader(REQUEST_USER_HEADER.to_string()))?;
        context = context.with_request_user(user_id);
    }

    if let Some(correlation_id) = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
    {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Reject requests that carry no caller identity
pub async fn require_identity_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identified = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.request_user_id)
        .is_some();

    if !identified {
        return Err(AppError::MissingHeader(REQUEST_USER_HEADER.to_string()));
    }

    Ok(next.run(request).await)
}

// =========================================================================
// Header Masking
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware. Bodies are never logged; they carry raw
/// card and phone numbers.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
