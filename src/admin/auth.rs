use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::admin::AdminState;
use crate::notify::INTERNAL_API_KEY_HEADER;

/// Reject requests whose `x-internal-api-key` does not match the shared
/// secret. With no secret configured every internal route is closed.
pub async fn internal_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.api_key.as_ref() else {
        tracing::warn!(path = %request.uri().path(), "Internal API key not configured, request rejected");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = request
        .headers()
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if key.as_bytes().ct_eq(expected.expose().as_bytes()).into() => {
            Ok(next.run(request).await)
        }
        _ => {
            tracing::debug!(path = %request.uri().path(), "Internal request with bad API key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
