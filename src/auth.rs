use crate::api::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

/// Authenticated identity attached to the request by the auth gate
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Per-request capability check for protected routes.
///
/// Extracts the bearer token from the `Authorization` header and verifies it
/// before the handler runs. A missing header, bad signature and expired token
/// all produce the same 401 response so the caller cannot tell which check
/// failed. On success the decoded user id is attached to request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!("Missing or malformed Authorization header");
            unauthorized()
        })?;

    let user_id = state.token_service.verify(token).map_err(|_| {
        warn!("Token verification failed");
        metrics::counter!("auth.rejected").increment(1);
        unauthorized()
    })?;

    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Invalid or expired token" })),
    )
        .into_response()
}
