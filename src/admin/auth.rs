use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::lifecycle::ServiceController;

/// Bearer-key check. An empty `admin.api_key` leaves the surface open.
pub async fn admin_auth_middleware(
    State(controller): State<ServiceController>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let settings = controller.settings();
    let expected = settings.admin.api_key.as_str();
    if expected.is_empty() {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if presented == Some(expected) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Rejected admin request");
    Err(StatusCode::UNAUTHORIZED)
}
