//! Admin secret middleware
//!
//! Every operator endpoint requires the shared admin secret in the `Auth`
//! header. The value is compared as an exact string; there is no scheme
//! prefix and no session.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::models::ErrorResponse;

/// Header carrying the operator secret
pub const ADMIN_SECRET_HEADER: &str = "auth";

/// Shared operator secret
#[derive(Clone)]
pub struct AdminSecret(Arc<str>);

impl AdminSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    /// Exact comparison; an empty configured secret matches nothing
    pub fn matches(&self, presented: &[u8]) -> bool {
        !self.0.is_empty() && self.0.as_bytes() == presented
    }
}

impl std::fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminSecret(..)")
    }
}

/// Reject requests that don't carry the admin secret
///
/// # Errors
/// Returns 401 Unauthorized if the `Auth` header is missing or differs from
/// the configured secret.
pub async fn require_admin_secret(
    State(secret): State<AdminSecret>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let presented = request.headers().get(ADMIN_SECRET_HEADER);

    match presented {
        Some(value) if secret.matches(value.as_bytes()) => Ok(next.run(request).await),
        Some(_) => {
            debug!(path = %request.uri().path(), "Admin request with wrong secret");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Invalid admin secret", "INVALID_AUTH")),
            ))
        }
        None => {
            debug!(path = %request.uri().path(), "Admin request without secret");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing Auth header", "MISSING_AUTH")),
            ))
        }
    }
}
