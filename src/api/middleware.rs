//! Middleware Components
//!
//! CORS, request tracking, player identity and the admin key check.

use super::{errors::ApiError, handlers::AppState};
use crate::games::types::UserId;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::HeaderValue, request::Parts, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Player id set by the upstream authentication gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared secret for administrative routes
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Create CORS middleware with configurable origins
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        // Development mode: allow all origins
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]))
    } else {
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .into_iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]))
    }
}

/// Middleware to add request ID to all requests
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    // Keep a client-supplied id when it is a valid header value
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn request_id_of(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Player the request acts for, taken from [`USER_ID_HEADER`]
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .map(AuthenticatedUser)
            .ok_or_else(|| {
                ApiError::unauthorized(
                    request_id_of(parts),
                    format!("Missing or invalid {} header", USER_ID_HEADER),
                )
            })
    }
}

/// Reject admin requests without the configured key; open when no key is set
pub async fn admin_key_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.admin_key.as_deref() {
        let provided = request
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if provided != Some(expected) {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.clone())
                .unwrap_or_default();
            tracing::warn!(%request_id, path = %request.uri().path(), "Rejected admin request");
            return Err(ApiError::forbidden(
                request_id,
                "Admin key missing or wrong".to_string(),
            ));
        }
    }

    Ok(next.run(request).await)
}
