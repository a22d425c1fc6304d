use std::sync::Arc;

use axum::{
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;

/// Authenticated caller identity, available to handlers via request
/// extensions.
#[derive(Debug, Clone)]
pub struct Caller {
    pub name: String,
}

/// Static API-key check. `/health` and `/metrics` stay open; keys are
/// compared in constant time.
pub async fn require_api_key<B>(
    Extension(config): Extension<Arc<AuthConfig>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let path = req.uri().path();
    if !config.enabled || path == "/health" || path == "/metrics" {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get("X-API-Key")
        .or_else(|| req.headers().get(header::AUTHORIZATION))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value));

    let presented = match presented {
        Some(key) => key,
        None => {
            return unauthorized(
                "Missing API key. Provide X-API-Key header or Authorization: Bearer <key>",
            );
        }
    };

    match config
        .api_keys
        .iter()
        .find(|entry| entry.key.as_bytes().ct_eq(presented.as_bytes()).into())
    {
        Some(entry) => {
            tracing::debug!(caller = %entry.name, "Authenticated request");
            req.extensions_mut().insert(Caller {
                name: entry.name.clone(),
            });
            next.run(req).await
        }
        None => {
            tracing::warn!("Invalid API key presented");
            unauthorized("Invalid API key")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    let body = json!({
        "errors": { "code": StatusCode::UNAUTHORIZED.as_u16(), "message": message }
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
