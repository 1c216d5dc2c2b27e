//! Read-only JSON surface over the health engine.
//!
//! Gateway module (EMBP): each sibling file exports a subrouter, merged here
//! so `main.rs` only knows about [`router`]. Handlers never compute
//! anything themselves; they call one engine query and serialize it.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

use crate::engine::HealthEngine;

mod dashboard;
mod health;
mod sensors;

// ---

pub(crate) type AppState = Arc<HealthEngine>;

pub fn router(engine: Arc<HealthEngine>) -> Router {
    // ---
    Router::new()
        .merge(dashboard::router())
        .merge(sensors::router())
        .merge(health::router())
        .with_state(engine)
}

/// Error body: `{ "error": "..." }`.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    // ---
    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
