// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{ApiError, ErrorResponse};
use crate::state::DaemonState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate HTTP Basic credentials against the configured pair.
pub fn validate_basic(
    headers: &HeaderMap,
    expected: Option<&(String, String)>,
) -> Result<(), ApiError> {
    let Some((user, pass)) = expected else {
        return Ok(());
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let encoded = header.strip_prefix("Basic ").ok_or(ApiError::Unauthorized)?;
    let decoded = BASE64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
    let decoded = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;
    let (got_user, got_pass) = decoded.split_once(':').ok_or(ApiError::Unauthorized)?;

    if constant_time_eq(got_user, user) && constant_time_eq(got_pass, pass) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Axum middleware enforcing Basic auth on the REST surface.
///
/// `/api/status` stays open so liveness probes work without credentials.
pub async fn auth_layer(
    state: State<Arc<DaemonState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/api/status" {
        return next.run(req).await;
    }

    let expected = state.config.http_auth_pair();
    if let Err(code) = validate_basic(req.headers(), expected.as_ref()) {
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED);
        return (status, axum::Json(ErrorResponse { error: "unauthorized".into() }))
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
