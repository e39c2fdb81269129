// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the REST and bus surfaces.
//!
//! Scene and driver failures never leave the scheduler as errors; what
//! callers see is an [`ApiError`] (HTTP status / error-topic publish) or a
//! degraded-state event.  Stack traces never serialize.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for operations arriving over REST or the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    BadRequest,
    UnknownDevice,
    UnknownScene,
    Unsupported,
    DriverFailure,
    Unauthorized,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::UnknownDevice => 404,
            Self::UnknownScene => 404,
            Self::Unsupported => 400,
            Self::DriverFailure => 500,
            Self::Unauthorized => 401,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::UnknownDevice => "UNKNOWN_DEVICE",
            Self::UnknownScene => "UNKNOWN_SCENE",
            Self::Unsupported => "UNSUPPORTED_OPERATION",
            Self::DriverFailure => "DRIVER_FAILURE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: message.into() }))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ApiError {}

/// Wire-format error envelope: a bare message, never a stack trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Driver-level failure raised by panel I/O.
///
/// `Unsupported` is deliberately distinct from I/O failure: a panel without a
/// buzzer rejecting `playTone` is a caller mistake (400), not a degraded
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    Io { message: String },
    Timeout { operation: &'static str },
    Unsupported { operation: &'static str },
}

impl DriverError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Map to the API error surfaced when a driver call was issued directly
    /// by a REST/bus request (as opposed to inside the frame loop).
    pub fn to_api_error(&self) -> ApiError {
        if self.is_unsupported() {
            ApiError::Unsupported
        } else {
            ApiError::DriverFailure
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { message } => write!(f, "driver i/o failure: {message}"),
            Self::Timeout { operation } => write!(f, "driver timeout during {operation}"),
            Self::Unsupported { operation } => write!(f, "operation not supported: {operation}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<reqwest::Error> for DriverError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout { operation: "http request" }
        } else {
            Self::Io { message: e.to_string() }
        }
    }
}

/// Failure raised by scene-supplied code (`init` or `render`).
///
/// Recorded by the scheduler's consecutive-failure accounting; never
/// propagated past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneError {
    message: String,
}

impl SceneError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SceneError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
