// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command router: topic parsing and dispatch for inbound bus messages.
//!
//! Both prefix families are accepted (`pixoo/...` and the legacy
//! `/home/pixoo/...`); the daemon's own outbound topics parse to no route
//! and fall through, so subscribing with a broad wildcard is safe.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::device::DriverKind;
use crate::error::ApiError;
use crate::scheduler::{self, SwitchRequest};
use crate::state::{epoch_ms, DaemonState};
use crate::version::{build_info, BuildInfo};

const WARN_PAYLOAD_BYTES: usize = 100 * 1024;
const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Operation addressed by an inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StateUpdate,
    SceneSet,
    DriverSet,
    Reset,
}

/// Parsed inbound route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub device_id: String,
    pub action: Action,
}

/// Parse an inbound bus topic into a route. Returns `None` for topics that
/// are not commands (including the daemon's own outbound topics).
pub fn parse_topic(topic: &str) -> Option<Route> {
    let rest =
        topic.strip_prefix("/home/pixoo/").or_else(|| topic.strip_prefix("pixoo/"))?;
    let mut parts = rest.splitn(3, '/');
    let device_id = parts.next()?;
    let resource = parts.next()?;
    let verb = parts.next()?;
    if device_id.is_empty() || verb.contains('/') {
        return None;
    }
    let action = match (resource, verb) {
        ("state", "upd") => Action::StateUpdate,
        ("scene", "set") | ("scene", "switch") => Action::SceneSet,
        ("driver", "set") | ("driver", "switch") => Action::DriverSet,
        ("reset", "set") | ("device", "reset") => Action::Reset,
        _ => return None,
    };
    Some(Route { device_id: device_id.to_owned(), action })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OkPayload {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scene: Option<String>,
    timestamp: u64,
    #[serde(flatten)]
    build: BuildInfo,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
    timestamp: u64,
}

pub(crate) fn ok_topic(device_id: &str) -> String {
    format!("pixoo/{device_id}/ok")
}

pub(crate) fn error_topic(device_id: &str) -> String {
    format!("pixoo/{device_id}/error")
}

/// Publish an error for a device to its error topic.
pub(crate) fn publish_error(state: &DaemonState, device_id: &str, message: impl Into<String>) {
    state.bus.publish_json(
        error_topic(device_id),
        &ErrorPayload { error: message.into(), timestamp: epoch_ms() },
        false,
    );
}

/// Route one inbound message: parse, validate, dispatch, acknowledge.
pub async fn dispatch(state: &Arc<DaemonState>, topic: &str, payload: &[u8]) {
    let Some(route) = parse_topic(topic) else {
        return;
    };

    if payload.len() > MAX_PAYLOAD_BYTES {
        warn!(topic, bytes = payload.len(), "refusing oversized payload");
        publish_error(state, &route.device_id, "payload too large");
        return;
    }
    if payload.len() > WARN_PAYLOAD_BYTES {
        warn!(topic, bytes = payload.len(), "large payload accepted");
    }

    match handle(state, &route, payload).await {
        Ok(scene) => {
            info!(device = %route.device_id, action = ?route.action, "command handled");
            state.bus.publish_json(
                ok_topic(&route.device_id),
                &OkPayload { status: "ok", scene, timestamp: epoch_ms(), build: build_info() },
                false,
            );
        }
        Err((code, message)) => {
            warn!(device = %route.device_id, action = ?route.action, code = %code, "command failed: {message}");
            publish_error(state, &route.device_id, message);
        }
    }
}

async fn handle(
    state: &Arc<DaemonState>,
    route: &Route,
    payload: &[u8],
) -> Result<Option<String>, (ApiError, String)> {
    let device_id = &route.device_id;
    if state.device(device_id).await.is_none() {
        return Err((ApiError::UnknownDevice, format!("unknown device {device_id}")));
    }

    match route.action {
        Action::StateUpdate => {
            let value: serde_json::Value = serde_json::from_slice(payload)
                .map_err(|e| (ApiError::BadRequest, format!("invalid payload: {e}")))?;
            let req = SwitchRequest::from_payload(value)
                .map_err(|e| (e, "payload must carry a scene name".to_owned()))?;
            let scene = req.scene.clone();
            scheduler::switch_scene(state, device_id, req)
                .await
                .map_err(|e| (e, format!("scene switch failed: {e}")))?;
            Ok(Some(scene))
        }
        Action::SceneSet => {
            let name = parse_scene_name(payload)?;
            scheduler::switch_scene(state, device_id, SwitchRequest::named(&name))
                .await
                .map_err(|e| (e, format!("unknown scene {name}")))?;
            Ok(Some(name))
        }
        Action::DriverSet => {
            let kind = parse_driver_kind(payload)?;
            scheduler::swap_driver(state, device_id, kind)
                .await
                .map_err(|e| (e, format!("driver swap failed: {e}")))?;
            Ok(None)
        }
        Action::Reset => {
            scheduler::reset_device(state, device_id)
                .await
                .map_err(|e| (e, format!("device reset failed: {e}")))?;
            Ok(None)
        }
    }
}

/// Accept `{"name": "..."}` or a bare scene name.
fn parse_scene_name(payload: &[u8]) -> Result<String, (ApiError, String)> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => return Ok(s),
            serde_json::Value::Object(map) => {
                if let Some(name) = map.get("name").and_then(|v| v.as_str()) {
                    return Ok(name.to_owned());
                }
                return Err((ApiError::BadRequest, "missing scene name".to_owned()));
            }
            _ => return Err((ApiError::BadRequest, "missing scene name".to_owned())),
        }
    }
    let s = std::str::from_utf8(payload)
        .map_err(|_| (ApiError::BadRequest, "payload is not utf-8".to_owned()))?
        .trim();
    if s.is_empty() {
        Err((ApiError::BadRequest, "missing scene name".to_owned()))
    } else {
        Ok(s.to_owned())
    }
}

/// Accept `{"driver": "real"}`, `"real"` (JSON string), or a bare string.
fn parse_driver_kind(payload: &[u8]) -> Result<DriverKind, (ApiError, String)> {
    let raw = if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
        match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Object(map) => map
                .get("driver")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .ok_or((ApiError::BadRequest, "missing driver field".to_owned()))?,
            _ => return Err((ApiError::BadRequest, "invalid driver payload".to_owned())),
        }
    } else {
        std::str::from_utf8(payload)
            .map_err(|_| (ApiError::BadRequest, "payload is not utf-8".to_owned()))?
            .trim()
            .to_owned()
    };
    DriverKind::parse(&raw).map_err(|e| (ApiError::BadRequest, e.to_string()))
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
