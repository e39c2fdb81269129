// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers.
//!
//! Bodies are parsed manually from bytes so malformed JSON yields the
//! `{error}` envelope instead of a framework default, and unknown request
//! fields pass through silently.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::device::Driver;
use crate::diag;
use crate::error::ApiError;
use crate::scheduler::{self, SwitchRequest};
use crate::state::{epoch_ms, DaemonState, DeviceEntry, MqttStatus};
use crate::version;

// -- Response types -----------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: &'static str,
    pub build_number: &'static str,
    pub status: &'static str,
    pub uptime: String,
    pub uptime_seconds: u64,
    pub memory: MemoryInfo,
    pub mqtt_status: MqttStatus,
    pub start_time: u64,
}

#[derive(Debug, Serialize)]
pub struct MemoryInfo {
    pub rss: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub ip: String,
    pub name: String,
    pub driver: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_state: Option<String>,
    pub brightness: u8,
    pub display_on: bool,
    pub last_seen: u64,
}

// -- Helpers ------------------------------------------------------------------

fn describe(e: ApiError) -> &'static str {
    match e {
        ApiError::BadRequest => "invalid request",
        ApiError::UnknownDevice => "unknown device",
        ApiError::UnknownScene => "unknown scene",
        ApiError::Unsupported => "operation not supported by this device",
        ApiError::DriverFailure => "driver failure",
        ApiError::Unauthorized => "unauthorized",
        ApiError::Internal => "internal error",
    }
}

fn err(e: ApiError) -> Response {
    e.to_http_response(describe(e)).into_response()
}

fn bad_request(message: &str) -> Response {
    ApiError::BadRequest.to_http_response(message).into_response()
}

fn parse_body(body: &Bytes) -> Result<serde_json::Value, Response> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| bad_request(&format!("invalid json: {e}")))
}

fn uptime_string(mut secs: u64) -> String {
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {secs}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Resident set size in bytes, best-effort from procfs.
fn memory_rss() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            return kb * 1024;
        }
    }
    0
}

async fn device_record(entry: &Arc<DeviceEntry>) -> DeviceRecord {
    let settings = entry.settings.lock().clone();
    let (status, current_scene, play_state) = {
        let sc = entry.scene.lock().await;
        (sc.status, sc.current_scene.clone(), sc.play_state)
    };
    let degraded = entry.degraded.load(std::sync::atomic::Ordering::Relaxed);
    DeviceRecord {
        ip: entry.id.clone(),
        name: settings.name,
        driver: settings.driver_kind.as_str().to_owned(),
        status: if degraded { "degraded".to_owned() } else { status.as_str().to_owned() },
        play_state: current_scene.as_ref().map(|_| play_state.as_str().to_owned()),
        current_scene,
        brightness: settings.brightness,
        display_on: settings.display_on,
        last_seen: entry.last_push_ms.load(std::sync::atomic::Ordering::Relaxed),
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/status`
pub async fn status(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    let uptime_seconds = s.started_at.elapsed().as_secs();
    Json(StatusResponse {
        version: version::VERSION,
        build_number: version::BUILD_NUMBER,
        status: "running",
        uptime: uptime_string(uptime_seconds),
        uptime_seconds,
        memory: MemoryInfo { rss: memory_rss() },
        mqtt_status: s.mqtt.lock().clone(),
        start_time: s.start_epoch_ms,
    })
}

/// `GET /api/devices`
pub async fn list_devices(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    let mut devices = Vec::new();
    for entry in s.list_devices().await {
        devices.push(device_record(&entry).await);
    }
    Json(json!({ "devices": devices }))
}

/// `GET /api/devices/{ip}`
pub async fn get_device(
    State(s): State<Arc<DaemonState>>,
    Path(ip): Path<String>,
) -> Response {
    match s.device(&ip).await {
        Some(entry) => Json(device_record(&entry).await).into_response(),
        None => err(ApiError::UnknownDevice),
    }
}

/// `GET /api/devices/{ip}/metrics`
pub async fn device_metrics(
    State(s): State<Arc<DaemonState>>,
    Path(ip): Path<String>,
) -> Response {
    let Some(entry) = s.device(&ip).await else {
        return err(ApiError::UnknownDevice);
    };
    let metrics = entry.driver.lock().await.metrics();
    let fps = if metrics.last_frametime_ms > 0 {
        1000.0 / metrics.last_frametime_ms as f64
    } else {
        0.0
    };
    Json(json!({
        "fps": fps,
        "frametime": metrics.last_frametime_ms,
        "pushCount": metrics.push_count,
        "lastSeenTs": metrics.last_seen_ts,
    }))
    .into_response()
}

/// `POST /api/devices/{ip}/scene`
pub async fn set_scene(
    State(s): State<Arc<DaemonState>>,
    Path(ip): Path<String>,
    body: Bytes,
) -> Response {
    let value = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(scene) = value.get("scene").and_then(|v| v.as_str()).map(str::to_owned) else {
        return bad_request("scene is required");
    };
    let clear = value.get("clear").and_then(|v| v.as_bool()).unwrap_or(false);

    // Scene data arrives under `payload`; fold the switch controls in so the
    // scene sees one flat object.
    let mut merged = value
        .get("payload")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    merged.insert("scene".into(), json!(scene));
    merged.insert("clear".into(), json!(clear));
    let req = match SwitchRequest::from_payload(serde_json::Value::Object(merged)) {
        Ok(req) => req,
        Err(e) => return err(e),
    };

    match scheduler::switch_scene(&s, &ip, req).await {
        Ok(()) => Json(json!({ "status": "ok", "scene": scene, "deviceIp": ip })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/scene/pause`
pub async fn pause(State(s): State<Arc<DaemonState>>, Path(ip): Path<String>) -> Response {
    match scheduler::pause_scene(&s, &ip).await {
        Ok(play) => Json(json!({ "status": "ok", "playState": play.as_str() })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/scene/resume`
pub async fn resume(State(s): State<Arc<DaemonState>>, Path(ip): Path<String>) -> Response {
    match scheduler::resume_scene(&s, &ip).await {
        Ok(play) => Json(json!({ "status": "ok", "playState": play.as_str() })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/scene/stop`
pub async fn stop(State(s): State<Arc<DaemonState>>, Path(ip): Path<String>) -> Response {
    match scheduler::stop_scene(&s, &ip).await {
        Ok(()) => Json(json!({ "status": "ok", "playState": "stopped" })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/brightness`
pub async fn brightness(
    State(s): State<Arc<DaemonState>>,
    Path(ip): Path<String>,
    body: Bytes,
) -> Response {
    let value = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(level) = value.get("brightness").and_then(|v| v.as_i64()) else {
        return bad_request("brightness is required");
    };
    if !(0..=100).contains(&level) {
        return bad_request("brightness must be between 0 and 100");
    }
    match scheduler::set_brightness(&s, &ip, level as u8).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/display`
pub async fn display(
    State(s): State<Arc<DaemonState>>,
    Path(ip): Path<String>,
    body: Bytes,
) -> Response {
    let value = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(on) = value.get("on").and_then(|v| v.as_bool()) else {
        return bad_request("on is required");
    };
    match scheduler::set_display_on(&s, &ip, on).await {
        Ok(()) => Json(json!({ "status": "ok", "displayOn": on })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/reboot`
pub async fn reboot(State(s): State<Arc<DaemonState>>, Path(ip): Path<String>) -> Response {
    match scheduler::reset_device(&s, &ip).await {
        Ok(()) => {
            Json(json!({ "status": "ok", "message": "device rebooting" })).into_response()
        }
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/driver`
pub async fn driver(
    State(s): State<Arc<DaemonState>>,
    Path(ip): Path<String>,
    body: Bytes,
) -> Response {
    let value = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(kind) = value.get("driver").and_then(|v| v.as_str()) else {
        return bad_request("driver is required");
    };
    let kind = match crate::device::DriverKind::parse(kind) {
        Ok(k) => k,
        Err(e) => return bad_request(&e.to_string()),
    };
    match scheduler::swap_driver(&s, &ip, kind).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => err(e),
    }
}

/// `POST /api/devices/{ip}/reset`
pub async fn reset(State(s): State<Arc<DaemonState>>, Path(ip): Path<String>) -> Response {
    match scheduler::reset_device(&s, &ip).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => err(e),
    }
}

/// `GET /api/scenes`
pub async fn scenes(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    let scenes: Vec<_> = s.registry.list().into_iter().filter(|d| !d.hidden).collect();
    Json(json!({ "scenes": scenes }))
}

/// `POST /api/daemon/restart`
pub async fn daemon_restart(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    tracing::info!("daemon restart requested over REST");
    let state = Arc::clone(&s);
    tokio::spawn(async move {
        scheduler::stop_all(&state, state.config.shutdown_grace()).await;
        state.shutdown.cancel();
    });
    Json(json!({ "status": "ok", "message": "restarting", "timestamp": epoch_ms() }))
}

/// `GET /api/tests`
pub async fn diag_list() -> impl IntoResponse {
    Json(json!({ "tests": diag::list() }))
}

/// `POST /api/tests/{id}/run`
pub async fn diag_run(State(s): State<Arc<DaemonState>>, Path(id): Path<String>) -> Response {
    match diag::run(&s, &id).await {
        Some(result) => Json(result).into_response(),
        None => ApiError::UnknownDevice.to_http_response("unknown test").into_response(),
    }
}

/// `POST /api/tests/run`
pub async fn diag_run_all(State(s): State<Arc<DaemonState>>) -> impl IntoResponse {
    Json(json!({ "results": diag::run_all(&s).await }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    ApiError::UnknownDevice.to_http_response("not found").into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
