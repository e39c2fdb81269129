// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in self-tests with tri-color results, surfaced over
//! `/api/tests`.

use std::time::Instant;

use serde::Serialize;

use crate::device::Driver;
use crate::state::{epoch_ms, DaemonState};

/// Tri-color diagnostic verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagStatus {
    Green,
    Yellow,
    Red,
}

/// Result of one diagnostic run.
#[derive(Debug, Clone, Serialize)]
pub struct DiagResult {
    pub id: String,
    pub status: DiagStatus,
    pub message: String,
    pub details: serde_json::Value,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    pub timestamp: u64,
}

/// Listing entry for one registered diagnostic.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DiagInfo {
    pub id: &'static str,
    pub description: &'static str,
}

const TESTS: &[DiagInfo] = &[
    DiagInfo { id: "persistence", description: "Atomic write probe against the data directory" },
    DiagInfo { id: "mqtt", description: "Message bus connection state" },
    DiagInfo { id: "devices", description: "Device readiness and degradation" },
    DiagInfo { id: "scene-registry", description: "Scene registry population" },
];

pub fn list() -> Vec<DiagInfo> {
    TESTS.to_vec()
}

/// Run one diagnostic by id. `None` for unknown ids.
pub async fn run(state: &DaemonState, id: &str) -> Option<DiagResult> {
    if !TESTS.iter().any(|t| t.id == id) {
        return None;
    }
    let started = Instant::now();
    let (status, message, details) = match id {
        "persistence" => check_persistence(state),
        "mqtt" => check_mqtt(state),
        "devices" => check_devices(state).await,
        "scene-registry" => check_registry(state),
        _ => return None,
    };
    Some(DiagResult {
        id: id.to_owned(),
        status,
        message,
        details,
        duration: started.elapsed().as_millis() as u64,
        timestamp: epoch_ms(),
    })
}

/// Run every diagnostic.
pub async fn run_all(state: &DaemonState) -> Vec<DiagResult> {
    let mut out = Vec::with_capacity(TESTS.len());
    for test in TESTS {
        if let Some(result) = run(state, test.id).await {
            out.push(result);
        }
    }
    out
}

fn check_persistence(state: &DaemonState) -> (DiagStatus, String, serde_json::Value) {
    let path = state.config.device_file_path();
    let dir = path.parent().map(std::path::Path::to_path_buf).unwrap_or_default();
    let probe = dir.join(".diag-probe");
    let write = std::fs::create_dir_all(&dir)
        .and_then(|()| std::fs::write(&probe, b"probe"))
        .and_then(|()| std::fs::remove_file(&probe));
    match write {
        Ok(()) => (
            DiagStatus::Green,
            "data directory is writable".into(),
            serde_json::json!({ "path": dir.display().to_string() }),
        ),
        Err(e) => (
            DiagStatus::Red,
            format!("cannot write to data directory: {e}"),
            serde_json::json!({ "path": dir.display().to_string() }),
        ),
    }
}

fn check_mqtt(state: &DaemonState) -> (DiagStatus, String, serde_json::Value) {
    if state.config.mqtt_host.is_none() {
        return (
            DiagStatus::Yellow,
            "message bus adapter disabled".into(),
            serde_json::Value::Null,
        );
    }
    let status = state.mqtt.lock().clone();
    if status.connected {
        (
            DiagStatus::Green,
            "connected to broker".into(),
            serde_json::json!({ "retryCount": status.retry_count }),
        )
    } else {
        (
            DiagStatus::Red,
            status.last_error.clone().unwrap_or_else(|| "not connected".into()),
            serde_json::json!({ "retryCount": status.retry_count }),
        )
    }
}

async fn check_devices(state: &DaemonState) -> (DiagStatus, String, serde_json::Value) {
    let devices = state.list_devices().await;
    if devices.is_empty() {
        return (DiagStatus::Yellow, "no devices registered".into(), serde_json::Value::Null);
    }
    let mut healthy = 0usize;
    let mut unhealthy: Vec<String> = Vec::new();
    for device in &devices {
        let degraded = device.degraded.load(std::sync::atomic::Ordering::Relaxed);
        let ready = device.driver.lock().await.is_ready();
        if ready && !degraded {
            healthy += 1;
        } else {
            unhealthy.push(device.id.clone());
        }
    }
    let details = serde_json::json!({ "total": devices.len(), "unhealthy": unhealthy });
    if unhealthy.is_empty() {
        (DiagStatus::Green, format!("{healthy} device(s) healthy"), details)
    } else if healthy > 0 {
        (DiagStatus::Yellow, format!("{} device(s) degraded or not ready", unhealthy.len()), details)
    } else {
        (DiagStatus::Red, "all devices degraded or not ready".into(), details)
    }
}

fn check_registry(state: &DaemonState) -> (DiagStatus, String, serde_json::Value) {
    let count = state.registry.len();
    if count == 0 {
        (DiagStatus::Red, "scene registry is empty".into(), serde_json::Value::Null)
    } else {
        (
            DiagStatus::Green,
            format!("{count} scene(s) registered"),
            serde_json::json!({ "count": count }),
        )
    }
}

#[cfg(test)]
#[path = "diag_tests.rs"]
mod tests;
