// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device persistence: load/save the durable device subset as JSON with
//! atomic writes (write tmp + rename).
//!
//! The in-memory store stays the source of truth; this file is a recovery
//! aid.  A missing, empty, or corrupt file therefore never fails startup;
//! it degrades to defaults with a warning.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::device::DriverKind;
use crate::state::WatchdogConfig;

/// Persisted state for all devices, keyed by device id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedDevices {
    #[serde(flatten)]
    pub devices: BTreeMap<String, PersistedDevice>,
}

/// Durable subset of a single device's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDevice {
    pub device_type: String,
    pub driver: DriverKind,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default = "default_display_on")]
    pub display_on: bool,
    #[serde(default)]
    pub startup_scene: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scene: Option<String>,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_brightness() -> u8 {
    100
}

fn default_display_on() -> bool {
    true
}

/// Load persisted devices. Never fails: unreadable or invalid content
/// recovers to defaults.
pub fn load(path: &Path) -> PersistedDevices {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PersistedDevices::default(),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "failed to read device file, using defaults");
            return PersistedDevices::default();
        }
    };
    if contents.trim().is_empty() {
        return PersistedDevices::default();
    }
    match serde_json::from_str(&contents) {
        Ok(devices) => devices,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "corrupt device file, using defaults");
            PersistedDevices::default()
        }
    }
}

/// Save persisted devices atomically (write tmp + rename).
pub fn save(path: &Path, devices: &PersistedDevices) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(devices)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
