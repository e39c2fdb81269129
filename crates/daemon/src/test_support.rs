// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: config/state builders and mock-device
//! helpers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::device::mock::{MockDriver, MockProbe};
use crate::device::{profile, DriverKind};
use crate::state::{DaemonState, DeviceEntry, DeviceSettings, WatchdogConfig};

/// A daemon config with every external surface disabled or defaulted.
pub fn test_config() -> DaemonConfig {
    DaemonConfig {
        http_host: "127.0.0.1".into(),
        http_port: 0,
        http_disabled: false,
        http_auth: None,
        mqtt_host: None,
        mqtt_port: 1883,
        mqtt_user: None,
        mqtt_password: None,
        data_dir: PathBuf::from("./data"),
        device_file: None,
        devices: String::new(),
        startup_scene: "startup".into(),
        watchdog_interval_s: 10,
        shutdown_grace_ms: 2000,
    }
}

/// Default settings for a mock-driven test device.
pub fn mock_settings(id: &str) -> DeviceSettings {
    DeviceSettings {
        name: id.to_owned(),
        brightness: 100,
        display_on: true,
        startup_scene: "startup".into(),
        driver_kind: DriverKind::Mock,
        watchdog: WatchdogConfig::default(),
    }
}

/// Register a 64x64 mock device and hand back its probe.
pub async fn add_mock_device(state: &Arc<DaemonState>, id: &str) -> anyhow::Result<MockProbe> {
    let Some(p) = profile("pixoo64") else {
        anyhow::bail!("pixoo64 profile missing");
    };
    let probe = MockProbe::default();
    let driver = MockDriver::with_probe(p.capabilities, probe.clone());
    let entry = DeviceEntry::new(id, "pixoo64", mock_settings(id), Box::new(driver));
    state.insert_device(entry).await;
    Ok(probe)
}
