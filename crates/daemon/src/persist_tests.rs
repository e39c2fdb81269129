// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{load, save, PersistedDevice, PersistedDevices};
use crate::device::DriverKind;
use crate::state::{WatchdogAction, WatchdogConfig};

fn sample() -> PersistedDevices {
    let mut devices = PersistedDevices::default();
    devices.devices.insert(
        "192.168.1.100".into(),
        PersistedDevice {
            device_type: "pixoo64".into(),
            driver: DriverKind::Real,
            name: "kitchen".into(),
            brightness: 80,
            display_on: true,
            startup_scene: "startup".into(),
            last_scene: Some("clock".into()),
            watchdog: WatchdogConfig {
                enabled: true,
                timeout_minutes: 1,
                action: WatchdogAction::Restart,
                fallback_scene: None,
                check_when_off: false,
                commands: Vec::new(),
            },
        },
    );
    devices
}

#[test]
fn save_then_load_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("devices.json");

    save(&path, &sample())?;
    let loaded = load(&path);

    let Some(dev) = loaded.devices.get("192.168.1.100") else {
        anyhow::bail!("device missing after reload");
    };
    assert_eq!(dev.brightness, 80);
    assert!(dev.display_on);
    assert_eq!(dev.last_scene.as_deref(), Some("clock"));
    assert_eq!(dev.watchdog.timeout_minutes, 1);
    assert_eq!(dev.watchdog.action, WatchdogAction::Restart);
    Ok(())
}

#[test]
fn save_replaces_atomically_without_leftover_tmp() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("devices.json");

    save(&path, &sample())?;
    save(&path, &sample())?;

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
    Ok(())
}

#[test]
fn missing_file_loads_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let loaded = load(&dir.path().join("nope.json"));
    assert!(loaded.devices.is_empty());
    Ok(())
}

#[test]
fn corrupt_file_loads_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("devices.json");
    std::fs::write(&path, b"{ this is not json")?;

    let loaded = load(&path);
    assert!(loaded.devices.is_empty());
    Ok(())
}

#[test]
fn empty_file_loads_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("devices.json");
    std::fs::write(&path, b"  \n")?;

    let loaded = load(&path);
    assert!(loaded.devices.is_empty());
    Ok(())
}

#[test]
fn unknown_fields_are_accepted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("devices.json");
    std::fs::write(
        &path,
        serde_json::to_vec(&serde_json::json!({
            "10.0.0.9": {
                "deviceType": "awtrix",
                "driver": "mock",
                "futureField": {"nested": true}
            }
        }))?,
    )?;

    let loaded = load(&path);
    let Some(dev) = loaded.devices.get("10.0.0.9") else {
        anyhow::bail!("device missing");
    };
    assert_eq!(dev.device_type, "awtrix");
    assert_eq!(dev.driver, DriverKind::Mock);
    assert_eq!(dev.brightness, 100, "defaults fill missing fields");
    Ok(())
}
