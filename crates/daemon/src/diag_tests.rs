// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{list, run, run_all, DiagStatus};
use crate::bus::BusHandle;
use crate::device::mock::MockDriver;
use crate::device::{profile, Driver};
use crate::scene::SceneRegistry;
use crate::state::{DaemonState, DeviceEntry};
use crate::test_support::mock_settings;

fn test_state(dir: &tempfile::TempDir) -> anyhow::Result<Arc<DaemonState>> {
    let mut config = crate::test_support::test_config();
    config.device_file = Some(dir.path().join("devices.json"));
    let (bus, _rx) = BusHandle::channel(16);
    Ok(Arc::new(DaemonState::new(
        config,
        SceneRegistry::with_builtins()?,
        bus,
        CancellationToken::new(),
    )))
}

async fn add_ready_device(state: &Arc<DaemonState>, id: &str) -> anyhow::Result<Arc<DeviceEntry>> {
    let Some(p) = profile("pixoo64") else {
        anyhow::bail!("pixoo64 profile missing");
    };
    let mut driver = MockDriver::new(p.capabilities);
    driver.init().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let entry = DeviceEntry::new(id, "pixoo64", mock_settings(id), Box::new(driver));
    state.insert_device(Arc::clone(&entry)).await;
    Ok(entry)
}

#[test]
fn listing_is_stable() {
    let ids: Vec<&str> = list().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["persistence", "mqtt", "devices", "scene-registry"]);
}

#[tokio::test]
async fn unknown_id_returns_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = test_state(&dir)?;
    assert!(run(&state, "bogus").await.is_none());
    Ok(())
}

#[tokio::test]
async fn run_all_covers_every_registered_test() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = test_state(&dir)?;

    let results = run_all(&state).await;
    assert_eq!(results.len(), list().len());
    for result in &results {
        assert!(result.timestamp > 0);
    }
    Ok(())
}

#[tokio::test]
async fn persistence_probe_is_green_in_a_writable_dir() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = test_state(&dir)?;

    let Some(result) = run(&state, "persistence").await else {
        anyhow::bail!("persistence test missing");
    };
    assert_eq!(result.status, DiagStatus::Green);
    Ok(())
}

#[tokio::test]
async fn mqtt_is_yellow_when_disabled_and_red_when_down() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = test_state(&dir)?;

    let Some(result) = run(&state, "mqtt").await else {
        anyhow::bail!("mqtt test missing");
    };
    assert_eq!(result.status, DiagStatus::Yellow);

    let dir2 = tempfile::tempdir()?;
    let mut config = crate::test_support::test_config();
    config.device_file = Some(dir2.path().join("devices.json"));
    config.mqtt_host = Some("broker.local".into());
    let (bus, _rx) = BusHandle::channel(16);
    let state = Arc::new(DaemonState::new(
        config,
        SceneRegistry::with_builtins()?,
        bus,
        CancellationToken::new(),
    ));
    state.mqtt.lock().last_error = Some("connection refused".into());

    let Some(result) = run(&state, "mqtt").await else {
        anyhow::bail!("mqtt test missing");
    };
    assert_eq!(result.status, DiagStatus::Red);
    assert!(result.message.contains("connection refused"));

    state.mqtt.lock().connected = true;
    let Some(result) = run(&state, "mqtt").await else {
        anyhow::bail!("mqtt test missing");
    };
    assert_eq!(result.status, DiagStatus::Green);
    Ok(())
}

#[tokio::test]
async fn devices_check_tracks_degradation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = test_state(&dir)?;

    let Some(result) = run(&state, "devices").await else {
        anyhow::bail!("devices test missing");
    };
    assert_eq!(result.status, DiagStatus::Yellow, "no devices yet");

    let a = add_ready_device(&state, "a").await?;
    let _b = add_ready_device(&state, "b").await?;
    let Some(result) = run(&state, "devices").await else {
        anyhow::bail!("devices test missing");
    };
    assert_eq!(result.status, DiagStatus::Green);

    a.degraded.store(true, std::sync::atomic::Ordering::Relaxed);
    let Some(result) = run(&state, "devices").await else {
        anyhow::bail!("devices test missing");
    };
    assert_eq!(result.status, DiagStatus::Yellow);
    assert_eq!(result.details["unhealthy"][0], "a");
    Ok(())
}

#[tokio::test]
async fn registry_check_is_green_with_builtins() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = test_state(&dir)?;

    let Some(result) = run(&state, "scene-registry").await else {
        anyhow::bail!("registry test missing");
    };
    assert_eq!(result.status, DiagStatus::Green);
    Ok(())
}
