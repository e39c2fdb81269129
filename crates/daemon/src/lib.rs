// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pixood: multi-device pixel-display controller daemon.
//!
//! Wiring runs ConfigLoader → StateStore → SceneRegistry → Scheduler →
//! {CommandRouter, REST, Watchdog, BusAdapter}; each layer consumes the one
//! below it through shared state, with no globals.

pub mod bus;
pub mod config;
pub mod device;
pub mod diag;
pub mod error;
pub mod events;
pub mod persist;
pub mod router;
pub mod scene;
pub mod scheduler;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod version;
pub mod watchdog;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::BusHandle;
use crate::config::DaemonConfig;
use crate::device::Driver;
use crate::persist::PersistedDevice;
use crate::scene::SceneRegistry;
use crate::scheduler::SwitchRequest;
use crate::state::{DaemonState, DeviceEntry, DeviceSettings};

/// Run the daemon until shutdown.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let registry = SceneRegistry::with_builtins()?;
    let (bus, bus_rx) = BusHandle::channel(256);
    let state = Arc::new(DaemonState::new(config, registry, bus, shutdown.clone()));

    let recovery = bootstrap_devices(&state).await?;

    if state.config.mqtt_host.is_some() {
        transport::mqtt::spawn_mqtt(Arc::clone(&state), bus_rx);
    } else {
        info!("message bus adapter disabled (no broker configured)");
        drop(bus_rx);
    }
    watchdog::spawn_watchdog(Arc::clone(&state));
    spawn_startup_scenes(&state, recovery);
    spawn_signal_listener(shutdown.clone());

    if state.config.http_disabled {
        info!("REST api disabled");
        shutdown.cancelled().await;
    } else {
        let addr = format!("{}:{}", state.config.http_host, state.config.http_port);
        let router = transport::build_router(Arc::clone(&state));
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, version = version::VERSION, "pixood listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
    }

    scheduler::stop_all(&state, state.config.shutdown_grace()).await;
    state.persist_now().await;
    info!("pixood shut down");
    Ok(())
}

/// Merge persisted device records with the configured registration
/// shorthand, build drivers, and populate the store.
///
/// Returns each device's boot scene (the persisted `lastScene` when a crash
/// or restart interrupted it, otherwise its startup scene).
pub async fn bootstrap_devices(
    state: &Arc<DaemonState>,
) -> anyhow::Result<Vec<(String, String)>> {
    let persisted = persist::load(&state.config.device_file_path());
    let mut merged: BTreeMap<String, PersistedDevice> = persisted.devices;

    for spec in state.config.device_specs()? {
        if device::profile(&spec.device_type).is_none() {
            anyhow::bail!("unknown device type {:?} for device {}", spec.device_type, spec.id);
        }
        merged
            .entry(spec.id.clone())
            .and_modify(|d| {
                d.device_type = spec.device_type.clone();
                d.driver = spec.driver;
            })
            .or_insert_with(|| PersistedDevice {
                device_type: spec.device_type.clone(),
                driver: spec.driver,
                name: spec.id.clone(),
                brightness: 100,
                display_on: true,
                startup_scene: state.config.startup_scene.clone(),
                last_scene: None,
                watchdog: Default::default(),
            });
    }

    let mut recovery = Vec::new();
    for (id, record) in merged {
        if device::profile(&record.device_type).is_none() {
            warn!(device = %id, device_type = %record.device_type, "skipping persisted device with unknown type");
            continue;
        }
        let driver = match device::build_driver(&id, &record.device_type, record.driver, &state.bus)
        {
            Ok(driver) => driver,
            Err(e) => {
                warn!(device = %id, err = %e, "skipping device, driver construction failed");
                continue;
            }
        };
        let startup_scene = if record.startup_scene.is_empty() {
            state.config.startup_scene.clone()
        } else {
            record.startup_scene.clone()
        };
        let settings = DeviceSettings {
            name: if record.name.is_empty() { id.clone() } else { record.name.clone() },
            brightness: record.brightness.min(100),
            display_on: record.display_on,
            startup_scene: startup_scene.clone(),
            driver_kind: record.driver,
            watchdog: record.watchdog.clone(),
        };
        let entry = DeviceEntry::new(&id, &record.device_type, settings, driver);
        state.insert_device(entry).await;

        let boot_scene = record.last_scene.unwrap_or(startup_scene);
        recovery.push((id, boot_scene));
    }

    info!(devices = recovery.len(), "device store bootstrapped");
    state.persist_now().await;
    Ok(recovery)
}

/// Initialize drivers and start each device's boot scene, concurrently.
fn spawn_startup_scenes(state: &Arc<DaemonState>, recovery: Vec<(String, String)>) {
    for (id, scene) in recovery {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            if let Some(device) = state.device(&id).await {
                let init = device.driver.lock().await.init().await;
                if let Err(e) = init {
                    warn!(device = %id, err = %e, "driver init failed at startup");
                }
            }
            if !state.registry.contains(&scene) {
                warn!(device = %id, scene, "boot scene not registered, leaving device idle");
                return;
            }
            if let Err(e) = scheduler::switch_scene(&state, &id, SwitchRequest::named(&scene)).await
            {
                warn!(device = %id, scene, err = %e, "boot scene switch failed");
            }
        });
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(term) => term,
                Err(e) => {
                    warn!(err = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    shutdown.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });
}
