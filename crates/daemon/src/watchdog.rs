// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device liveness watchdog.
//!
//! Runs on its own timer and reads only atomics and the settings mutex, so
//! it keeps checking even when every render loop is stalled behind a device
//! mutex.  Remediation runs in spawned tasks for the same reason.  Two
//! consecutive over-threshold checks are required before acting.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{info, warn};

use crate::events::DeviceEvent;
use crate::scheduler::{self, SwitchRequest};
use crate::state::{epoch_ms, BusCommand, DaemonState, DeviceEntry, WatchdogAction};

const STRIKE_THRESHOLD: u32 = 2;

/// Spawn the periodic liveness checker.
pub fn spawn_watchdog(state: Arc<DaemonState>) {
    let interval = state.config.watchdog_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            check_all(&state).await;
        }
    });
}

pub(crate) async fn check_all(state: &Arc<DaemonState>) {
    for device in state.list_devices().await {
        if device.cancel.is_cancelled() {
            continue;
        }
        check_device(state, &device);
    }
}

/// One liveness check for one device. Lock-free apart from the settings
/// mutex; arming a remediation spawns it instead of awaiting it.
pub(crate) fn check_device(state: &Arc<DaemonState>, device: &Arc<DeviceEntry>) {
    let (enabled, timeout_ms, action, check_when_off, display_on, fallback, commands) = {
        let s = device.settings.lock();
        (
            s.watchdog.enabled,
            s.watchdog.timeout_minutes.saturating_mul(60_000),
            s.watchdog.action,
            s.watchdog.check_when_off,
            s.display_on,
            s.watchdog.fallback_scene.clone(),
            s.watchdog.commands.clone(),
        )
    };
    if !enabled {
        return;
    }
    if !device.expects_frames.load(Ordering::Relaxed) {
        device.watchdog_strikes.store(0, Ordering::Relaxed);
        return;
    }
    if !check_when_off && !display_on {
        return;
    }

    let last_seen = device.last_push_ms.load(Ordering::Relaxed);
    let silent_ms = epoch_ms().saturating_sub(last_seen);
    if silent_ms <= timeout_ms {
        device.watchdog_strikes.store(0, Ordering::Relaxed);
        return;
    }

    let strikes = device.watchdog_strikes.fetch_add(1, Ordering::Relaxed) + 1;
    if strikes < STRIKE_THRESHOLD {
        return;
    }
    device.watchdog_strikes.store(0, Ordering::Relaxed);

    warn!(
        device = %device.id,
        silent_ms,
        action = action.as_str(),
        "watchdog tripped, arming remediation"
    );
    state.feed.emit(DeviceEvent::WatchdogTriggered {
        device: device.id.clone(),
        action: action.as_str().to_owned(),
    });

    let state = Arc::clone(state);
    let device = Arc::clone(device);
    tokio::spawn(async move {
        remediate(&state, &device, action, fallback, commands).await;
    });
}

async fn remediate(
    state: &Arc<DaemonState>,
    device: &Arc<DeviceEntry>,
    action: WatchdogAction,
    fallback: Option<String>,
    commands: Vec<BusCommand>,
) {
    match action {
        WatchdogAction::Restart => {
            let current = device.scene.lock().await.current_scene.clone();
            if let Err(e) = scheduler::reset_device(state, &device.id).await {
                warn!(device = %device.id, err = %e, "watchdog reset failed");
            }
            if let Some(scene) = current {
                if let Err(e) =
                    scheduler::switch_scene(state, &device.id, SwitchRequest::named(&scene)).await
                {
                    warn!(device = %device.id, scene, err = %e, "watchdog re-switch failed");
                }
            }
        }
        WatchdogAction::FallbackScene => match fallback {
            Some(scene) => {
                if let Err(e) =
                    scheduler::switch_scene(state, &device.id, SwitchRequest::named(&scene)).await
                {
                    warn!(device = %device.id, scene, err = %e, "fallback scene switch failed");
                }
            }
            None => warn!(device = %device.id, "fallback action without a fallback scene"),
        },
        WatchdogAction::MqttCommandSequence => {
            for cmd in &commands {
                state.bus.publish_json(cmd.topic.clone(), &cmd.payload, false);
            }
            info!(device = %device.id, count = commands.len(), "published watchdog command sequence");
        }
        WatchdogAction::Notify => {
            info!(device = %device.id, "watchdog notify: device stopped pushing frames");
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
