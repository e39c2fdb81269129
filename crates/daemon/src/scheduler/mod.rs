// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device scene scheduler.
//!
//! For each device: at most one active scene, a generation-gated frame loop
//! for self-looping scenes, and clean handoff between scenes.  Operations
//! for one device serialize on its `scene` mutex; a switch that arrives
//! while another is in flight parks in the device's lane and the last
//! request wins.

pub(crate) mod frame;
pub(crate) mod switch;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::device::{self, Driver, DriverKind};
use crate::error::ApiError;
use crate::events::DeviceEvent;
use crate::state::{DaemonState, DeviceEntry, PlayState, SceneStatus};

/// Bound on a watchdog- or REST-triggered driver reset.
pub(crate) const RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// A requested scene activation.
#[derive(Debug, Clone)]
pub struct SwitchRequest {
    pub scene: String,
    /// Full command payload, forwarded to the scene untouched.
    pub payload: serde_json::Value,
    pub clear: bool,
    /// Activation frame cap (`frames` payload field).
    pub frames: Option<u64>,
    /// Loop delay override in place of the scene-returned delay.
    pub interval: Option<Duration>,
}

impl SwitchRequest {
    pub fn named(scene: &str) -> Self {
        Self {
            scene: scene.to_owned(),
            payload: serde_json::Value::Null,
            clear: false,
            frames: None,
            interval: None,
        }
    }

    pub fn with_clear(mut self) -> Self {
        self.clear = true;
        self
    }

    /// Build a request from a `state/upd`-shaped payload: `scene` required,
    /// `clear`/`frames`/`interval` optional, everything else opaque scene
    /// data that rides along.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, ApiError> {
        let obj = payload.as_object().ok_or(ApiError::BadRequest)?;
        let scene = obj
            .get("scene")
            .and_then(|v| v.as_str())
            .ok_or(ApiError::BadRequest)?
            .to_owned();
        let clear = match obj.get("clear") {
            None | Some(serde_json::Value::Null) => false,
            Some(v) => v.as_bool().ok_or(ApiError::BadRequest)?,
        };
        let frames = match obj.get("frames") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or(ApiError::BadRequest)?),
        };
        let interval = match obj.get("interval") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(Duration::from_millis(v.as_u64().ok_or(ApiError::BadRequest)?)),
        };
        Ok(Self { scene, payload, clear, frames, interval })
    }
}

/// Switch a device to a scene.
///
/// Returns once the switch protocol has run, or immediately after parking
/// the request as the pending switch of an in-flight transition (the last
/// requested scene always wins; intermediate requests coalesce away).
pub async fn switch_scene(
    state: &Arc<DaemonState>,
    device_id: &str,
    req: SwitchRequest,
) -> Result<(), ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    if !state.registry.contains(&req.scene) {
        return Err(ApiError::UnknownScene);
    }

    let mut req = {
        let mut lane = device.lane.lock();
        if lane.busy {
            lane.pending = Some(req);
            return Ok(());
        }
        lane.busy = true;
        req
    };

    loop {
        switch::execute_switch(state, &device, req).await;
        let next = {
            let mut lane = device.lane.lock();
            match lane.pending.take() {
                Some(n) => Some(n),
                None => {
                    lane.busy = false;
                    None
                }
            }
        };
        match next {
            Some(n) => req = n,
            None => break,
        }
    }

    state.persist_now().await;
    Ok(())
}

/// Suspend the frame loop, retaining all state. Idempotent.
pub async fn pause_scene(state: &Arc<DaemonState>, device_id: &str) -> Result<PlayState, ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    let mut sc = device.scene.lock().await;
    if sc.current_scene.is_some() && sc.play_state != PlayState::Stopped {
        sc.play_state = PlayState::Paused;
    }
    device.expects_frames.store(false, Ordering::Relaxed);
    Ok(sc.play_state)
}

/// Resume a paused frame loop. Idempotent.
pub async fn resume_scene(
    state: &Arc<DaemonState>,
    device_id: &str,
) -> Result<PlayState, ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    let mut sc = device.scene.lock().await;
    if sc.play_state == PlayState::Paused {
        sc.play_state = PlayState::Running;
    }
    update_frame_expectation(state, &device, &sc);
    Ok(sc.play_state)
}

/// Cancel the loop, blank the panel, and quiesce the device. Idempotent;
/// frames of any prior scene are discarded from here on.
pub async fn stop_scene(state: &Arc<DaemonState>, device_id: &str) -> Result<(), ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    stop_device(state, &device).await;
    state.persist_now().await;
    Ok(())
}

pub(crate) async fn stop_device(state: &Arc<DaemonState>, device: &Arc<DeviceEntry>) {
    let generation = {
        let mut sc = device.scene.lock().await;
        sc.cancel_loop();
        sc.generation += 1;
        sc.status = SceneStatus::Stopped;
        sc.play_state = PlayState::Stopped;
        sc.target_scene = None;
        let scene_name = sc.current_scene.clone().unwrap_or_default();

        let mut driver = device.driver.lock().await;
        driver.clear();
        if let Err(e) = driver.push(&scene_name).await {
            debug!(device = %device.id, err = %e, "blank push after stop failed");
        }
        sc.generation
    };
    device.expects_frames.store(false, Ordering::Relaxed);
    device.render_failures.store(0, Ordering::Relaxed);
    state.feed.emit(DeviceEvent::Stopped { device: device.id.clone(), generation });
}

/// Soft-reset the device hardware and invalidate outstanding work.
pub async fn reset_device(state: &Arc<DaemonState>, device_id: &str) -> Result<(), ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    let mut sc = device.scene.lock().await;
    sc.cancel_loop();
    sc.generation += 1;
    sc.status = SceneStatus::Idle;
    sc.play_state = PlayState::Stopped;
    sc.target_scene = None;
    device.expects_frames.store(false, Ordering::Relaxed);
    device.render_failures.store(0, Ordering::Relaxed);

    let mut driver = device.driver.lock().await;
    match tokio::time::timeout(RESET_TIMEOUT, driver.reset()).await {
        Err(_) => {
            warn!(device = %device.id, "driver reset timed out");
            return Err(ApiError::DriverFailure);
        }
        Ok(Err(e)) => {
            warn!(device = %device.id, err = %e, "driver reset failed");
            return Err(e.to_api_error());
        }
        Ok(Ok(())) => {}
    }
    driver.clear();
    Ok(())
}

/// Internal self-delivery point of the frame loop; also the stale-frame
/// gate.  A wakeup tagged with a generation other than the current one is
/// dropped without rendering or pushing.
pub async fn submit_animation_frame(
    state: &Arc<DaemonState>,
    device_id: &str,
    scene_name: &str,
    generation: u64,
) -> Result<(), ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    frame::on_wakeup(state, &device, scene_name, generation).await;
    Ok(())
}

/// Replace the active driver, preserving the current scene.
///
/// The device goes through an implicit stop (generation +1) and a
/// best-effort re-switch to the prior scene (generation +1 again), so it is
/// left in a consistent running state on the new driver.
pub async fn swap_driver(
    state: &Arc<DaemonState>,
    device_id: &str,
    kind: DriverKind,
) -> Result<(), ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    let (prior_scene, prior_payload) = {
        let sc = device.scene.lock().await;
        (sc.current_scene.clone(), sc.payload.clone())
    };

    stop_device(state, &device).await;

    let new_driver = device::build_driver(&device.id, &device.device_type, kind, &state.bus)?;
    {
        let mut driver = device.driver.lock().await;
        if let Err(e) = driver.reset().await {
            debug!(device = %device.id, err = %e, "old driver reset during swap failed");
        }
        let mut new_driver = new_driver;
        if let Err(e) = new_driver.init().await {
            warn!(device = %device.id, err = %e, "new driver init failed, continuing degraded");
        }
        *driver = new_driver;
    }
    device.settings.lock().driver_kind = kind;
    state.feed.emit(DeviceEvent::DriverSwapped { device: device.id.clone(), driver: kind });

    match prior_scene {
        Some(scene) => {
            let req = SwitchRequest {
                scene,
                payload: prior_payload,
                clear: true,
                frames: None,
                interval: None,
            };
            if let Err(e) = switch_scene(state, device_id, req).await {
                warn!(device = %device.id, err = %e, "re-switch after driver swap failed");
            }
        }
        None => state.persist_now().await,
    }
    Ok(())
}

/// Set panel brightness (0..=100), persisting on success.
pub async fn set_brightness(
    state: &Arc<DaemonState>,
    device_id: &str,
    value: u8,
) -> Result<(), ApiError> {
    if value > 100 {
        return Err(ApiError::BadRequest);
    }
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    {
        let mut driver = device.driver.lock().await;
        if !driver.capabilities().has_brightness() {
            return Err(ApiError::Unsupported);
        }
        driver.set_brightness(value).await.map_err(|e| e.to_api_error())?;
    }
    device.settings.lock().brightness = value;
    state.persist_now().await;
    Ok(())
}

/// Set panel display power, persisting on success.
pub async fn set_display_on(
    state: &Arc<DaemonState>,
    device_id: &str,
    on: bool,
) -> Result<(), ApiError> {
    let device = state.device(device_id).await.ok_or(ApiError::UnknownDevice)?;
    {
        let mut driver = device.driver.lock().await;
        if !driver.capabilities().display_power {
            return Err(ApiError::Unsupported);
        }
        driver.set_display_on(on).await.map_err(|e| e.to_api_error())?;
    }
    device.settings.lock().display_on = on;
    state.persist_now().await;
    Ok(())
}

/// Stop every device, waiting out in-flight pushes up to the grace window.
pub async fn stop_all(state: &Arc<DaemonState>, grace: Duration) {
    let state = Arc::clone(state);
    let stop = async {
        for device in state.list_devices().await {
            stop_device(&state, &device).await;
        }
    };
    if tokio::time::timeout(grace, stop).await.is_err() {
        warn!("shutdown grace window elapsed with pushes still in flight");
    }
}

/// Recompute whether the watchdog should expect frames from this device.
pub(crate) fn update_frame_expectation(
    state: &DaemonState,
    device: &DeviceEntry,
    sc: &crate::state::DeviceSceneState,
) {
    let looping = sc
        .current_scene
        .as_deref()
        .and_then(|name| state.registry.lookup(name))
        .map(|s| s.descriptor().wants_loop)
        .unwrap_or(false);
    let expecting = looping
        && sc.status == SceneStatus::Running
        && sc.play_state == PlayState::Running
        && sc.loop_token.is_some();
    device.expects_frames.store(expecting, Ordering::Relaxed);
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
