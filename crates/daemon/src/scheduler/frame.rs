// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The frame loop: render, push with bounded retry, schedule the next
//! wakeup.
//!
//! Wakeups are scheduler-owned timer tasks tagged with the generation they
//! were scheduled at.  Firing with a stale tag is a no-op; cancellation via
//! the loop token is idempotent.  Scenes stay synchronous: they return a
//! delay and the scheduler holds all timer ownership.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::device::Driver;
use crate::events::DeviceEvent;
use crate::scene::{RenderOutcome, Scene, SceneContext};
use crate::state::{DaemonState, DeviceEntry, DeviceSceneState, PlayState, SceneStatus};

/// Floor on the loop interval; a returned delay of 0 means "as soon as
/// possible" but never a busy loop.
pub(crate) const MIN_LOOP_DELAY: Duration = Duration::from_millis(20);
/// Push attempts per frame before the device degrades.
pub(crate) const PUSH_RETRIES: u32 = 3;
const PUSH_BACKOFF_STEP: Duration = Duration::from_millis(50);
/// Consecutive render failures that halt a looping scene.
pub(crate) const RENDER_FAILURE_LIMIT: u32 = 5;
/// Soft target for a single render; overruns are logged, not killed.
const RENDER_CEILING: Duration = Duration::from_millis(500);

pub(crate) enum FrameDisposition {
    Rendered { next_delay: Option<Duration> },
    Failed,
}

/// Render one frame and push it. The caller holds both device locks and
/// applies the resulting state transition.
pub(crate) async fn render_frame(
    state: &Arc<DaemonState>,
    device: &Arc<DeviceEntry>,
    sc: &mut DeviceSceneState,
    driver: &mut Box<dyn Driver>,
    scene: &Arc<dyn Scene>,
    scene_name: &str,
) -> FrameDisposition {
    let outcome = {
        let bag = sc.scene_state.entry(scene_name.to_owned()).or_default();
        let mut ctx = SceneContext {
            device_id: &device.id,
            canvas: driver.framebuffer(),
            payload: &sc.payload,
            state: bag,
            frame: sc.frame,
        };
        let started = Instant::now();
        let result = scene.render(&mut ctx);
        let elapsed = started.elapsed();
        if elapsed > RENDER_CEILING {
            warn!(device = %device.id, scene = scene_name, ms = elapsed.as_millis(), "render exceeded soft ceiling");
        }
        result
    };

    match outcome {
        Err(e) => {
            let failures = device.render_failures.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(device = %device.id, scene = scene_name, failures, err = %e, "scene render failed");
            state.feed.emit(DeviceEvent::RenderFailed {
                device: device.id.clone(),
                scene: scene_name.to_owned(),
                error: e.to_string(),
            });
            FrameDisposition::Failed
        }
        Ok(outcome) => {
            device.render_failures.store(0, Ordering::Relaxed);
            sc.frame += 1;
            push_frame(state, device, driver, scene_name).await;
            sc.mark_frame();

            let mut next_delay = match outcome {
                RenderOutcome::Next(delay) => Some(delay),
                RenderOutcome::Done => None,
            };
            if next_delay.is_some() {
                if let Some(interval) = sc.interval_override {
                    next_delay = Some(interval);
                }
            }
            if let Some(limit) = sc.frame_limit {
                // frames=0 still renders one frame, then halts.
                if sc.frame >= limit.max(1) {
                    next_delay = None;
                }
            }
            FrameDisposition::Rendered { next_delay }
        }
    }
}

/// Push with bounded linear-backoff retry. Exhaustion marks the device
/// degraded and publishes the event once; the loop keeps going.
async fn push_frame(
    state: &Arc<DaemonState>,
    device: &Arc<DeviceEntry>,
    driver: &mut Box<dyn Driver>,
    scene_name: &str,
) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match driver.push(scene_name).await {
            Ok(_changed) => {
                let metrics = driver.metrics();
                device.last_push_ms.store(metrics.last_seen_ts, Ordering::Relaxed);
                if device.degraded.swap(false, Ordering::Relaxed) {
                    state.feed.emit(DeviceEvent::Recovered { device: device.id.clone() });
                }
                state.feed.emit(DeviceEvent::FramePushed {
                    device: device.id.clone(),
                    scene: scene_name.to_owned(),
                    frametime_ms: metrics.last_frametime_ms,
                    push_count: metrics.push_count,
                });
                return;
            }
            Err(e) if attempt < PUSH_RETRIES => {
                debug!(device = %device.id, attempt, err = %e, "push failed, retrying");
                tokio::time::sleep(PUSH_BACKOFF_STEP * attempt).await;
            }
            Err(e) => {
                warn!(device = %device.id, attempts = attempt, err = %e, "push retries exhausted, device degraded");
                if !device.degraded.swap(true, Ordering::Relaxed) {
                    state.feed.emit(DeviceEvent::Degraded {
                        device: device.id.clone(),
                        error: e.to_string(),
                    });
                }
                return;
            }
        }
    }
}

/// Arm the next-frame wakeup, tagged with the generation it was scheduled
/// at.  Replaces (and cancels) any outstanding wakeup so at most one exists
/// per device.
pub(crate) fn schedule_wakeup(
    state: &Arc<DaemonState>,
    device: &Arc<DeviceEntry>,
    scene_name: &str,
    generation: u64,
    delay: Duration,
    sc: &mut DeviceSceneState,
) {
    let delay = delay.max(MIN_LOOP_DELAY);
    sc.cancel_loop();
    let token = CancellationToken::new();
    sc.loop_token = Some(token.clone());
    sc.loop_delay = Some(delay);

    let state = Arc::clone(state);
    let device = Arc::clone(device);
    let scene_name = scene_name.to_owned();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => return,
            _ = device.cancel.cancelled() => return,
        }
        on_wakeup(&state, &device, &scene_name, generation).await;
    });
}

/// Handle a fired wakeup.
///
/// Stale generation: drop.  Paused: re-arm without rendering so the loop
/// token stays alive and resume is a pure play-state flip.  Otherwise render
/// and either re-arm or let the loop end.
pub(crate) async fn on_wakeup(
    state: &Arc<DaemonState>,
    device: &Arc<DeviceEntry>,
    scene_name: &str,
    generation: u64,
) {
    let mut sc = device.scene.lock().await;
    if sc.generation != generation {
        return;
    }
    match sc.play_state {
        PlayState::Paused => {
            let delay = sc.loop_delay.unwrap_or(MIN_LOOP_DELAY);
            schedule_wakeup(state, device, scene_name, generation, delay, &mut sc);
            return;
        }
        PlayState::Stopped => return,
        PlayState::Running => {}
    }
    if sc.status != SceneStatus::Running {
        return;
    }
    let Some(scene) = state.registry.lookup(scene_name) else {
        return;
    };

    let mut driver = device.driver.lock().await;
    let disposition = render_frame(state, device, &mut sc, &mut driver, &scene, scene_name).await;
    drop(driver);

    match disposition {
        FrameDisposition::Rendered { next_delay: Some(delay) } => {
            schedule_wakeup(state, device, scene_name, generation, delay, &mut sc);
        }
        FrameDisposition::Rendered { next_delay: None } => {
            sc.loop_token = None;
            sc.loop_delay = None;
            sc.status = SceneStatus::Idle;
            device.expects_frames.store(false, Ordering::Relaxed);
        }
        FrameDisposition::Failed => {
            let failures = device.render_failures.load(Ordering::Relaxed);
            if failures >= RENDER_FAILURE_LIMIT {
                sc.loop_token = None;
                sc.loop_delay = None;
                sc.status = SceneStatus::Idle;
                device.expects_frames.store(false, Ordering::Relaxed);
                state.feed.emit(DeviceEvent::SceneHalted {
                    device: device.id.clone(),
                    scene: scene_name.to_owned(),
                    failures,
                });
            } else if let Some(delay) = sc.loop_delay {
                schedule_wakeup(state, device, scene_name, generation, delay, &mut sc);
            }
        }
    }
}
