// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The switch protocol.
//!
//! Claims the device under its mutex (generation bump, loop cancellation,
//! `switching` event), releases the mutex for the outgoing scene's cleanup,
//! then re-acquires it to init the incoming scene and render the first
//! frame.  A generation moved by another operation while the mutex was
//! released means this switch was superseded; it aborts silently because
//! the superseding operation owns the device now.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::device::Driver;
use crate::events::DeviceEvent;
use crate::scene::{Scene, SceneContext};
use crate::scheduler::frame::{self, FrameDisposition};
use crate::scheduler::SwitchRequest;
use crate::state::{DaemonState, DeviceEntry, PlayState, SceneStatus};

/// Soft ceiling on scene `init`/`cleanup`; overruns are logged, not killed.
pub(crate) const SETUP_CEILING: Duration = Duration::from_secs(2);

pub(crate) async fn execute_switch(
    state: &Arc<DaemonState>,
    device: &Arc<DeviceEntry>,
    req: SwitchRequest,
) {
    let SwitchRequest { scene: scene_name, payload, clear, frames, interval } = req;
    let Some(incoming) = state.registry.lookup(&scene_name) else {
        // Validated at the public boundary; a registry miss here means the
        // request raced device removal. Nothing to do.
        return;
    };

    // Claim the device: from here the outgoing scene may not produce frames.
    let (my_gen, outgoing) = {
        let mut sc = device.scene.lock().await;
        sc.cancel_loop();
        sc.generation += 1;
        sc.status = SceneStatus::Switching;
        sc.target_scene = Some(scene_name.clone());
        device.expects_frames.store(false, Ordering::Relaxed);
        // The failure budget belongs to the activation; the incoming scene
        // must not inherit the outgoing scene's consecutive failures.
        device.render_failures.store(0, Ordering::Relaxed);
        state.feed.emit(DeviceEvent::Switching {
            device: device.id.clone(),
            current_scene: sc.current_scene.clone(),
            target_scene: scene_name.clone(),
            generation: sc.generation,
        });
        (sc.generation, sc.current_scene.clone())
    };

    // Outgoing cleanup runs with the device mutex released.
    if let Some(ref out_name) = outgoing {
        if let Some(out_scene) = state.registry.lookup(out_name) {
            run_cleanup(device, &out_scene, out_name).await;
        }
    }

    let mut sc = device.scene.lock().await;
    if sc.generation != my_gen {
        return;
    }
    sc.payload = payload;
    sc.frame = 0;
    sc.frame_limit = frames;
    sc.interval_override = interval;

    let mut driver = device.driver.lock().await;
    if clear {
        driver.clear();
    }

    let init_result = {
        // Plain reborrow so the bag and payload can split fields.
        let sc = &mut *sc;
        let bag = sc.scene_state.entry(scene_name.clone()).or_default();
        let mut ctx = SceneContext {
            device_id: &device.id,
            canvas: driver.framebuffer(),
            payload: &sc.payload,
            state: bag,
            frame: 0,
        };
        let started = Instant::now();
        let result = incoming.init(&mut ctx);
        let elapsed = started.elapsed();
        if elapsed > SETUP_CEILING {
            warn!(device = %device.id, scene = %scene_name, ms = elapsed.as_millis(), "scene init exceeded ceiling");
        }
        result
    };
    if let Err(e) = init_result {
        // Abort: the prior scene record survives at the new generation.
        sc.target_scene = None;
        sc.status = SceneStatus::Idle;
        sc.play_state = PlayState::Stopped;
        drop(driver);
        drop(sc);
        warn!(device = %device.id, scene = %scene_name, err = %e, "scene init failed, switch aborted");
        state.feed.emit(DeviceEvent::SwitchFailed {
            device: device.id.clone(),
            scene: scene_name,
            error: e.to_string(),
        });
        return;
    }

    let disposition =
        frame::render_frame(state, device, &mut sc, &mut driver, &incoming, &scene_name).await;
    drop(driver);

    sc.current_scene = Some(scene_name.clone());
    sc.target_scene = None;
    sc.status = SceneStatus::Running;
    sc.play_state = PlayState::Running;

    match disposition {
        FrameDisposition::Rendered { next_delay: Some(delay) } => {
            frame::schedule_wakeup(state, device, &scene_name, my_gen, delay, &mut sc);
            device.expects_frames.store(true, Ordering::Relaxed);
        }
        FrameDisposition::Rendered { next_delay: None } => {}
        FrameDisposition::Failed => {
            // A one-shot scene rests at running with no further frames. A
            // looping scene has no returned delay to continue from yet, so
            // it retries at the floor interval; the wakeup path enforces
            // the consecutive-failure limit from there.
            if incoming.descriptor().wants_loop {
                frame::schedule_wakeup(
                    state,
                    device,
                    &scene_name,
                    my_gen,
                    frame::MIN_LOOP_DELAY,
                    &mut sc,
                );
                device.expects_frames.store(true, Ordering::Relaxed);
            }
        }
    }
    drop(sc);

    state.feed.emit(DeviceEvent::Running {
        device: device.id.clone(),
        scene: scene_name,
        generation: my_gen,
    });
}

/// Run the outgoing scene's cleanup with its state bag checked out of the
/// store.  Wakeups of the outgoing scene are already dead (generation moved),
/// so nothing else touches the bag while it is out.
async fn run_cleanup(device: &Arc<DeviceEntry>, out_scene: &Arc<dyn Scene>, out_name: &str) {
    let mut bag =
        device.scene.lock().await.scene_state.remove(out_name).unwrap_or_default();
    let payload = serde_json::Value::Null;
    {
        let mut driver = device.driver.lock().await;
        let mut ctx = SceneContext {
            device_id: &device.id,
            canvas: driver.framebuffer(),
            payload: &payload,
            state: &mut bag,
            frame: 0,
        };
        let started = Instant::now();
        if let Err(e) = out_scene.cleanup(&mut ctx) {
            warn!(device = %device.id, scene = out_name, err = %e, "scene cleanup failed");
        }
        let elapsed = started.elapsed();
        if elapsed > SETUP_CEILING {
            warn!(device = %device.id, scene = out_name, ms = elapsed.as_millis(), "scene cleanup exceeded ceiling");
        }
    }
    device.scene.lock().await.scene_state.insert(out_name.to_owned(), bag);
}
