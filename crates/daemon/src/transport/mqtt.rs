// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MQTT bus adapter.
//!
//! Three background tasks: the connection/event loop (subscribes on every
//! connect, feeds inbound publishes to the command router), the outbound
//! drain (ships queued [`BusMessage`]s to the broker), and the feed mapper
//! (turns scheduler events into topic publishes via the same outbound
//! queue).  Connection state is mirrored onto shared state for
//! `/api/status` and the `mqtt` diagnostic.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::BusMessage;
use crate::events::DeviceEvent;
use crate::router;
use crate::state::DaemonState;
use crate::version::{build_info, BuildInfo};

const SUBSCRIPTIONS: &[&str] = &["pixoo/#", "/home/pixoo/#"];
const MAX_BACKOFF_SECS: u64 = 30;

/// Spawn the bus adapter. No-op when no broker host is configured.
pub fn spawn_mqtt(state: Arc<DaemonState>, outbound_rx: mpsc::Receiver<BusMessage>) {
    let Some(host) = state.config.mqtt_host.clone() else {
        return;
    };

    let mut opts = MqttOptions::new(
        format!("pixood-{}", std::process::id()),
        host,
        state.config.mqtt_port,
    );
    opts.set_keep_alive(Duration::from_secs(30));
    if let (Some(user), Some(pass)) = (&state.config.mqtt_user, &state.config.mqtt_password) {
        opts.set_credentials(user.clone(), pass.clone());
    }
    let (client, eventloop) = AsyncClient::new(opts, 64);

    tokio::spawn(run_event_loop(Arc::clone(&state), client.clone(), eventloop));
    tokio::spawn(run_outbound(Arc::clone(&state), client, outbound_rx));
    tokio::spawn(run_feed_mapper(state));
}

async fn run_event_loop(state: Arc<DaemonState>, client: AsyncClient, mut eventloop: EventLoop) {
    let mut backoff = 1u64;
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    {
                        let mut status = state.mqtt.lock();
                        status.connected = true;
                        status.last_error = None;
                    }
                    backoff = 1;
                    info!("mqtt connected");
                    for topic in SUBSCRIPTIONS {
                        if let Err(e) = client.subscribe(*topic, QoS::AtLeastOnce).await {
                            warn!(topic, err = %e, "mqtt subscribe failed");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    router::dispatch(&state, &publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    {
                        let mut status = state.mqtt.lock();
                        status.connected = false;
                        status.retry_count += 1;
                        status.last_error = Some(e.to_string());
                    }
                    warn!(err = %e, backoff, "mqtt connection error, retrying");
                    tokio::select! {
                        _ = state.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(backoff)) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                }
            }
        }
    }
    debug!("mqtt event loop shutting down");
}

async fn run_outbound(
    state: Arc<DaemonState>,
    client: AsyncClient,
    mut outbound_rx: mpsc::Receiver<BusMessage>,
) {
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = client
                    .publish(msg.topic.clone(), QoS::AtLeastOnce, msg.retain, msg.payload)
                    .await
                {
                    warn!(topic = %msg.topic, err = %e, "mqtt publish failed");
                }
            }
        }
    }
    debug!("mqtt outbound drain shutting down");
}

async fn run_feed_mapper(state: Arc<DaemonState>) {
    let mut rx = state.feed.subscribe();
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => map_event(&state, &event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("feed mapper lagged {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneStatePayload<'a> {
    status: &'static str,
    current_scene: Option<&'a str>,
    target_scene: Option<&'a str>,
    generation_id: u64,
    #[serde(flatten)]
    build: BuildInfo,
}

fn publish_scene_state(state: &DaemonState, device: &str, payload: &SceneStatePayload<'_>) {
    // Both prefix families stay populated for older consumers.
    state.bus.publish_json(format!("pixoo/{device}/scene/state"), payload, false);
    state.bus.publish_json(format!("/home/pixoo/{device}/scene/state"), payload, false);
}

/// Map one scheduler event onto bus topics.
pub(crate) fn map_event(state: &DaemonState, event: &DeviceEvent) {
    match event {
        DeviceEvent::Switching { device, current_scene, target_scene, generation } => {
            publish_scene_state(
                state,
                device,
                &SceneStatePayload {
                    status: "switching",
                    current_scene: current_scene.as_deref(),
                    target_scene: Some(target_scene),
                    generation_id: *generation,
                    build: build_info(),
                },
            );
        }
        DeviceEvent::Running { device, scene, generation } => {
            publish_scene_state(
                state,
                device,
                &SceneStatePayload {
                    status: "running",
                    current_scene: Some(scene),
                    target_scene: None,
                    generation_id: *generation,
                    build: build_info(),
                },
            );
            // Last-known scene, retained for late subscribers.
            state.bus.publish(format!("pixoo/{device}/scene"), scene.clone().into_bytes(), true);
        }
        DeviceEvent::FramePushed { device, scene, frametime_ms, push_count } => {
            state.bus.publish_json(
                router::ok_topic(device),
                &serde_json::json!({
                    "scene": scene,
                    "frametime": frametime_ms,
                    "pushCount": push_count,
                    "version": build_info().version,
                    "buildNumber": build_info().build_number,
                    "gitCommit": build_info().git_commit,
                }),
                false,
            );
        }
        DeviceEvent::SwitchFailed { device, scene, error } => {
            router::publish_error(state, device, format!("switch to {scene} failed: {error}"));
        }
        DeviceEvent::Degraded { device, error } => {
            router::publish_error(state, device, format!("device degraded: {error}"));
        }
        DeviceEvent::RenderFailed { device, scene, error } => {
            router::publish_error(state, device, format!("scene {scene} render failed: {error}"));
        }
        DeviceEvent::SceneHalted { device, scene, failures } => {
            router::publish_error(
                state,
                device,
                format!("scene {scene} halted after {failures} consecutive failures"),
            );
        }
        DeviceEvent::DriverSwapped { device, driver } => {
            // Last-known driver, retained.
            state.bus.publish(
                format!("pixoo/{device}/driver"),
                driver.as_str().as_bytes().to_vec(),
                true,
            );
        }
        DeviceEvent::Stopped { .. }
        | DeviceEvent::Recovered { .. }
        | DeviceEvent::WatchdogTriggered { .. } => {
            // Log-only events; nothing on the wire.
        }
    }
}

#[cfg(test)]
#[path = "mqtt_tests.rs"]
mod tests;
