// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-transition events fanned out to the adapters.
//!
//! The scheduler and watchdog emit [`DeviceEvent`]s into a broadcast feed;
//! the bus adapter subscribes and maps them onto topics.  Emission is
//! fire-and-forget: lagging or absent subscribers never block an operation.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::device::DriverKind;

/// Events emitted by the scheduler and watchdog, tagged with the device id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A scene switch started; the outgoing scene no longer owns the device.
    Switching {
        device: String,
        current_scene: Option<String>,
        target_scene: String,
        generation: u64,
    },
    /// A scene switch completed and the first frame was rendered.
    Running { device: String, scene: String, generation: u64 },
    /// A scene switch aborted (scene `init` failed).
    SwitchFailed { device: String, scene: String, error: String },
    /// The device was stopped; the framebuffer was blanked.
    Stopped { device: String, generation: u64 },
    /// A frame was shipped to hardware.
    FramePushed { device: String, scene: String, frametime_ms: u64, push_count: u64 },
    /// Push retries were exhausted; the device is degraded but not abandoned.
    Degraded { device: String, error: String },
    /// The device recovered from the degraded state.
    Recovered { device: String },
    /// Scene-supplied render code failed for one frame.
    RenderFailed { device: String, scene: String, error: String },
    /// A looping scene was halted after consecutive render failures.
    SceneHalted { device: String, scene: String, failures: u32 },
    /// The watchdog armed a remediation action.
    WatchdogTriggered { device: String, action: String },
    /// The active driver was replaced.
    DriverSwapped { device: String, driver: DriverKind },
}

impl DeviceEvent {
    /// Return the device identifier for this event.
    pub fn device(&self) -> &str {
        match self {
            Self::Switching { device, .. }
            | Self::Running { device, .. }
            | Self::SwitchFailed { device, .. }
            | Self::Stopped { device, .. }
            | Self::FramePushed { device, .. }
            | Self::Degraded { device, .. }
            | Self::Recovered { device }
            | Self::RenderFailed { device, .. }
            | Self::SceneHalted { device, .. }
            | Self::WatchdogTriggered { device, .. }
            | Self::DriverSwapped { device, .. } => device,
        }
    }
}

/// Broadcast hub for device events.
#[derive(Debug)]
pub struct EventFeed {
    pub event_tx: broadcast::Sender<DeviceEvent>,
}

impl EventFeed {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { event_tx }
    }

    /// Subscribe to the feed.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case.
    pub fn emit(&self, event: DeviceEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
