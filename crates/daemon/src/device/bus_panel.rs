// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-bus-driven 32x8 panel.
//!
//! Frames and control commands are published as outbound topic payloads
//! under `awtrix/<device>/...`; the panel maintains no read channel back to
//! the daemon beyond broker acks.  A push is therefore "done" once the
//! message is enqueued with the bus adapter.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;

use crate::bus::BusHandle;
use crate::device::canvas::{Framebuffer, Rgba};
use crate::device::{Capabilities, Driver, DriverFuture, DriverKind, DriverMetrics};
use crate::state::epoch_ms;

pub struct BusPanel {
    device_id: String,
    caps: Capabilities,
    fb: Framebuffer,
    bus: BusHandle,
    ready: bool,
    last_pushed: Vec<Rgba>,
    metrics: DriverMetrics,
}

impl BusPanel {
    pub fn new(device_id: &str, caps: Capabilities, bus: BusHandle) -> Self {
        Self {
            device_id: device_id.to_owned(),
            fb: Framebuffer::new(caps.width, caps.height),
            caps,
            bus,
            ready: false,
            last_pushed: Vec::new(),
            metrics: DriverMetrics::default(),
        }
    }

    fn topic(&self, suffix: &str) -> String {
        format!("awtrix/{}/{suffix}", self.device_id)
    }
}

impl Driver for BusPanel {
    fn kind(&self) -> DriverKind {
        DriverKind::Real
    }

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn init(&mut self) -> DriverFuture<'_, ()> {
        self.ready = true;
        Box::pin(async { Ok(()) })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn framebuffer(&mut self) -> &mut Framebuffer {
        &mut self.fb
    }

    fn push(&mut self, scene: &str) -> DriverFuture<'_, u32> {
        let changed = self.fb.diff_count(&self.last_pushed);
        self.bus.publish_json(
            self.topic("draw"),
            &json!({
                "scene": scene,
                "width": self.fb.width(),
                "height": self.fb.height(),
                "rgb": BASE64.encode(self.fb.rgb_bytes()),
            }),
            false,
        );
        self.last_pushed = self.fb.pixels().to_vec();
        self.metrics.push_count += 1;
        self.metrics.last_seen_ts = epoch_ms();
        self.metrics.last_frametime_ms = 1;
        Box::pin(async move { Ok(changed) })
    }

    fn reset(&mut self) -> DriverFuture<'_, ()> {
        self.bus.publish_json(self.topic("reboot"), &json!({}), false);
        self.fb.clear();
        self.last_pushed.clear();
        Box::pin(async { Ok(()) })
    }

    fn metrics(&self) -> DriverMetrics {
        self.metrics
    }

    fn set_brightness(&mut self, value: u8) -> DriverFuture<'_, ()> {
        self.bus.publish_json(self.topic("settings"), &json!({ "BRI": value }), false);
        Box::pin(async { Ok(()) })
    }

    fn set_display_on(&mut self, on: bool) -> DriverFuture<'_, ()> {
        self.bus.publish_json(self.topic("power"), &json!({ "power": on }), false);
        Box::pin(async { Ok(()) })
    }

    fn set_icon(&mut self, id: u32) -> DriverFuture<'_, ()> {
        self.bus.publish_json(self.topic("icon"), &json!({ "icon": id }), false);
        Box::pin(async { Ok(()) })
    }

    fn play_tone(&mut self, freq_hz: u32, duration_ms: u32) -> DriverFuture<'_, ()> {
        self.bus
            .publish_json(self.topic("tone"), &json!({ "freq": freq_hz, "ms": duration_ms }), false);
        Box::pin(async { Ok(()) })
    }
}
