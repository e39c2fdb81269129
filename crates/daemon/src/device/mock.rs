// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory mock driver.
//!
//! Every operation succeeds instantly; pushed frames are recorded on a
//! shared [`MockProbe`] so tests can assert on them after the driver has
//! been boxed behind the scheduler.  The probe also carries the failure and
//! freeze hooks the scheduler/watchdog tests rely on.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::canvas::{Framebuffer, Rgba};
use crate::device::{Capabilities, Driver, DriverFuture, DriverKind, DriverMetrics};
use crate::error::DriverError;
use crate::state::epoch_ms;

/// One recorded push.
#[derive(Debug, Clone)]
pub struct PushedFrame {
    pub scene: String,
    pub pixels: Vec<Rgba>,
    pub ts: u64,
}

#[derive(Debug, Default)]
struct ProbeInner {
    pushes: Vec<PushedFrame>,
    fail_pushes: bool,
    fail_remaining: u32,
    frozen: bool,
    resets: u32,
    tones: Vec<(u32, u32)>,
    brightness: u8,
    display_on: bool,
    metrics: DriverMetrics,
}

/// Shared observation/control handle for a [`MockDriver`].
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    inner: Arc<Mutex<ProbeInner>>,
}

impl MockProbe {
    pub fn pushes(&self) -> Vec<PushedFrame> {
        self.inner.lock().pushes.clone()
    }

    pub fn push_count(&self) -> u64 {
        self.inner.lock().metrics.push_count
    }

    pub fn last_scene(&self) -> Option<String> {
        self.inner.lock().pushes.last().map(|f| f.scene.clone())
    }

    pub fn metrics(&self) -> DriverMetrics {
        self.inner.lock().metrics
    }

    pub fn resets(&self) -> u32 {
        self.inner.lock().resets
    }

    pub fn brightness(&self) -> u8 {
        self.inner.lock().brightness
    }

    pub fn display_on(&self) -> bool {
        self.inner.lock().display_on
    }

    pub fn tones(&self) -> Vec<(u32, u32)> {
        self.inner.lock().tones.clone()
    }

    /// Make every subsequent push fail until cleared.
    pub fn set_fail_pushes(&self, fail: bool) {
        self.inner.lock().fail_pushes = fail;
    }

    /// Make the next `n` pushes fail, then recover.
    pub fn fail_next_pushes(&self, n: u32) {
        self.inner.lock().fail_remaining = n;
    }

    /// Freeze metrics: pushes still succeed but `lastSeenTs` stops advancing.
    pub fn set_frozen(&self, frozen: bool) {
        self.inner.lock().frozen = frozen;
    }

    /// Pin `lastSeenTs` to a specific timestamp (combine with freezing to
    /// simulate a device that silently stopped acking long ago).
    pub fn set_last_seen(&self, ts: u64) {
        self.inner.lock().metrics.last_seen_ts = ts;
    }
}

/// Mock panel backed by the probe above.
pub struct MockDriver {
    caps: Capabilities,
    fb: Framebuffer,
    ready: bool,
    last_pushed: Vec<Rgba>,
    probe: MockProbe,
}

impl MockDriver {
    pub fn new(caps: Capabilities) -> Self {
        Self::with_probe(caps, MockProbe::default())
    }

    pub fn with_probe(caps: Capabilities, probe: MockProbe) -> Self {
        let fb = Framebuffer::new(caps.width, caps.height);
        Self { caps, fb, ready: false, last_pushed: Vec::new(), probe }
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Driver for MockDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mock
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
        let result = {
            let mut inner = self.probe.inner.lock();
            if inner.fail_pushes || inner.fail_remaining > 0 {
                inner.fail_remaining = inner.fail_remaining.saturating_sub(1);
                inner.metrics.error_count += 1;
                Err(DriverError::io("mock push failure"))
            } else {
                let changed = self.fb.diff_count(&self.last_pushed);
                self.last_pushed = self.fb.pixels().to_vec();
                inner.pushes.push(PushedFrame {
                    scene: scene.to_owned(),
                    pixels: self.last_pushed.clone(),
                    ts: epoch_ms(),
                });
                if !inner.frozen {
                    inner.metrics.push_count += 1;
                    inner.metrics.last_seen_ts = epoch_ms();
                    inner.metrics.last_frametime_ms = 1;
                }
                Ok(changed)
            }
        };
        Box::pin(async move { result })
    }

    fn reset(&mut self) -> DriverFuture<'_, ()> {
        self.fb.clear();
        self.last_pushed.clear();
        self.probe.inner.lock().resets += 1;
        Box::pin(async { Ok(()) })
    }

    fn metrics(&self) -> DriverMetrics {
        self.probe.inner.lock().metrics
    }

    fn set_brightness(&mut self, value: u8) -> DriverFuture<'_, ()> {
        self.probe.inner.lock().brightness = value;
        Box::pin(async { Ok(()) })
    }

    fn set_display_on(&mut self, on: bool) -> DriverFuture<'_, ()> {
        self.probe.inner.lock().display_on = on;
        Box::pin(async { Ok(()) })
    }

    fn play_tone(&mut self, freq_hz: u32, duration_ms: u32) -> DriverFuture<'_, ()> {
        self.probe.inner.lock().tones.push((freq_hz, duration_ms));
        Box::pin(async { Ok(()) })
    }
}
