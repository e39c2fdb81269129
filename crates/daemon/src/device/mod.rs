// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device abstraction layer: capability descriptors, the polymorphic driver
//! contract, and the profile/driver registry.

pub mod bus_panel;
pub mod canvas;
pub mod font;
pub mod http_panel;
pub mod mock;

pub use canvas::{Align, Framebuffer, Point, Rgba};

use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::bus::BusHandle;
use crate::error::{ApiError, DriverError};

/// Driver implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Real,
    Mock,
}

impl DriverKind {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "real" => Ok(Self::Real),
            "mock" => Ok(Self::Mock),
            other => anyhow::bail!("unknown driver kind {other:?} (expected \"real\" or \"mock\")"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of what a panel can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub width: u16,
    pub height: u16,
    pub color_depth: u8,
    pub audio: bool,
    pub native_text: bool,
    pub native_icons: bool,
    pub native_primitives: bool,
    pub custom_app_push: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_range: Option<[u8; 2]>,
    pub display_power: bool,
}

impl Capabilities {
    /// A canvas with zero area or zero depth cannot host a device.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.color_depth > 0
    }

    pub fn has_brightness(&self) -> bool {
        self.brightness_range.is_some()
    }
}

/// Rolling per-driver counters surfaced over REST and frame acks.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverMetrics {
    pub push_count: u64,
    pub error_count: u64,
    pub last_seen_ts: u64,
    pub last_frametime_ms: u64,
}

pub type DriverFuture<'a, T> = BoxFuture<'a, Result<T, DriverError>>;

/// Uniform canvas/push contract implemented by every panel driver.
///
/// Object-safe: async operations return boxed futures so the scheduler can
/// hold drivers as `Box<dyn Driver>`.  Optional operations default to
/// `Unsupported`; a driver only overrides what its capabilities advertise.
pub trait Driver: Send {
    fn kind(&self) -> DriverKind;

    fn capabilities(&self) -> &Capabilities;

    /// Establish readiness. Idempotent.
    fn init(&mut self) -> DriverFuture<'_, ()>;

    fn is_ready(&self) -> bool;

    /// The in-memory canvas frames are composed on.
    fn framebuffer(&mut self) -> &mut Framebuffer;

    /// Clear the framebuffer. Does not push.
    fn clear(&mut self) {
        self.framebuffer().clear();
    }

    /// Atomically ship the current framebuffer to hardware.
    ///
    /// Returns the number of pixels that changed since the last push and
    /// updates the driver's metrics.
    fn push(&mut self, scene: &str) -> DriverFuture<'_, u32>;

    /// Device-level soft reset; bounded by the driver's own timeout.
    fn reset(&mut self) -> DriverFuture<'_, ()>;

    fn metrics(&self) -> DriverMetrics;

    fn set_brightness(&mut self, value: u8) -> DriverFuture<'_, ()> {
        let _ = value;
        Box::pin(async { Err(DriverError::unsupported("setBrightness")) })
    }

    fn set_display_on(&mut self, on: bool) -> DriverFuture<'_, ()> {
        let _ = on;
        Box::pin(async { Err(DriverError::unsupported("setDisplayOn")) })
    }

    fn set_icon(&mut self, id: u32) -> DriverFuture<'_, ()> {
        let _ = id;
        Box::pin(async { Err(DriverError::unsupported("setIcon")) })
    }

    fn play_tone(&mut self, freq_hz: u32, duration_ms: u32) -> DriverFuture<'_, ()> {
        let _ = (freq_hz, duration_ms);
        Box::pin(async { Err(DriverError::unsupported("playTone")) })
    }
}

/// Static profile for one `deviceType`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub device_type: &'static str,
    pub capabilities: Capabilities,
}

/// Look up a device profile by `deviceType` key.
pub fn profile(device_type: &str) -> Option<DeviceProfile> {
    match device_type {
        "pixoo64" => Some(DeviceProfile {
            device_type: "pixoo64",
            capabilities: Capabilities {
                width: 64,
                height: 64,
                color_depth: 24,
                audio: true,
                native_text: true,
                native_icons: false,
                native_primitives: true,
                custom_app_push: false,
                brightness_range: Some([0, 100]),
                display_power: true,
            },
        }),
        "awtrix" => Some(DeviceProfile {
            device_type: "awtrix",
            capabilities: Capabilities {
                width: 32,
                height: 8,
                color_depth: 24,
                audio: true,
                native_text: false,
                native_icons: true,
                native_primitives: false,
                custom_app_push: true,
                brightness_range: Some([0, 100]),
                display_power: true,
            },
        }),
        _ => None,
    }
}

/// Construct a driver for a device.
///
/// The profile decides the real transport: `pixoo64` panels speak HTTP,
/// `awtrix` panels are bus-driven.  Mock drivers adopt the profile's
/// capabilities so swaps keep the canvas shape.
pub fn build_driver(
    device_id: &str,
    device_type: &str,
    kind: DriverKind,
    bus: &BusHandle,
) -> Result<Box<dyn Driver>, ApiError> {
    let profile = profile(device_type).ok_or(ApiError::BadRequest)?;
    let caps = profile.capabilities;
    match (kind, profile.device_type) {
        (DriverKind::Mock, _) => Ok(Box::new(mock::MockDriver::new(caps))),
        (DriverKind::Real, "pixoo64") => Ok(Box::new(http_panel::HttpPanel::new(device_id, caps))),
        (DriverKind::Real, "awtrix") => {
            Ok(Box::new(bus_panel::BusPanel::new(device_id, caps, bus.clone())))
        }
        (DriverKind::Real, _) => Err(ApiError::BadRequest),
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
