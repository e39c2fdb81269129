// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon state: the single source of truth for device entries,
//! per-device scene state, and scheduler generations.
//!
//! Locking model: the devices map takes a global read lock for snapshots
//! only; everything per-device goes through that device's own mutexes.
//! `scene` is the device mutex of the scheduler protocol; `driver` guards
//! all hardware I/O; lock order is always scene before driver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::bus::BusHandle;
use crate::config::DaemonConfig;
use crate::device::{Driver, DriverKind};
use crate::events::EventFeed;
use crate::persist::{PersistedDevice, PersistedDevices};
use crate::scene::SceneRegistry;
use crate::scheduler::SwitchRequest;

/// Shared daemon state.
pub struct DaemonState {
    pub config: DaemonConfig,
    pub devices: RwLock<HashMap<String, Arc<DeviceEntry>>>,
    pub registry: SceneRegistry,
    pub feed: EventFeed,
    pub bus: BusHandle,
    pub mqtt: parking_lot::Mutex<MqttStatus>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    pub start_epoch_ms: u64,
}

impl DaemonState {
    pub fn new(
        config: DaemonConfig,
        registry: SceneRegistry,
        bus: BusHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            devices: RwLock::new(HashMap::new()),
            registry,
            feed: EventFeed::new(),
            bus,
            mqtt: parking_lot::Mutex::new(MqttStatus::default()),
            shutdown,
            started_at: Instant::now(),
            start_epoch_ms: epoch_ms(),
        }
    }

    pub async fn device(&self, id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices.read().await.get(id).map(Arc::clone)
    }

    /// Snapshot of all device entries, sorted by id.
    pub async fn list_devices(&self) -> Vec<Arc<DeviceEntry>> {
        let mut entries: Vec<_> = self.devices.read().await.values().map(Arc::clone).collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub async fn insert_device(&self, entry: Arc<DeviceEntry>) {
        self.devices.write().await.insert(entry.id.clone(), entry);
    }

    /// Remove a device, cancelling its outstanding work.
    pub async fn remove_device(&self, id: &str) -> bool {
        let removed = self.devices.write().await.remove(id);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                let mut scene = entry.scene.lock().await;
                scene.cancel_loop();
                true
            }
            None => false,
        }
    }

    /// Write the durable subset of device state to disk atomically.
    pub async fn persist_now(&self) {
        let mut snapshot = PersistedDevices::default();
        for entry in self.list_devices().await {
            let settings = entry.settings.lock().clone();
            // An explicitly stopped device must not resurrect its scene on
            // the next boot; only active scenes are recovery candidates.
            let last_scene = {
                let sc = entry.scene.lock().await;
                match sc.status {
                    SceneStatus::Running | SceneStatus::Switching => sc.current_scene.clone(),
                    SceneStatus::Idle | SceneStatus::Stopped => None,
                }
            };
            snapshot.devices.insert(
                entry.id.clone(),
                PersistedDevice {
                    device_type: entry.device_type.clone(),
                    driver: settings.driver_kind,
                    name: settings.name,
                    brightness: settings.brightness,
                    display_on: settings.display_on,
                    startup_scene: settings.startup_scene,
                    last_scene,
                    watchdog: settings.watchdog,
                },
            );
        }
        let path = self.config.device_file_path();
        if let Err(e) = crate::persist::save(&path, &snapshot) {
            tracing::warn!(path = %path.display(), err = %e, "failed to persist device state");
        }
    }
}

/// Connection status of the bus adapter, surfaced over `/api/status`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttStatus {
    pub connected: bool,
    pub retry_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Mutable non-scene device settings.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub name: String,
    pub brightness: u8,
    pub display_on: bool,
    pub startup_scene: String,
    pub driver_kind: DriverKind,
    pub watchdog: WatchdogConfig,
}

/// Per-device watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default)]
    pub action: WatchdogAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_scene: Option<String>,
    #[serde(default)]
    pub check_when_off: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<BusCommand>,
}

fn default_timeout_minutes() -> u64 {
    5
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_minutes: default_timeout_minutes(),
            action: WatchdogAction::default(),
            fallback_scene: None,
            check_when_off: false,
            commands: Vec::new(),
        }
    }
}

/// Remediation executed when the watchdog trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchdogAction {
    #[default]
    Restart,
    FallbackScene,
    MqttCommandSequence,
    Notify,
}

impl WatchdogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::FallbackScene => "fallback-scene",
            Self::MqttCommandSequence => "mqtt-command-sequence",
            Self::Notify => "notify",
        }
    }
}

/// One configured bus message for the `mqtt-command-sequence` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusCommand {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Scene lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Idle,
    Switching,
    Running,
    Stopped,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Switching => "switching",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Frame-loop play state, orthogonal to [`SceneStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Running,
    Paused,
    Stopped,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

/// Per-device scene state, owned by the state store and mutated only under
/// the device mutex.
pub struct DeviceSceneState {
    pub current_scene: Option<String>,
    pub target_scene: Option<String>,
    /// Monotonic generation; outstanding wakeups tagged with an older value
    /// are dead.
    pub generation: u64,
    pub status: SceneStatus,
    pub play_state: PlayState,
    /// Cancellation handle for the scheduled next-frame wakeup.
    pub loop_token: Option<CancellationToken>,
    /// Effective delay of the current loop, used to re-arm paused wakeups.
    pub loop_delay: Option<Duration>,
    /// Frames rendered in the current activation.
    pub frame: u64,
    /// Activation-scoped frame cap from the command payload.
    pub frame_limit: Option<u64>,
    /// Activation-scoped delay override from the command payload.
    pub interval_override: Option<Duration>,
    /// Full command payload, forwarded to the scene on every call.
    pub payload: serde_json::Value,
    pub last_frame_ts: u64,
    /// Opaque per-scene state bags, keyed by scene name.
    pub scene_state: HashMap<String, serde_json::Map<String, serde_json::Value>>,
}

impl Default for DeviceSceneState {
    fn default() -> Self {
        Self {
            current_scene: None,
            target_scene: None,
            generation: 0,
            status: SceneStatus::Idle,
            play_state: PlayState::Stopped,
            loop_token: None,
            loop_delay: None,
            frame: 0,
            frame_limit: None,
            interval_override: None,
            payload: serde_json::Value::Null,
            last_frame_ts: 0,
            scene_state: HashMap::new(),
        }
    }
}

impl DeviceSceneState {
    /// Cancel and drop the outstanding wakeup, if any. Idempotent.
    pub fn cancel_loop(&mut self) {
        if let Some(token) = self.loop_token.take() {
            token.cancel();
        }
        self.loop_delay = None;
    }

    /// Record a frame timestamp, strictly greater than the previous one.
    pub fn mark_frame(&mut self) {
        self.last_frame_ts = epoch_ms().max(self.last_frame_ts + 1);
    }
}

/// Switch coalescing lane: at most one switch runs, at most one waits.
#[derive(Default)]
pub struct SwitchLane {
    pub busy: bool,
    pub pending: Option<SwitchRequest>,
}

/// One registered device.
pub struct DeviceEntry {
    pub id: String,
    pub device_type: String,
    pub settings: parking_lot::Mutex<DeviceSettings>,
    pub driver: tokio::sync::Mutex<Box<dyn Driver>>,
    pub scene: tokio::sync::Mutex<DeviceSceneState>,
    pub lane: parking_lot::Mutex<SwitchLane>,
    /// Consecutive render failures of the active looping scene.
    pub render_failures: AtomicU32,
    pub degraded: AtomicBool,
    /// Consecutive over-threshold watchdog checks.
    pub watchdog_strikes: AtomicU32,
    /// True while a self-looping scene is expected to push frames.
    pub expects_frames: AtomicBool,
    /// Last successful push, mirrored from driver metrics so the watchdog
    /// never has to take a device lock.
    pub last_push_ms: AtomicU64,
    pub cancel: CancellationToken,
}

impl DeviceEntry {
    pub fn new(
        id: &str,
        device_type: &str,
        settings: DeviceSettings,
        driver: Box<dyn Driver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            device_type: device_type.to_owned(),
            settings: parking_lot::Mutex::new(settings),
            driver: tokio::sync::Mutex::new(driver),
            scene: tokio::sync::Mutex::new(DeviceSceneState::default()),
            lane: parking_lot::Mutex::new(SwitchLane::default()),
            render_failures: AtomicU32::new(0),
            degraded: AtomicBool::new(false),
            watchdog_strikes: AtomicU32::new(0),
            expects_frames: AtomicBool::new(false),
            last_push_ms: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        })
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
