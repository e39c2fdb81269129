// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::device::DriverKind;

/// Configuration for the pixood daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "pixood", about = "Multi-device pixel display controller daemon")]
pub struct DaemonConfig {
    /// Host to bind the REST API on.
    #[arg(long, default_value = "0.0.0.0", env = "PIXOOD_HTTP_HOST")]
    pub http_host: String,

    /// Port for the REST API.
    #[arg(long, default_value_t = 8390, env = "PIXOOD_HTTP_PORT")]
    pub http_port: u16,

    /// Disable the REST API entirely.
    #[arg(long, env = "PIXOOD_HTTP_DISABLED")]
    pub http_disabled: bool,

    /// REST credentials as "user:pass". If unset, auth is disabled.
    #[arg(long, env = "PIXOOD_HTTP_AUTH")]
    pub http_auth: Option<String>,

    /// MQTT broker host. If unset, the bus adapter is disabled.
    #[arg(long, env = "PIXOOD_MQTT_HOST")]
    pub mqtt_host: Option<String>,

    /// MQTT broker port.
    #[arg(long, default_value_t = 1883, env = "PIXOOD_MQTT_PORT")]
    pub mqtt_port: u16,

    /// MQTT username.
    #[arg(long, env = "PIXOOD_MQTT_USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password.
    #[arg(long, env = "PIXOOD_MQTT_PASSWORD")]
    pub mqtt_password: Option<String>,

    /// Data directory for persisted device state.
    #[arg(long, default_value = "./data", env = "PIXOOD_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Explicit path to the persisted device file (overrides --data-dir).
    #[arg(long, env = "PIXOOD_DEVICE_FILE")]
    pub device_file: Option<PathBuf>,

    /// Device registrations, "<ip>=<type>:<driver>" joined by ';'.
    #[arg(long, default_value = "", env = "PIXOOD_DEVICES")]
    pub devices: String,

    /// Scene a device starts on when nothing is persisted for it.
    #[arg(long, default_value = "startup", env = "PIXOOD_STARTUP_SCENE")]
    pub startup_scene: String,

    /// Watchdog check interval in seconds.
    #[arg(long, default_value_t = 10, env = "PIXOOD_WATCHDOG_INTERVAL_S")]
    pub watchdog_interval_s: u64,

    /// Grace window for in-flight pushes on shutdown, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "PIXOOD_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: u64,
}

impl DaemonConfig {
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_s)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Resolve the persisted device file: explicit path wins over data dir.
    pub fn device_file_path(&self) -> PathBuf {
        match &self.device_file {
            Some(path) => path.clone(),
            None => self.data_dir.join("devices.json"),
        }
    }

    /// Parse the registration shorthand into device specs.
    ///
    /// A malformed entry is a startup error, not a skipped device.
    pub fn device_specs(&self) -> anyhow::Result<Vec<DeviceSpec>> {
        let mut specs = Vec::new();
        for entry in self.devices.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            specs.push(DeviceSpec::parse(entry)?);
        }
        Ok(specs)
    }

    /// Parsed REST credentials, if configured.
    pub fn http_auth_pair(&self) -> Option<(String, String)> {
        let raw = self.http_auth.as_deref()?;
        let (user, pass) = raw.split_once(':')?;
        Some((user.to_owned(), pass.to_owned()))
    }
}

/// One `<ip>=<type>:<driver>` registration from the CLI or environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub id: String,
    pub device_type: String,
    pub driver: DriverKind,
}

impl DeviceSpec {
    pub fn parse(entry: &str) -> anyhow::Result<Self> {
        let (id, rest) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("device entry {entry:?} is missing '='"))?;
        let id = id.trim();
        if id.is_empty() {
            anyhow::bail!("device entry {entry:?} has an empty id");
        }
        let (device_type, driver) = match rest.split_once(':') {
            Some((ty, drv)) => (ty.trim(), DriverKind::parse(drv.trim())?),
            None => (rest.trim(), DriverKind::Real),
        };
        if device_type.is_empty() {
            anyhow::bail!("device entry {entry:?} has an empty device type");
        }
        Ok(Self { id: id.to_owned(), device_type: device_type.to_owned(), driver })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
