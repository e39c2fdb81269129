// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end smoke tests.
//!
//! Spawns the real `pixood` binary with mock devices registered through the
//! environment shorthand and exercises it over the REST surface.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `pixood` binary.
pub fn pixood_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("pixood")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `pixood` process that is killed on drop.
pub struct PixoodProcess {
    child: Child,
    port: u16,
}

impl PixoodProcess {
    /// Start the daemon with the given device shorthand and data directory.
    ///
    /// The data directory is caller-owned so it can survive a restart.
    pub fn start(devices: &str, data_dir: &Path) -> anyhow::Result<Self> {
        let port = free_port()?;
        let child = Command::new(pixood_binary())
            .env("PIXOOD_HTTP_HOST", "127.0.0.1")
            .env("PIXOOD_HTTP_PORT", port.to_string())
            .env("PIXOOD_DEVICES", devices)
            .env("PIXOOD_DATA_DIR", data_dir)
            .env("RUST_LOG", "warn")
            .env_remove("PIXOOD_MQTT_HOST")
            .env_remove("PIXOOD_HTTP_AUTH")
            .env_remove("PIXOOD_HTTP_DISABLED")
            .env_remove("PIXOOD_DEVICE_FILE")
            .env_remove("PIXOOD_STARTUP_SCENE")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Self { child, port })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll `/api/status` until the daemon answers.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let url = format!("{}/api/status", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(resp) = reqwest::get(&url).await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("pixood never became healthy on {url}");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Poll a device record until the predicate holds.
    pub async fn wait_device<F>(
        &self,
        ip: &str,
        timeout: Duration,
        predicate: F,
    ) -> anyhow::Result<serde_json::Value>
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        let url = format!("{}/api/devices/{ip}", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(resp) = reqwest::get(&url).await {
                if resp.status().is_success() {
                    if let Ok(body) = resp.json::<serde_json::Value>().await {
                        if predicate(&body) {
                            return Ok(body);
                        }
                    }
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("device {ip} never reached the expected state");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Drop for PixoodProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
