// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-driven 64x64 panel.
//!
//! Speaks the Divoom-style JSON command protocol: every operation is a POST
//! to `http://<host>/post` with a `Command` field, answered by
//! `{"error_code": 0}` on success.  Frames ship as base64 RGB.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;

use crate::device::canvas::{Framebuffer, Rgba};
use crate::device::{Capabilities, Driver, DriverFuture, DriverKind, DriverMetrics};
use crate::error::DriverError;
use crate::state::epoch_ms;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpPanel {
    url: String,
    caps: Capabilities,
    fb: Framebuffer,
    client: reqwest::Client,
    ready: bool,
    pic_id: u32,
    last_pushed: Vec<Rgba>,
    metrics: DriverMetrics,
}

impl HttpPanel {
    pub fn new(host: &str, caps: Capabilities) -> Self {
        let client =
            reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().unwrap_or_default();
        Self {
            url: format!("http://{host}/post"),
            fb: Framebuffer::new(caps.width, caps.height),
            caps,
            client,
            ready: false,
            pic_id: 1,
            last_pushed: Vec::new(),
            metrics: DriverMetrics::default(),
        }
    }

    async fn command(&self, body: serde_json::Value) -> Result<(), DriverError> {
        let resp = self.client.post(&self.url).json(&body).send().await?;
        let resp = resp.error_for_status().map_err(DriverError::from)?;
        let value: serde_json::Value = resp.json().await.map_err(DriverError::from)?;
        match value.get("error_code").and_then(|v| v.as_i64()) {
            None | Some(0) => Ok(()),
            Some(code) => Err(DriverError::io(format!("device reported error_code {code}"))),
        }
    }
}

impl Driver for HttpPanel {
    fn kind(&self) -> DriverKind {
        DriverKind::Real
    }

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn init(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            if self.ready {
                return Ok(());
            }
            self.command(json!({ "Command": "Draw/ResetHttpGifId" })).await?;
            self.pic_id = 1;
            self.ready = true;
            Ok(())
        })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn framebuffer(&mut self) -> &mut Framebuffer {
        &mut self.fb
    }

    fn push(&mut self, scene: &str) -> DriverFuture<'_, u32> {
        let _ = scene;
        Box::pin(async move {
            let changed = self.fb.diff_count(&self.last_pushed);
            let body = json!({
                "Command": "Draw/SendHttpGif",
                "PicNum": 1,
                "PicWidth": self.fb.width(),
                "PicOffset": 0,
                "PicID": self.pic_id,
                "PicSpeed": 1000,
                "PicData": BASE64.encode(self.fb.rgb_bytes()),
            });
            let started = Instant::now();
            match self.command(body).await {
                Ok(()) => {
                    self.pic_id = self.pic_id.wrapping_add(1).max(1);
                    self.last_pushed = self.fb.pixels().to_vec();
                    self.metrics.push_count += 1;
                    self.metrics.last_seen_ts = epoch_ms();
                    self.metrics.last_frametime_ms = started.elapsed().as_millis() as u64;
                    Ok(changed)
                }
                Err(e) => {
                    self.metrics.error_count += 1;
                    Err(e)
                }
            }
        })
    }

    fn reset(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            self.command(json!({ "Command": "Device/SysReboot" })).await?;
            self.fb.clear();
            self.last_pushed.clear();
            self.ready = false;
            Ok(())
        })
    }

    fn metrics(&self) -> DriverMetrics {
        self.metrics
    }

    fn set_brightness(&mut self, value: u8) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            self.command(json!({ "Command": "Channel/SetBrightness", "Brightness": value })).await
        })
    }

    fn set_display_on(&mut self, on: bool) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            self.command(json!({
                "Command": "Channel/OnOffScreen",
                "OnOff": if on { 1 } else { 0 },
            }))
            .await
        })
    }

    fn play_tone(&mut self, freq_hz: u32, duration_ms: u32) -> DriverFuture<'_, ()> {
        // The panel buzzer has a fixed pitch; the requested frequency only
        // gates on/off cycle length.
        let _ = freq_hz;
        Box::pin(async move {
            self.command(json!({
                "Command": "Device/PlayBuzzer",
                "ActiveTimeInCycle": duration_ms,
                "OffTimeInCycle": 0,
                "PlayTotalTime": duration_ms,
            }))
            .await
        })
    }
}
