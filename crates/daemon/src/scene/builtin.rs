// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in scene set.
//!
//! Deliberately small: enough to blank a panel, show a solid color, stamp
//! the running version, and keep a ticking clock on screen.  Richer scenes
//! plug in through the same [`Scene`] contract.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::device::{Align, Point, Rgba};
use crate::error::SceneError;
use crate::scene::{RenderOutcome, Scene, SceneContext, SceneDescriptor};
use crate::version;

/// All scenes registered at startup.
pub fn all() -> Vec<Arc<dyn Scene>> {
    vec![
        Arc::new(EmptyScene),
        Arc::new(FillScene),
        Arc::new(StartupScene),
        Arc::new(ClockScene),
    ]
}

/// One-shot blank frame.
pub struct EmptyScene;

impl Scene for EmptyScene {
    fn descriptor(&self) -> SceneDescriptor {
        SceneDescriptor::new("empty", false).with_description("Blank the panel")
    }

    fn render(&self, ctx: &mut SceneContext<'_>) -> Result<RenderOutcome, SceneError> {
        ctx.canvas.clear();
        Ok(RenderOutcome::Done)
    }
}

/// One-shot solid color from the payload (`{"color": [r, g, b, a]}`).
pub struct FillScene;

impl FillScene {
    fn color(ctx: &SceneContext<'_>) -> Rgba {
        let Some(arr) = ctx.payload_field("color").and_then(|v| v.as_array()) else {
            return Rgba::WHITE;
        };
        let ch = |i: usize, default: u8| {
            arr.get(i).and_then(|v| v.as_u64()).map(|v| v.min(255) as u8).unwrap_or(default)
        };
        Rgba(ch(0, 255), ch(1, 255), ch(2, 255), ch(3, 255))
    }
}

impl Scene for FillScene {
    fn descriptor(&self) -> SceneDescriptor {
        SceneDescriptor::new("fill", false).with_description("Fill the panel with one color")
    }

    fn render(&self, ctx: &mut SceneContext<'_>) -> Result<RenderOutcome, SceneError> {
        let color = Self::color(ctx);
        let (w, h) = (ctx.canvas.width() as i32, ctx.canvas.height() as i32);
        ctx.canvas.fill_rect(Point::new(0, 0), Point::new(w - 1, h - 1), color);
        Ok(RenderOutcome::Done)
    }
}

/// One-shot version banner shown after boot.
pub struct StartupScene;

impl Scene for StartupScene {
    fn descriptor(&self) -> SceneDescriptor {
        SceneDescriptor::new("startup", false)
            .with_description("Version banner")
            .with_category("system")
    }

    fn render(&self, ctx: &mut SceneContext<'_>) -> Result<RenderOutcome, SceneError> {
        ctx.canvas.clear();
        let cx = ctx.canvas.width() as i32 / 2;
        ctx.canvas.draw_text("PIXOOD", Point::new(cx, 1), Rgba::WHITE, Align::Center);
        if ctx.canvas.height() >= 16 {
            ctx.canvas.draw_text(
                version::VERSION,
                Point::new(cx, 8),
                Rgba::opaque(120, 120, 120),
                Align::Center,
            );
        }
        Ok(RenderOutcome::Done)
    }
}

/// Self-looping HH:MM:SS clock, one frame per second.
pub struct ClockScene;

impl ClockScene {
    fn hhmmss() -> String {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let day = secs % 86_400;
        format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
    }
}

impl Scene for ClockScene {
    fn descriptor(&self) -> SceneDescriptor {
        SceneDescriptor::new("clock", true).with_description("Ticking HH:MM:SS clock")
    }

    fn init(&self, ctx: &mut SceneContext<'_>) -> Result<(), SceneError> {
        ctx.set_state("ticks", json!(0));
        Ok(())
    }

    fn render(&self, ctx: &mut SceneContext<'_>) -> Result<RenderOutcome, SceneError> {
        let ticks = ctx.get_state("ticks").and_then(|v| v.as_u64()).unwrap_or(0);
        ctx.canvas.clear();
        let cx = ctx.canvas.width() as i32 / 2;
        let cy = (ctx.canvas.height() as i32 / 2 - 2).max(0);
        ctx.canvas.draw_text(&Self::hhmmss(), Point::new(cx, cy), Rgba::WHITE, Align::Center);
        ctx.set_state("ticks", json!(ticks + 1));
        Ok(RenderOutcome::Next(Duration::from_secs(1)))
    }
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
