// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scene contract and registry.
//!
//! A scene draws frames onto the device canvas through a [`SceneContext`]
//! and steers its own cadence by what `render` returns: another frame after
//! a delay, or terminal.  All per-activation variability travels in the
//! command payload and the per-scene state bag, never in the method
//! signatures.  The registry is populated once at startup and immutable
//! afterwards.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::device::Framebuffer;
use crate::error::SceneError;

/// Outcome of a successful render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Frame drawn; request the next frame after this delay.
    Next(Duration),
    /// Frame drawn; this activation produces no further frames.
    Done,
}

/// Metadata describing a registered scene.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub wants_loop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip)]
    pub hidden: bool,
}

impl SceneDescriptor {
    pub fn new(name: &str, wants_loop: bool) -> Self {
        Self { name: name.to_owned(), description: None, wants_loop, category: None, hidden: false }
    }

    pub fn with_description(mut self, d: &str) -> Self {
        self.description = Some(d.to_owned());
        self
    }

    pub fn with_category(mut self, c: &str) -> Self {
        self.category = Some(c.to_owned());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Everything a scene sees while it runs.
///
/// `state` is the opaque key/value bag bound to `(device, scene)`; it
/// survives across frames of one activation and across re-activations of
/// the same scene on the same device.
pub struct SceneContext<'a> {
    pub device_id: &'a str,
    pub canvas: &'a mut Framebuffer,
    pub payload: &'a serde_json::Value,
    pub state: &'a mut serde_json::Map<String, serde_json::Value>,
    /// Frames already rendered in this activation.
    pub frame: u64,
}

impl SceneContext<'_> {
    /// Read a payload field.
    pub fn payload_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// Read a value from the state bag.
    pub fn get_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    /// Write a value into the state bag.
    pub fn set_state(&mut self, key: &str, value: serde_json::Value) {
        self.state.insert(key.to_owned(), value);
    }
}

/// Named renderer drawing onto a device canvas.
pub trait Scene: Send + Sync {
    fn descriptor(&self) -> SceneDescriptor;

    /// One-time setup for an activation. The full command payload is
    /// available on the context.
    fn init(&self, ctx: &mut SceneContext<'_>) -> Result<(), SceneError> {
        let _ = ctx;
        Ok(())
    }

    /// Produce exactly one frame into the canvas.
    fn render(&self, ctx: &mut SceneContext<'_>) -> Result<RenderOutcome, SceneError>;

    /// Teardown when the activation ends by a switch. Failures are logged,
    /// never fatal.
    fn cleanup(&self, ctx: &mut SceneContext<'_>) -> Result<(), SceneError> {
        let _ = ctx;
        Ok(())
    }
}

/// Process-wide scene table, immutable after startup.
pub struct SceneRegistry {
    scenes: HashMap<String, Arc<dyn Scene>>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self { scenes: HashMap::new() }
    }

    /// Registry pre-loaded with the built-in scene set.
    pub fn with_builtins() -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for scene in builtin::all() {
            registry.register(scene)?;
        }
        Ok(registry)
    }

    /// Register a scene. A duplicate name is a startup error.
    pub fn register(&mut self, scene: Arc<dyn Scene>) -> anyhow::Result<()> {
        let name = scene.descriptor().name;
        if self.scenes.contains_key(&name) {
            anyhow::bail!("duplicate scene name {name:?}");
        }
        self.scenes.insert(name, scene);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Scene>> {
        self.scenes.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    /// Descriptors sorted by name.
    pub fn list(&self) -> Vec<SceneDescriptor> {
        let mut out: Vec<SceneDescriptor> =
            self.scenes.values().map(|s| s.descriptor()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
