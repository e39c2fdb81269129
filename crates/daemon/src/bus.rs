// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound bus capability.
//!
//! Everything that publishes to the message bus (scheduler acks, router
//! replies, bus-driven panels, the watchdog's command sequences) goes through
//! a [`BusHandle`] backed by an mpsc channel.  The MQTT adapter drains the
//! channel; without a configured broker the messages are dropped with a
//! debug log.  This is the thin publish capability that keeps the scheduler
//! free of a back-reference to the bus adapter.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One outbound message for the bus adapter to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Cloneable publish capability.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusMessage>,
}

impl BusHandle {
    /// Create a handle and the receiver the bus adapter drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BusMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a raw payload. Fire-and-forget: a full or closed channel drops
    /// the message.
    pub fn publish(&self, topic: impl Into<String>, payload: Vec<u8>, retain: bool) {
        let msg = BusMessage { topic: topic.into(), payload, retain };
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(topic = %msg.topic, "outbound bus queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                debug!(topic = %msg.topic, "bus adapter not running, dropping message");
            }
        }
    }

    /// Enqueue a JSON payload.
    pub fn publish_json<T: Serialize>(&self, topic: impl Into<String>, value: &T, retain: bool) {
        let topic = topic.into();
        match serde_json::to_vec(value) {
            Ok(payload) => self.publish(topic, payload, retain),
            Err(e) => warn!(topic = %topic, err = %e, "failed to encode bus payload"),
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
