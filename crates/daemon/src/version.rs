// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build identity stamped into bus payloads and the status endpoint.

use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const BUILD_NUMBER: &str = match option_env!("PIXOOD_BUILD_NUMBER") {
    Some(v) => v,
    None => "dev",
};

pub const GIT_COMMIT: &str = match option_env!("PIXOOD_GIT_COMMIT") {
    Some(v) => v,
    None => "unknown",
};

/// Version triplet flattened into outbound acks and state events.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_number: &'static str,
    pub git_commit: &'static str,
}

/// Return the build identity of the running daemon.
pub fn build_info() -> BuildInfo {
    BuildInfo { version: VERSION, build_number: BUILD_NUMBER, git_commit: GIT_COMMIT }
}
