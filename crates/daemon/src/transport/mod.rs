// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST and message-bus adapters.

pub mod auth;
pub mod http;
pub mod mqtt;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::DaemonState;

/// Build the axum `Router` with the full REST surface.
pub fn build_router(state: Arc<DaemonState>) -> Router {
    Router::new()
        // Daemon
        .route("/api/status", get(http::status))
        .route("/api/daemon/restart", post(http::daemon_restart))
        // Devices
        .route("/api/devices", get(http::list_devices))
        .route("/api/devices/{ip}", get(http::get_device))
        .route("/api/devices/{ip}/metrics", get(http::device_metrics))
        .route("/api/devices/{ip}/scene", post(http::set_scene))
        .route("/api/devices/{ip}/scene/pause", post(http::pause))
        .route("/api/devices/{ip}/scene/resume", post(http::resume))
        .route("/api/devices/{ip}/scene/stop", post(http::stop))
        .route("/api/devices/{ip}/brightness", post(http::brightness))
        .route("/api/devices/{ip}/display", post(http::display))
        .route("/api/devices/{ip}/reboot", post(http::reboot))
        .route("/api/devices/{ip}/driver", post(http::driver))
        .route("/api/devices/{ip}/reset", post(http::reset))
        // Scenes
        .route("/api/scenes", get(http::scenes))
        // Diagnostics
        .route("/api/tests", get(http::diag_list))
        .route("/api/tests/run", post(http::diag_run_all))
        .route("/api/tests/{id}/run", post(http::diag_run))
        .fallback(http::not_found)
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
