//! Health check endpoints
//!
//! - /health, /healthz - liveness probe
//! - /ready, /readyz - readiness probe (record store reachable, or dev mode)
//! - /version - deployment verification

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime: u64,
    pub mode: String,
    pub node_id: String,
    pub storage: StorageHealth,
    /// Live gateway connections
    pub connections: usize,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct StorageHealth {
    pub backend: &'static str,
    pub connected: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let (backend, connected) = match state.mongo {
        Some(_) => ("mongodb", true),
        None => ("memory", true),
    };

    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        node_id: state.args.node_id.to_string(),
        storage: StorageHealth { backend, connected },
        connections: state.registry.connection_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Liveness probe
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// Readiness probe: MongoDB must be connected unless running in dev mode
pub fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    let ready = state.mongo.is_some() || state.args.dev_mode;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(
        status,
        &serde_json::json!({
            "ready": ready,
            "storage": state.mongo.is_some(),
        }),
    )
}

/// Version info for deployment verification
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}
