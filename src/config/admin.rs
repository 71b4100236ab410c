//! Admin endpoint configuration

use serde::Deserialize;
use std::net::SocketAddr;

/// Admin HTTP endpoint (`/status`, `/health`, `/metrics`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Whether the admin server runs
    pub enabled: bool,
    /// Whether Prometheus metrics are collected and served
    pub metrics: bool,
    /// HTTP bind address
    pub bind: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics: true,
            bind: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}
