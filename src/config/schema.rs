//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body codec settings.
    pub codec: CodecConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route definitions, checked in priority order.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    /// Also bounds response-body buffering.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Body codec configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum bytes buffered when a response body is rewritten.
    pub max_in_memory_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_in_memory_size: 256 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Route configuration mapping requests to a backend URI.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match, case-insensitive).
    pub host: Option<String>,

    /// Path prefix to match (case-sensitive).
    pub path_prefix: Option<String>,

    /// Backend base URI (e.g., "http://127.0.0.1:3000").
    pub uri: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Filters in declaration order.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// Declarative filter definition.
///
/// ```toml
/// [[routes.filters]]
/// type = "strip_prefix"
/// parts = 1
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    SetPath { path: String },
    StripPrefix { parts: usize },
    AddRequestHeader { name: String, value: String },
    AddResponseHeader { name: String, value: String },
    SetStatus { status: u16 },
}
