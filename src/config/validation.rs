//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts and limits > 0, addresses parse)
//! - Check route definitions compile (backend uris, filters, paths)
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;
use crate::routing::{build_filter, parse_target, RouteError};

/// A single semantic problem in the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is not a valid socket address: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("route name must not be empty")]
    EmptyRouteName,

    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("route '{route}': {source}")]
    Route {
        route: String,
        #[source]
        source: RouteError,
    },
}

/// Check `config`, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    for (field, value) in [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("codec.max_in_memory_size", config.codec.max_in_memory_size as u64),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName);
        } else if !seen.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        let mut route_error = |source: RouteError| {
            errors.push(ValidationError::Route {
                route: route.name.clone(),
                source,
            })
        };

        if let Err(e) = parse_target(&route.uri) {
            route_error(e);
        }
        if let Some(prefix) = route.path_prefix.as_deref().filter(|p| !p.starts_with('/')) {
            route_error(RouteError::InvalidPath(prefix.to_owned()));
        }
        for filter in &route.filters {
            if let Err(e) = build_filter(filter) {
                route_error(e);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FilterConfig, RouteConfig};

    fn route(name: &str, uri: &str) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            host: None,
            path_prefix: Some("/".into()),
            uri: uri.into(),
            priority: 0,
            filters: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.codec.max_in_memory_size = 0;
        config.timeouts.request_secs = 0;
        config.routes.push(route("a", "http://127.0.0.1:1"));
        config.routes.push(route("a", "ftp://127.0.0.1:1"));
        config.routes.push(RouteConfig {
            path_prefix: Some("api".into()),
            filters: vec![FilterConfig::SetPath { path: "nope".into() }],
            ..route("b", "http://127.0.0.1:1")
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateRoute(name) if name == "a")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Zero("codec.max_in_memory_size"))));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
