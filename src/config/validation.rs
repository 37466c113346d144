//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (deadline > 0, cache sizes > 0)
//! - Check the shape of the cache backend tree and peer addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{BackendConfig, ServerConfig};

/// One semantic problem, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.timeouts.handler_secs == 0 {
        errors.push(ValidationError::new("timeouts.handler_secs", "must be greater than 0"));
    }

    if config.cache.enabled {
        validate_backend(&config.cache.backend, "cache.backend", true, &mut errors);
    }

    for (i, peer) in config.peers.peers.iter().enumerate() {
        match Url::parse(peer) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => errors.push(ValidationError::new(
                format!("peers.peers[{}]", i),
                format!("`{}` is not an http(s) URL", peer),
            )),
        }
    }
    if !config.peers.invalidation_path.starts_with('/') {
        errors.push(ValidationError::new("peers.invalidation_path", "must start with `/`"));
    }
    if config.peers.broadcast_timeout_ms == 0 {
        errors.push(ValidationError::new("peers.broadcast_timeout_ms", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(backend: &BackendConfig, field: &str, root: bool, errors: &mut Vec<ValidationError>) {
    match backend {
        BackendConfig::Map { prune_frequency_secs } => {
            if *prune_frequency_secs == 0 {
                errors.push(ValidationError::new(
                    format!("{}.prune_frequency_secs", field),
                    "must be greater than 0",
                ));
            }
        }
        BackendConfig::Memory {
            max_size,
            average_size,
            prune_frequency_secs,
        } => {
            if *max_size == 0 {
                errors.push(ValidationError::new(format!("{}.max_size", field), "must be greater than 0"));
            }
            if *average_size > *max_size {
                errors.push(ValidationError::new(
                    format!("{}.average_size", field),
                    "must not exceed max_size",
                ));
            }
            if *prune_frequency_secs == 0 {
                errors.push(ValidationError::new(
                    format!("{}.prune_frequency_secs", field),
                    "must be greater than 0",
                ));
            }
        }
        BackendConfig::Tiered { tiers } => {
            if tiers.is_empty() {
                errors.push(ValidationError::new(format!("{}.tiers", field), "must not be empty"));
            }
            for (i, tier) in tiers.iter().enumerate() {
                validate_backend(tier, &format!("{}.tiers[{}]", field, i), false, errors);
            }
        }
        BackendConfig::Distributed { local } => {
            if !root {
                errors.push(ValidationError::new(
                    field,
                    "distributed backend is only allowed as the root backend",
                ));
            }
            validate_backend(local, &format!("{}.local", field), false, errors);
        }
    }
}
