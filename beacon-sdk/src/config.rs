//! SDK configuration
//!
//! Loaded from a TOML file shipped with the host app, or constructed
//! directly. All pipeline tunables have defaults; only the endpoint and app
//! identity are required.

use std::path::Path;
use std::time::Duration;

use beacon_core::envelope::{Environment, Platform};
use beacon_core::protocol::limits;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Configuration for the Beacon SDK
#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    /// Ingestion endpoint base URL (e.g., `https://telemetry.example.com`)
    pub endpoint: String,

    /// Application name stamped on every envelope
    pub app_name: String,

    /// Application version (marketing version)
    pub app_version: String,

    /// Build identifier
    pub build: String,

    /// Client platform
    pub platform: Platform,

    /// Deployment environment
    pub environment: Environment,

    /// Max envelopes held in the local durable queue; oldest are evicted
    /// first past this bound
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,

    /// Envelopes per delivery attempt (max 50)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between scheduled flushes
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Seconds of background inactivity after which the session rotates
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Max delivery attempts per batch before leaving it queued
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl SdkConfig {
    /// Load configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: SdkConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config("endpoint is required".to_string()));
        }
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("app_name is required".to_string()));
        }
        if self.batch_size == 0 || self.batch_size > limits::MAX_BATCH_EVENTS {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {}",
                limits::MAX_BATCH_EVENTS
            )));
        }
        if self.queue_bound < self.batch_size {
            return Err(Error::Config(
                "queue_bound must be at least batch_size".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Session inactivity threshold as a duration
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Scheduled flush interval as a duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn default_queue_bound() -> usize {
    500
}

fn default_batch_size() -> usize {
    20
}

fn default_flush_interval() -> u64 {
    30
}

fn default_session_timeout() -> u64 {
    30 * 60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> usize {
    5
}
