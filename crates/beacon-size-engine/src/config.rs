//! # Engine Configuration
//!
//! Configuration for the fetch layer, breaker and scheduler.

use std::env;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::application::DEFAULT_FAILURE_THRESHOLD;
use crate::domain::{ConfigError, MAX_SLOT_SPAN, SECONDS_PER_SLOT};

/// Default upstream API location.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Per-operation upstream timeouts, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTimeouts {
    /// Latest-block lookups.
    pub latest_secs: u64,
    /// Single block, blob or fee lookups.
    pub single_secs: u64,
    /// Range lookups.
    pub range_secs: u64,
}

impl FetchTimeouts {
    pub fn latest(&self) -> Duration {
        Duration::from_secs(self.latest_secs)
    }

    pub fn single(&self) -> Duration {
        Duration::from_secs(self.single_secs)
    }

    pub fn range(&self) -> Duration {
        Duration::from_secs(self.range_secs)
    }
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            latest_secs: 5,
            single_secs: 10,
            range_secs: 15,
        }
    }
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upstream size API base URL.
    pub api_base_url: String,

    /// Serve synthetic data without ever calling upstream.
    pub force_synthetic: bool,

    /// Consecutive failures that open the circuit breaker.
    pub failure_threshold: u64,

    /// Polling interval in seconds (one slot).
    pub poll_interval_secs: u64,

    /// Largest accepted slot window.
    pub max_slot_span: u64,

    /// Live blocks kept in the slot-keyed cache.
    pub block_cache_size: usize,

    pub timeouts: FetchTimeouts,

    /// Seed for synthetic fallback data.
    pub synthetic_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            force_synthetic: false,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            poll_interval_secs: SECONDS_PER_SLOT,
            max_slot_span: MAX_SLOT_SPAN,
            block_cache_size: 100,
            timeouts: FetchTimeouts::default(),
            synthetic_seed: 0x0b5e_55ed,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BEACON_SIZE_API_URL`: upstream base URL (default: http://localhost:5000/api)
    /// - `BEACON_SIZE_MOCK`: force synthetic data (default: false)
    /// - `BEACON_SIZE_FAILURE_THRESHOLD`: breaker threshold (default: 3)
    /// - `BEACON_SIZE_POLL_SECS`: polling interval (default: 12)
    /// - `BEACON_SIZE_SEED`: synthetic data seed
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_base_url: env::var("BEACON_SIZE_API_URL").unwrap_or(defaults.api_base_url),

            force_synthetic: env::var("BEACON_SIZE_MOCK")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),

            failure_threshold: env::var("BEACON_SIZE_FAILURE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_threshold),

            poll_interval_secs: env::var("BEACON_SIZE_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_interval_secs),

            synthetic_seed: env::var("BEACON_SIZE_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.synthetic_seed),

            ..defaults
        }
    }

    /// Create a config for testing (short timeouts, small cache).
    pub fn for_testing() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:9/api".to_string(),
            block_cache_size: 8,
            timeouts: FetchTimeouts {
                latest_secs: 1,
                single_secs: 1,
                range_secs: 2,
            },
            synthetic_seed: 7,
            ..Self::default()
        }
    }

    /// Turn on synthetic mode when the page URL asks for it (`?mock=true`).
    pub fn with_launch_url(mut self, launch_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(launch_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: launch_url.to_string(),
            reason: e.to_string(),
        })?;
        if url
            .query_pairs()
            .any(|(key, value)| key == "mock" && value == "true")
        {
            self.force_synthetic = true;
        }
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trimmed = self.api_base_url.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        let url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.api_base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.api_base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let non_zero = [
            ("failure_threshold", self.failure_threshold),
            ("poll_interval_secs", self.poll_interval_secs),
            ("max_slot_span", self.max_slot_span),
            ("block_cache_size", self.block_cache_size as u64),
            ("timeouts.latest_secs", self.timeouts.latest_secs),
            ("timeouts.single_secs", self.timeouts.single_secs),
            ("timeouts.range_secs", self.timeouts.range_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }
}
