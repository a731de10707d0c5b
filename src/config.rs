//! Runtime configuration
//!
//! Defaults come from `constants`. `from_env` lets deployments pick the
//! environment, refresh period, dev-server origin and cache directory without
//! a config file.

use crate::{
    constants::{
        ATTEMPT_TIMEOUT_SECS, CACHE_DIR_NAME, CYCLE_DEADLINE_SECS, DEV_ORIGIN, ENV_VAR_CACHE_DIR,
        ENV_VAR_DEV_ORIGIN, ENV_VAR_REFRESH_MS, MIN_REFRESH_INTERVAL_MS, REFRESH_INTERVAL_MS,
        REQUEST_TIMEOUT_SECS, USER_AGENT,
    },
    endpoint::Environment,
};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the client and the polling controller
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub environment: Environment,
    pub refresh_interval: Duration,
    /// reqwest client-level timeout
    pub request_timeout: Duration,
    /// Budget for one direct or relayed attempt
    pub attempt_timeout: Duration,
    /// Budget for a whole direct-then-relay sequence
    pub cycle_deadline: Duration,
    /// Directory holding the snapshot and preferences files
    pub cache_dir: PathBuf,
    /// Origin the development paths are resolved against
    pub dev_origin: String,
    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            refresh_interval: Duration::from_millis(REFRESH_INTERVAL_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            attempt_timeout: Duration::from_secs(ATTEMPT_TIMEOUT_SECS),
            cycle_deadline: Duration::from_secs(CYCLE_DEADLINE_SECS),
            cache_dir: std::env::temp_dir().join(CACHE_DIR_NAME),
            dev_origin: DEV_ORIGIN.to_string(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `COINWATCH_ENV`, `COINWATCH_REFRESH_MS`,
    /// `COINWATCH_CACHE_DIR` and `COINWATCH_DEV_ORIGIN`
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self {
            environment: Environment::from_env(),
            ..Self::default()
        };

        if let Ok(raw) = std::env::var(ENV_VAR_REFRESH_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => {
                    config.refresh_interval = clamp_refresh_interval(Duration::from_millis(ms))
                }
                _ => tracing::warn!(value = %raw, "Ignoring invalid {}", ENV_VAR_REFRESH_MS),
            }
        }

        if let Ok(dir) = std::env::var(ENV_VAR_CACHE_DIR) {
            if !dir.trim().is_empty() {
                config.cache_dir = PathBuf::from(dir);
            }
        }

        if let Ok(origin) = std::env::var(ENV_VAR_DEV_ORIGIN) {
            if !origin.trim().is_empty() {
                config.dev_origin = origin.trim().to_string();
            }
        }

        config
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the polling period, raised to `MIN_REFRESH_INTERVAL_MS` if shorter
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = clamp_refresh_interval(interval);
        self
    }

    pub fn with_dev_origin(mut self, origin: impl Into<String>) -> Self {
        self.dev_origin = origin.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_cycle_deadline(mut self, deadline: Duration) -> Self {
        self.cycle_deadline = deadline;
        self
    }
}

/// Raises `interval` to the shortest period the timer accepts
pub fn clamp_refresh_interval(interval: Duration) -> Duration {
    let min = Duration::from_millis(MIN_REFRESH_INTERVAL_MS);
    if interval < min {
        tracing::warn!(
            requested_ms = interval.as_millis() as u64,
            min_ms = MIN_REFRESH_INTERVAL_MS,
            "Refresh interval too short, using minimum"
        );
        min
    } else {
        interval
    }
}
