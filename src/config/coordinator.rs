//! Coordinator configuration.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of the environment variables read by [`CoordinatorConfig::from_env`].
pub const ENV_PREFIX: &str = "COORDINATOR_";

/// Coordinator configuration. Supplied by the host; the core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Soft ceiling on concurrent holds per resource. Exceeding it only logs.
    pub max_concurrent_operations_per_resource: usize,
    /// Age after which an active operation is reaped.
    pub operation_timeout_seconds: u64,
    /// Cadence of the host's own health checks. Not used by the core.
    pub health_check_interval_seconds: u64,
    /// Maximum number of queued operations.
    pub queue_max_size: usize,
    /// Restart resources in `error` state from the background reaper.
    pub enable_auto_recovery: bool,
    /// Interval between background reaper sweeps.
    pub reaper_interval_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations_per_resource: 3,
            operation_timeout_seconds: 300,
            health_check_interval_seconds: 30,
            queue_max_size: 100,
            enable_auto_recovery: false,
            reaper_interval_seconds: 30,
        }
    }
}

impl CoordinatorConfig {
    /// Default operation timeout as a [`Duration`].
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    /// Reaper interval as a [`Duration`].
    pub const fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_operations_per_resource == 0 {
            return Err("max_concurrent_operations_per_resource must be greater than 0".into());
        }
        if self.operation_timeout_seconds == 0 {
            return Err("operation_timeout_seconds must be greater than 0".into());
        }
        if self.queue_max_size == 0 {
            return Err("queue_max_size must be greater than 0".into());
        }
        if self.reaper_interval_seconds == 0 {
            return Err("reaper_interval_seconds must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `COORDINATOR_*` environment variables, after
    /// reading a `.env` file if one exists. Unset variables keep defaults.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CoordinatorConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("MAX_CONCURRENT_OPERATIONS_PER_RESOURCE") {
            cfg.max_concurrent_operations_per_resource = v
                .parse()
                .context("COORDINATOR_MAX_CONCURRENT_OPERATIONS_PER_RESOURCE")?;
        }
        if let Some(v) = var("OPERATION_TIMEOUT_SECONDS") {
            cfg.operation_timeout_seconds =
                v.parse().context("COORDINATOR_OPERATION_TIMEOUT_SECONDS")?;
        }
        if let Some(v) = var("HEALTH_CHECK_INTERVAL_SECONDS") {
            cfg.health_check_interval_seconds =
                v.parse().context("COORDINATOR_HEALTH_CHECK_INTERVAL_SECONDS")?;
        }
        if let Some(v) = var("QUEUE_MAX_SIZE") {
            cfg.queue_max_size = v.parse().context("COORDINATOR_QUEUE_MAX_SIZE")?;
        }
        if let Some(v) = var("ENABLE_AUTO_RECOVERY") {
            cfg.enable_auto_recovery = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("REAPER_INTERVAL_SECONDS") {
            cfg.reaper_interval_seconds = v.parse().context("COORDINATOR_REAPER_INTERVAL_SECONDS")?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.operation_timeout_seconds, 300);
        assert_eq!(cfg.health_check_interval_seconds, 30);
        assert_eq!(cfg.queue_max_size, 100);
        assert!(!cfg.enable_auto_recovery);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("COORDINATOR_OPERATION_TIMEOUT_SECONDS", "1"),
            ("COORDINATOR_QUEUE_MAX_SIZE", "7"),
            ("COORDINATOR_ENABLE_AUTO_RECOVERY", "TRUE"),
        ]
        .into_iter()
        .collect();
        let cfg = CoordinatorConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.operation_timeout_seconds, 1);
        assert_eq!(cfg.queue_max_size, 7);
        assert!(cfg.enable_auto_recovery);
        assert_eq!(cfg.reaper_interval_seconds, 30);
    }

    #[test]
    fn lookup_rejects_garbage() {
        let err = CoordinatorConfig::from_lookup(|k| {
            (k == "COORDINATOR_QUEUE_MAX_SIZE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("COORDINATOR_QUEUE_MAX_SIZE"));
    }

    #[test]
    fn lookup_runs_validation() {
        assert!(CoordinatorConfig::from_lookup(|k| {
            (k == "COORDINATOR_QUEUE_MAX_SIZE").then(|| "0".to_string())
        })
        .is_err());
    }
}
