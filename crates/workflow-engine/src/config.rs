//! Orchestrator configuration: `Default` plus env-var overrides, with
//! out-of-range values rejected rather than silently clamped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Keys recognized in the `server_settings` table (spec.md's singleton-row
/// retention/concurrency/timeout override record), applied on top of
/// whatever `from_env` produced.
pub mod setting_keys {
    pub const CONCURRENCY_CAP: &str = "concurrency_cap";
    pub const DRIVER_TIMEOUT_SECS: &str = "driver_timeout_secs";
    pub const LOG_RETENTION_DAYS: &str = "log_retention_days";
    pub const LOG_RETENTION_MAX_EVENTS: &str = "log_retention_max_events";
}

/// Env var names, kept in one place so `from_env` and its docs can't drift.
mod env_keys {
    pub const CONCURRENCY_CAP: &str = "WORKFLOW_CONCURRENCY_CAP";
    pub const DRIVER_TIMEOUT_SECS: &str = "WORKFLOW_DRIVER_TIMEOUT_SECS";
    pub const EVENT_BUS_CAPACITY: &str = "WORKFLOW_EVENT_BUS_CAPACITY";
    pub const WORKTREE_BASE_DIR: &str = "WORKFLOW_WORKTREE_BASE_DIR";
    pub const PLAN_PATH_PATTERN: &str = "WORKFLOW_PLAN_PATH_PATTERN";
    pub const LOG_RETENTION_DAYS: &str = "WORKFLOW_LOG_RETENTION_DAYS";
    pub const LOG_RETENTION_MAX_EVENTS: &str = "WORKFLOW_LOG_RETENTION_MAX_EVENTS";
    pub const DATABASE_URL: &str = "WORKFLOW_DATABASE_URL";
}

const MIN_CONCURRENCY_CAP: usize = 1;
const MAX_CONCURRENCY_CAP: usize = 64;
const MIN_DRIVER_TIMEOUT_SECS: u64 = 5;
const MAX_DRIVER_TIMEOUT_SECS: u64 = 3600;

/// Tunables for one orchestrator instance (spec §4.G / §9 retention
/// decision).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of workflows the orchestrator will run concurrently
    /// (spec §4.G admission control).
    pub concurrency_cap: usize,
    /// Upper bound on a single driver call before it's treated as hung.
    pub driver_timeout: Duration,
    /// Bounded channel capacity for the event bus (spec §5 backpressure).
    pub event_bus_capacity: usize,
    /// Parent directory under which per-workflow git worktrees are created
    /// (spec §4.H).
    pub worktree_base_dir: PathBuf,
    /// `strftime`-style pattern used to name generated plan files (spec §8
    /// Scenario 1, e.g. `docs/plans/%Y-%m-%d-<issue-id>.md`).
    pub plan_path_pattern: String,
    /// Retain the workflow log for at most this many days...
    pub log_retention_days: i64,
    /// ...or this many events per workflow, whichever is smaller (spec §9
    /// Open Question decision).
    pub log_retention_max_events: i64,
    /// `sqlite://...` or `postgres://...` connection string (spec §4.C).
    pub database_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: 4,
            driver_timeout: Duration::from_secs(600),
            event_bus_capacity: coordination::events::DEFAULT_BUS_CAPACITY,
            worktree_base_dir: PathBuf::from("/tmp/workflow-engine-wt"),
            plan_path_pattern: "docs/plans/%Y-%m-%d-{issue_id}.md".to_string(),
            log_retention_days: 30,
            log_retention_max_events: 10_000,
            database_url: "sqlite://workflow-engine.db".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Build a config from `Default`, overridden by any `WORKFLOW_*` env
    /// vars present, rejecting out-of-range values rather than silently
    /// clamping them.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(env_keys::CONCURRENCY_CAP) {
            let value: usize = raw
                .parse()
                .with_context(|| format!("{} must be an integer", env_keys::CONCURRENCY_CAP))?;
            if !(MIN_CONCURRENCY_CAP..=MAX_CONCURRENCY_CAP).contains(&value) {
                bail!(
                    "{} must be between {MIN_CONCURRENCY_CAP} and {MAX_CONCURRENCY_CAP}, got {value}",
                    env_keys::CONCURRENCY_CAP
                );
            }
            config.concurrency_cap = value;
        }

        if let Ok(raw) = std::env::var(env_keys::DRIVER_TIMEOUT_SECS) {
            let value: u64 = raw
                .parse()
                .with_context(|| format!("{} must be an integer", env_keys::DRIVER_TIMEOUT_SECS))?;
            if !(MIN_DRIVER_TIMEOUT_SECS..=MAX_DRIVER_TIMEOUT_SECS).contains(&value) {
                bail!(
                    "{} must be between {MIN_DRIVER_TIMEOUT_SECS} and {MAX_DRIVER_TIMEOUT_SECS} seconds, got {value}",
                    env_keys::DRIVER_TIMEOUT_SECS
                );
            }
            config.driver_timeout = Duration::from_secs(value);
        }

        if let Ok(raw) = std::env::var(env_keys::EVENT_BUS_CAPACITY) {
            config.event_bus_capacity = raw
                .parse()
                .with_context(|| format!("{} must be an integer", env_keys::EVENT_BUS_CAPACITY))?;
        }

        if let Ok(raw) = std::env::var(env_keys::WORKTREE_BASE_DIR) {
            config.worktree_base_dir = PathBuf::from(raw);
        }

        if let Ok(raw) = std::env::var(env_keys::PLAN_PATH_PATTERN) {
            config.plan_path_pattern = raw;
        }

        if let Ok(raw) = std::env::var(env_keys::LOG_RETENTION_DAYS) {
            config.log_retention_days = raw
                .parse()
                .with_context(|| format!("{} must be an integer", env_keys::LOG_RETENTION_DAYS))?;
        }

        if let Ok(raw) = std::env::var(env_keys::LOG_RETENTION_MAX_EVENTS) {
            config.log_retention_max_events = raw
                .parse()
                .with_context(|| format!("{} must be an integer", env_keys::LOG_RETENTION_MAX_EVENTS))?;
        }

        if let Ok(raw) = std::env::var(env_keys::DATABASE_URL) {
            config.database_url = raw;
        }

        Ok(config)
    }

    /// Apply `server_settings` rows on top of the env-derived config
    /// (spec.md's `server_settings` singleton: retention knobs, concurrency
    /// cap, timeouts). Unrecognized keys and unparseable values are ignored
    /// rather than rejected, since these come from an operator-editable
    /// table rather than a deploy-time env var.
    pub fn apply_overrides(&mut self, settings: &HashMap<String, String>) {
        if let Some(value) = settings.get(setting_keys::CONCURRENCY_CAP).and_then(|v| v.parse().ok()) {
            self.concurrency_cap = value;
        }
        if let Some(value) = settings
            .get(setting_keys::DRIVER_TIMEOUT_SECS)
            .and_then(|v| v.parse().ok())
        {
            self.driver_timeout = Duration::from_secs(value);
        }
        if let Some(value) = settings.get(setting_keys::LOG_RETENTION_DAYS).and_then(|v| v.parse().ok()) {
            self.log_retention_days = value;
        }
        if let Some(value) = settings
            .get(setting_keys::LOG_RETENTION_MAX_EVENTS)
            .and_then(|v| v.parse().ok())
        {
            self.log_retention_max_events = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let config = OrchestratorConfig::default();
        assert!(config.concurrency_cap >= MIN_CONCURRENCY_CAP);
        assert!(config.driver_timeout.as_secs() >= MIN_DRIVER_TIMEOUT_SECS);
    }

    #[test]
    fn concurrency_cap_out_of_range_env_var_is_rejected() {
        std::env::set_var(env_keys::CONCURRENCY_CAP, "999");
        let result = OrchestratorConfig::from_env();
        std::env::remove_var(env_keys::CONCURRENCY_CAP);
        assert!(result.is_err());
    }

    #[test]
    fn valid_concurrency_cap_env_var_is_applied() {
        std::env::set_var(env_keys::CONCURRENCY_CAP, "8");
        let config = OrchestratorConfig::from_env().unwrap();
        std::env::remove_var(env_keys::CONCURRENCY_CAP);
        assert_eq!(config.concurrency_cap, 8);
    }

    #[test]
    fn server_setting_overrides_concurrency_cap() {
        let mut config = OrchestratorConfig::default();
        let mut settings = HashMap::new();
        settings.insert(setting_keys::CONCURRENCY_CAP.to_string(), "12".to_string());
        config.apply_overrides(&settings);
        assert_eq!(config.concurrency_cap, 12);
    }

    #[test]
    fn unrecognized_server_setting_is_ignored() {
        let mut config = OrchestratorConfig::default();
        let mut settings = HashMap::new();
        settings.insert("not_a_real_setting".to_string(), "whatever".to_string());
        config.apply_overrides(&settings);
        assert_eq!(config.concurrency_cap, OrchestratorConfig::default().concurrency_cap);
    }
}
