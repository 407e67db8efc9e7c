//! Configuration loading and validation for the simulation tool.
//!
//! Loads configuration from `~/.oilstab/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.oilstab/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Session ownership, queueing and timeouts
    #[serde(default)]
    pub session: SessionConfig,

    /// Recycle loop convergence
    #[serde(default)]
    pub solver: SolverConfig,

    /// Engine-level constants
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Callers allowed to wait for the session before new ones are rejected.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Bound on one build-and-solve cycle.
    #[serde(default = "default_solve_timeout_ms")]
    pub solve_timeout_ms: u64,

    /// Hint returned with busy rejections.
    #[serde(default = "default_retry_after_ms")]
    pub retry_after_ms: u64,
}

fn default_max_queue_depth() -> usize {
    8
}
fn default_acquire_timeout_ms() -> u64 {
    60_000
}
fn default_solve_timeout_ms() -> u64 {
    50_000
}
fn default_retry_after_ms() -> u64 {
    2_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: default_max_queue_depth(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            solve_timeout_ms: default_solve_timeout_ms(),
            retry_after_ms: default_retry_after_ms(),
        }
    }
}

impl SessionConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn solve_timeout(&self) -> Duration {
        Duration::from_millis(self.solve_timeout_ms)
    }
}

/// How the recycle guess is updated between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceleration {
    /// Bounded Wegstein acceleration
    #[default]
    Wegstein,
    /// Plain successive substitution
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Relative change in recovered-liquid flow below which the loop is converged.
    #[serde(default = "default_recycle_tolerance")]
    pub recycle_tolerance: f64,

    #[serde(default = "default_max_recycle_iterations")]
    pub max_recycle_iterations: u32,

    #[serde(default)]
    pub acceleration: Acceleration,
}

fn default_recycle_tolerance() -> f64 {
    1e-4
}
fn default_max_recycle_iterations() -> u32 {
    50
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            recycle_tolerance: default_recycle_tolerance(),
            max_recycle_iterations: default_max_recycle_iterations(),
            acceleration: Acceleration::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Applied to every compressor in the topology.
    #[serde(default = "default_isentropic_efficiency")]
    pub isentropic_efficiency: f64,

    /// Temperature at which the oil TVP is reported.
    #[serde(default = "default_tvp_reference_temperature")]
    pub tvp_reference_temperature_c: f64,
}

fn default_isentropic_efficiency() -> f64 {
    0.75
}
fn default_tvp_reference_temperature() -> f64 {
    20.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            isentropic_efficiency: default_isentropic_efficiency(),
            tvp_reference_temperature_c: default_tvp_reference_temperature(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `OILSTAB_*` overrides from a variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OILSTAB_MAX_QUEUE_DEPTH") {
            self.session.max_queue_depth = parse_env("OILSTAB_MAX_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = lookup("OILSTAB_ACQUIRE_TIMEOUT_MS") {
            self.session.acquire_timeout_ms = parse_env("OILSTAB_ACQUIRE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("OILSTAB_SOLVE_TIMEOUT_MS") {
            self.session.solve_timeout_ms = parse_env("OILSTAB_SOLVE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("OILSTAB_RECYCLE_TOLERANCE") {
            self.solver.recycle_tolerance = parse_env("OILSTAB_RECYCLE_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("OILSTAB_MAX_RECYCLE_ITERATIONS") {
            self.solver.max_recycle_iterations = parse_env("OILSTAB_MAX_RECYCLE_ITERATIONS", &v)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".oilstab")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.acquire_timeout_ms == 0 || self.session.solve_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "session timeouts must be greater than zero".into(),
            ));
        }

        let tol = self.solver.recycle_tolerance;
        if !tol.is_finite() || tol <= 0.0 {
            return Err(ConfigError::ValidationError(
                "recycle_tolerance must be a positive number".into(),
            ));
        }

        if self.solver.max_recycle_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_recycle_iterations must be at least 1".into(),
            ));
        }

        let eta = self.engine.isentropic_efficiency;
        if !(eta > 0.0 && eta <= 1.0) {
            return Err(ConfigError::ValidationError(
                "isentropic_efficiency must be in (0, 1]".into(),
            ));
        }

        if !self.engine.tvp_reference_temperature_c.is_finite() {
            return Err(ConfigError::ValidationError(
                "tvp_reference_temperature_c must be a finite number".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{value}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
