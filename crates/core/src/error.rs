//! Error types for the oil stabilization domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each stage of a simulation cycle has its own error type; the
//! top-level [`SimulationError`] maps every one of them to a stable
//! [`ConvergenceStatus`] tag for the tool boundary.

use crate::simulation::ConvergenceStatus;
use std::time::Duration;
use thiserror::Error;

/// The top-level error type for one simulation invocation.
#[derive(Debug, Error)]
pub enum SimulationError {
    // --- Input errors (no engine contact) ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Topology construction against the engine ---
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    // --- Recycle solve and extraction ---
    #[error("Convergence error: {0}")]
    Convergence(#[from] ConvergenceError),

    // --- Session ownership ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl SimulationError {
    /// The stable tag reported to the calling agent.
    pub fn status(&self) -> ConvergenceStatus {
        match self {
            SimulationError::Validation(_) => ConvergenceStatus::ValidationError,
            SimulationError::Build(_) => ConvergenceStatus::BuildError,
            SimulationError::Convergence(_) => ConvergenceStatus::NonConvergent,
            SimulationError::Session(SessionError::Busy { .. }) => ConvergenceStatus::Busy,
            SimulationError::Session(SessionError::Timeout { .. }) => ConvergenceStatus::Timeout,
            SimulationError::Session(SessionError::Unavailable(_)) => ConvergenceStatus::BuildError,
            SimulationError::Session(SessionError::WorkerFailed(_)) => {
                ConvergenceStatus::NonConvergent
            }
        }
    }

    /// Retry hint, only present for admission rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SimulationError::Session(SessionError::Busy { retry_after_ms, .. }) => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

/// Result type alias using our SimulationError.
pub type Result<T> = std::result::Result<T, SimulationError>;

// --- Stage errors ---

/// A request field failed a schema or physical constraint.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending field, as it appears in the tool schema.
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the simulation engine itself.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("invalid specification for unit '{unit}': {reason}")]
    InvalidSpecification { unit: String, reason: String },

    #[error("unit '{0}' already exists")]
    DuplicateUnit(String),

    #[error("stream '{0}' is produced twice")]
    DuplicateStream(String),

    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("calculation failed in '{unit}': {reason}")]
    Calculation { unit: String, reason: String },

    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("engine rejected unit '{unit}': {source}")]
    Engine {
        unit: String,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error(
        "recycle loop did not converge within {iterations} iterations \
         (residual {residual:.3e}, tolerance {tolerance:.1e})"
    )]
    IterationCap {
        iterations: u32,
        residual: f64,
        tolerance: f64,
    },

    #[error("engine failed during solve: {0}")]
    Engine(#[from] EngineError),

    #[error("result extraction failed: {0}")]
    Extraction(String),

    #[error("solve abandoned after {iterations} iterations")]
    Abandoned { iterations: u32 },
}

/// Which bounded wait was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Waiting for the session ownership token.
    Acquire,
    /// Waiting for the build-and-solve cycle.
    Solve,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutPhase::Acquire => write!(f, "session acquisition"),
            TimeoutPhase::Solve => write!(f, "solve"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("simulator busy: {depth} requests waiting (limit {limit}), retry after {retry_after_ms}ms")]
    Busy {
        depth: usize,
        limit: usize,
        retry_after_ms: u64,
    },

    #[error("{phase} timed out after {after_ms}ms")]
    Timeout { phase: TimeoutPhase, after_ms: u64 },

    #[error("simulation engine unavailable: {0}")]
    Unavailable(String),

    #[error("simulation worker failed: {0}")]
    WorkerFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
