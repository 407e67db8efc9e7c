//! # Oilstab Core
//!
//! Domain types, traits, and error definitions for the oil stabilization
//! simulation tool. This crate has **no async runtime dependency**. It defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The seams of the system are traits defined here:
//! - [`ProcessEngine`] is the black-box simulation engine. The session
//!   manager owns one behind a single acquisition token.
//! - [`Tool`] is the agent-facing operation surface.
//!
//! Implementations live in their respective crates, which keeps the
//! engine swappable and lets tests drive the orchestration with mocks.

pub mod engine;
pub mod error;
pub mod simulation;
pub mod tool;
pub mod unit;

// Re-export key types at crate root for ergonomics
pub use engine::{EngineFactory, ProcessEngine, StreamSnapshot};
pub use error::{
    BuildError, ConvergenceError, EngineError, Result, SessionError, SimulationError,
    TimeoutPhase, ToolError, ValidationError,
};
pub use simulation::{ConvergenceStatus, SimulationRequest, SimulationResult};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
pub use unit::UnitOperation;
