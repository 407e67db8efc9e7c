//! # Oilstab Session
//!
//! The engine context is process-wide mutable state and not reentrant.
//! [`SessionManager`] owns it, admits one build-and-solve cycle at a time
//! in arrival order, bounds every wait, and guarantees the context is
//! cleared before each build and after every outcome.

pub mod manager;
pub mod state;
pub mod timeline;

pub use manager::{Liveness, SessionManager};
pub use state::{SessionState, StateCell};
pub use timeline::{SolveRecord, SolveTimeline};
