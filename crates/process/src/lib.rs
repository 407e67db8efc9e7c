//! # Oilstab Process
//!
//! The pure half of a simulation cycle, plus the pieces that drive an
//! engine through it:
//!
//! - [`validate`] turns raw tool arguments into a [`ValidatedRequest`].
//! - [`topology`] lays out the fixed flowsheet and binds it to an engine.
//! - [`recycle`] converges the LP liquid recycle loop.
//! - [`extract`] reads the reported metrics from a solved context.
//!
//! None of these own the engine. Serialization and clearing are the
//! session manager's job.

pub mod extract;
pub mod recycle;
pub mod topology;
pub mod validate;

pub use extract::extract;
pub use recycle::{RecycleSolver, SolveReport, WegsteinAccelerator};
pub use topology::{FeedbackEdge, ProcessTopology};
pub use validate::{ValidatedRequest, validate, validate_arguments};
