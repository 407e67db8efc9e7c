//! # Oilstab Engine
//!
//! Reference implementation of [`oilstab_core::ProcessEngine`]: a
//! sequential-modular flowsheet runner over an 18-component well fluid,
//! with a convergence-pressure K-value flash.
//!
//! It is a screening model. Anything that implements the engine trait can
//! replace it through an [`oilstab_core::EngineFactory`].

pub mod components;
pub mod engine;
pub mod thermo;

pub use engine::ReferenceEngine;

use oilstab_core::{EngineError, ProcessEngine};

/// Fresh, cleared reference engine. Usable directly as an `EngineFactory`.
pub fn create_engine() -> Result<Box<dyn ProcessEngine>, EngineError> {
    Ok(Box::new(ReferenceEngine::new()))
}
