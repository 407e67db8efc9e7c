//! Agent-facing tools for the oil stabilization simulator.
//!
//! Both tools share one [`SessionManager`]; the registry is the only thing
//! a host needs to wire up.

pub mod liveness;
pub mod simulate;

use oilstab_core::tool::ToolRegistry;
use oilstab_session::SessionManager;
use std::sync::Arc;

pub use liveness::LivenessProbeTool;
pub use simulate::{FailurePayload, SimulateOilStabilizationTool};

/// Create a registry with the simulate and liveness tools.
pub fn default_registry(manager: Arc<SessionManager>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SimulateOilStabilizationTool::new(manager.clone())));
    registry.register(Box::new(LivenessProbeTool::new(manager)));
    registry
}
