//! ProcessEngine trait — the abstraction over the simulation engine.
//!
//! The engine holds one mutable process context: units are added to it one
//! at a time, a pass executes every unit in insertion order, and streams
//! can be read back afterwards. It is not reentrant. The session manager
//! is the only owner and serializes every use.

use crate::error::EngineError;
use crate::unit::UnitOperation;
use serde::{Deserialize, Serialize};

/// Post-pass state of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub name: String,
    pub pressure_bara: f64,
    pub temperature_c: f64,
    pub molar_flow_kmol_per_hr: f64,
    pub mass_flow_kg_per_hr: f64,
    /// kmol/hr per component, in the engine's component order.
    pub component_flows: Vec<f64>,
}

/// The engine's process context.
///
/// Lifecycle: `clear` → `add_unit`* → (`run_pass`, `set_stream_flows`)* →
/// reads → `clear`. A recycle unit's inlet may be added after the recycle
/// itself; every other inlet must already exist when its consumer is added.
pub trait ProcessEngine: Send {
    /// Drop every unit and stream.
    fn clear(&mut self);

    /// Whether the context holds no units.
    fn is_clear(&self) -> bool;

    /// Install one unit into the context.
    fn add_unit(&mut self, unit: &UnitOperation) -> Result<(), EngineError>;

    /// Execute every unit once, in insertion order.
    fn run_pass(&mut self) -> Result<(), EngineError>;

    fn stream(&self, name: &str) -> Result<StreamSnapshot, EngineError>;

    /// Overwrite a stream's component flows. Used to update tear streams.
    fn set_stream_flows(&mut self, name: &str, component_flows: &[f64]) -> Result<(), EngineError>;

    /// Shaft power of a compressor after the last pass, kW.
    fn compressor_power_kw(&self, unit: &str) -> Result<f64, EngineError>;

    /// Bubble-point pressure of a stream at the given temperature.
    fn true_vapor_pressure_bara(&self, stream: &str, temperature_c: f64)
    -> Result<f64, EngineError>;

    /// Maximum pressure on the stream's phase envelope.
    fn cricondenbar_bara(&self, stream: &str) -> Result<f64, EngineError>;
}

/// Creates fresh engine contexts.
///
/// The session manager seeds its slot from a factory, and re-seeds it
/// when a timed-out worker walks away with the previous instance.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ProcessEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn ProcessEngine>, EngineError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn ProcessEngine>, EngineError> {
        self()
    }
}
