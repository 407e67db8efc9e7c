//! Request and result types for the oil stabilization scenario.

use serde::{Deserialize, Serialize};

/// Parameters of one simulation run.
///
/// Units follow the field suffixes: pressures in bara, temperatures in °C,
/// well flow in MSm3/day. The array fields have a fixed order, see the
/// field docs. Use the validator in `oilstab-process` before handing a
/// request to the engine; this type carries no guarantees by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub well_pressure_bara: f64,
    pub well_temperature_c: f64,
    /// Well feed flow rate, MSm3/day.
    pub well_flow_rate: f64,
    /// First, second, third stage separator pressures.
    pub separator_pressures: [f64; 3],
    /// Oil heater 1→2, oil heater 2→3, recompression suction cooler,
    /// recompression intercooler, dew-point cooler.
    pub heater_cooler_temperatures: [f64; 5],
    /// Export compressor stage 1 and stage 2 discharge.
    pub export_compressor_discharge_pressures: [f64; 2],
    /// Fraction of recovered LP liquid sent back to the third stage.
    pub reflux_ratio: f64,

    /// Topside arrival pressure, upstream of the first-stage choke.
    #[serde(default = "default_topside_pressure")]
    pub topside_pressure_bara: f64,

    #[serde(default = "default_topside_temperature")]
    pub topside_temperature_c: f64,

    /// Export interstage cooler and export aftercooler.
    #[serde(default = "default_export_cooler_temperatures")]
    pub export_cooler_temperatures: [f64; 2],
}

pub fn default_topside_pressure() -> f64 {
    90.0
}
pub fn default_topside_temperature() -> f64 {
    5.0
}
pub fn default_export_cooler_temperatures() -> [f64; 2] {
    [25.3, 24.5]
}

impl SimulationRequest {
    /// The nominal operating point of the facility.
    pub fn nominal() -> Self {
        Self {
            well_pressure_bara: 180.0,
            well_temperature_c: 100.0,
            well_flow_rate: 10.0,
            separator_pressures: [75.0, 8.6, 1.9],
            heater_cooler_temperatures: [75.9, 75.9, 25.3, 24.5, 25.0],
            export_compressor_discharge_pressures: [140.0, 200.0],
            reflux_ratio: 1.0,
            topside_pressure_bara: default_topside_pressure(),
            topside_temperature_c: default_topside_temperature(),
            export_cooler_temperatures: default_export_cooler_temperatures(),
        }
    }

    /// Render as a tool-call argument object.
    pub fn to_arguments(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Outcome tag reported with every tool response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Success,
    ValidationError,
    BuildError,
    NonConvergent,
    Timeout,
    Busy,
}

impl ConvergenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvergenceStatus::Success => "success",
            ConvergenceStatus::ValidationError => "validation_error",
            ConvergenceStatus::BuildError => "build_error",
            ConvergenceStatus::NonConvergent => "non_convergent",
            ConvergenceStatus::Timeout => "timeout",
            ConvergenceStatus::Busy => "busy",
        }
    }
}

impl std::fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics of a converged run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// True vapor pressure of the stabilized oil at the reference temperature.
    pub tvp_bara: f64,
    /// Highest pressure on the export gas phase envelope.
    #[serde(alias = "cricondenbar_c")]
    pub cricondenbar_bara: f64,
    /// Recompression stage 1, recompression stage 2, export stage 1, export stage 2.
    pub compressor_power_kw: Vec<f64>,
    /// kg/hr
    pub stable_oil_flow_rate: f64,
    /// kg/hr
    pub export_gas_flow_rate: f64,
    pub recycle_iterations: u32,
    pub convergence_status: ConvergenceStatus,
}

impl SimulationResult {
    pub fn total_compressor_power_kw(&self) -> f64 {
        self.compressor_power_kw.iter().sum()
    }
}
