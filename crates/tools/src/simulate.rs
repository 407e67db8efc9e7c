//! Simulate tool — one oil stabilization run per call.
//!
//! Arguments are validated before the session is touched. Every failure
//! comes back as an unsuccessful [`ToolResult`] whose data carries the
//! stable `convergence_status` tag, so the calling agent can branch on it
//! without parsing messages.

use async_trait::async_trait;
use oilstab_core::error::ToolError;
use oilstab_core::tool::{Tool, ToolResult};
use oilstab_core::{ConvergenceStatus, SimulationError, SimulationResult};
use oilstab_process::validate_arguments;
use oilstab_session::SessionManager;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const TOOL_NAME: &str = "simulate_oil_stabilization";

/// Error payload returned to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailurePayload {
    pub convergence_status: ConvergenceStatus,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<&SimulationError> for FailurePayload {
    fn from(err: &SimulationError) -> Self {
        Self {
            convergence_status: err.status(),
            error_message: err.to_string(),
            retry_after_ms: err.retry_after().map(|d| d.as_millis() as u64),
        }
    }
}

pub struct SimulateOilStabilizationTool {
    manager: Arc<SessionManager>,
}

impl SimulateOilStabilizationTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    async fn run(&self, arguments: &serde_json::Value) -> Result<SimulationResult, SimulationError> {
        let request = validate_arguments(arguments)?;
        self.manager.simulate(request).await
    }
}

fn success(result: &SimulationResult) -> Result<ToolResult, ToolError> {
    let data = serde_json::to_value(result).map_err(|e| ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason: e.to_string(),
    })?;
    Ok(ToolResult {
        call_id: String::new(),
        success: true,
        output: format!(
            "TVP {:.3} bara, cricondenbar {:.3} bara, total compressor power {:.0} kW, \
             stable oil {:.0} kg/hr, export gas {:.0} kg/hr ({} recycle iterations)",
            result.tvp_bara,
            result.cricondenbar_bara,
            result.total_compressor_power_kw(),
            result.stable_oil_flow_rate,
            result.export_gas_flow_rate,
            result.recycle_iterations,
        ),
        data: Some(data),
    })
}

fn failure(err: &SimulationError) -> Result<ToolResult, ToolError> {
    let payload = FailurePayload::from(err);
    let data = serde_json::to_value(&payload).map_err(|e| ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason: e.to_string(),
    })?;
    Ok(ToolResult {
        call_id: String::new(),
        success: false,
        output: format!("{}: {}", payload.convergence_status, payload.error_message),
        data: Some(data),
    })
}

#[async_trait]
impl Tool for SimulateOilStabilizationTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Simulate a three-stage oil stabilization train with gas recompression, dew-point \
         control and export compression. Returns the stabilized oil true vapor pressure \
         (TVP at 20 °C), the export gas cricondenbar as cricondenbar_bara (a pressure, \
         sometimes labelled cricondenbar_c), power of the four compressors \
         (recompression 1 and 2, export 1 and 2), stable oil and export gas mass flows. \
         Export specifications: TVP below 0.96 bara and cricondenbar below 100 bara; \
         lower total compressor power is better. Failures report convergence_status \
         (validation_error, build_error, non_convergent, timeout, busy) and an \
         error_message; busy responses include retry_after_ms."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "well_pressure_bara": {
                    "type": "number",
                    "description": "Well fluid pressure in bara (nominal 180)"
                },
                "well_temperature_c": {
                    "type": "number",
                    "description": "Well fluid temperature in °C (nominal 100)"
                },
                "well_flow_rate": {
                    "type": "number",
                    "description": "Well fluid flow rate in MSm3/day (nominal 10)"
                },
                "separator_pressures": {
                    "type": "array",
                    "items": { "type": "number" },
                    "minItems": 3,
                    "maxItems": 3,
                    "description": "First, second and third stage separator pressures in bara, strictly decreasing (nominal [75, 8.6, 1.9])"
                },
                "heater_cooler_temperatures": {
                    "type": "array",
                    "items": { "type": "number" },
                    "minItems": 5,
                    "maxItems": 5,
                    "description": "Outlet temperatures in °C: oil heater to 2nd stage, oil heater to 3rd stage, 1st recompression cooler, 2nd recompression cooler, dew-point cooler (nominal [75.9, 75.9, 25.3, 24.5, 25.0])"
                },
                "export_compressor_discharge_pressures": {
                    "type": "array",
                    "items": { "type": "number" },
                    "minItems": 2,
                    "maxItems": 2,
                    "description": "Export compressor stage 1 and stage 2 discharge pressures in bara (nominal [140, 200])"
                },
                "reflux_ratio": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Fraction of recovered LP liquid recycled to the 3rd stage separator (nominal 1.0)"
                },
                "topside_pressure_bara": {
                    "type": "number",
                    "description": "Topside arrival pressure in bara upstream of the inlet choke (default 90)"
                },
                "topside_temperature_c": {
                    "type": "number",
                    "description": "Topside arrival temperature in °C (default 5)"
                },
                "export_cooler_temperatures": {
                    "type": "array",
                    "items": { "type": "number" },
                    "minItems": 2,
                    "maxItems": 2,
                    "description": "Export interstage cooler and aftercooler outlet temperatures in °C (default [25.3, 24.5])"
                }
            },
            "required": [
                "well_pressure_bara",
                "well_temperature_c",
                "well_flow_rate",
                "separator_pressures",
                "heater_cooler_temperatures",
                "export_compressor_discharge_pressures",
                "reflux_ratio"
            ]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        match self.run(&arguments).await {
            Ok(result) => {
                info!(
                    tvp_bara = result.tvp_bara,
                    cricondenbar_bara = result.cricondenbar_bara,
                    iterations = result.recycle_iterations,
                    "Simulation succeeded"
                );
                success(&result)
            }
            Err(err) => {
                warn!(status = %err.status(), error = %err, "Simulation failed");
                failure(&err)
            }
        }
    }
}
