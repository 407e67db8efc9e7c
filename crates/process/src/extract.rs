//! Result extraction from a solved engine context.

use crate::topology::{COMPRESSOR_TRAIN, streams};
use oilstab_core::{ConvergenceError, ConvergenceStatus, ProcessEngine, SimulationResult};

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn finite(what: &str, value: f64) -> Result<f64, ConvergenceError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConvergenceError::Extraction(format!(
            "{what} is not finite ({value})"
        )))
    }
}

/// Read the reported metrics. Only call after the recycle loop converged.
///
/// Pressures are rounded to 3 decimals, powers and flows to 2. Any
/// non-finite reading fails the whole extraction.
pub fn extract(
    engine: &dyn ProcessEngine,
    tvp_reference_temperature_c: f64,
    recycle_iterations: u32,
) -> Result<SimulationResult, ConvergenceError> {
    let stable_oil = engine.stream(streams::STABLE_OIL)?;
    let export_gas = engine.stream(streams::EXPORT_GAS)?;

    let tvp = finite(
        "stable oil TVP",
        engine.true_vapor_pressure_bara(streams::STABLE_OIL, tvp_reference_temperature_c)?,
    )?;
    let cricondenbar = finite(
        "export gas cricondenbar",
        engine.cricondenbar_bara(streams::EXPORT_GAS)?,
    )?;

    let mut compressor_power_kw = Vec::with_capacity(COMPRESSOR_TRAIN.len());
    for unit in COMPRESSOR_TRAIN {
        let power = finite(unit, engine.compressor_power_kw(unit)?)?;
        compressor_power_kw.push(round_to(power, 2));
    }

    Ok(SimulationResult {
        tvp_bara: round_to(tvp, 3),
        cricondenbar_bara: round_to(cricondenbar, 3),
        compressor_power_kw,
        stable_oil_flow_rate: round_to(
            finite("stable oil flow", stable_oil.mass_flow_kg_per_hr)?,
            2,
        ),
        export_gas_flow_rate: round_to(
            finite("export gas flow", export_gas.mass_flow_kg_per_hr)?,
            2,
        ),
        recycle_iterations,
        convergence_status: ConvergenceStatus::Success,
    })
}
