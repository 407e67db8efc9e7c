//! Parameter validation.
//!
//! Runs before any engine resource is touched. Raw tool arguments are
//! read field by field so a missing or mistyped field is reported under
//! its own name rather than as a generic deserialization failure.

use oilstab_core::simulation::{
    default_export_cooler_temperatures, default_topside_pressure, default_topside_temperature,
};
use oilstab_core::{SimulationRequest, ValidationError};
use serde_json::{Map, Value};

/// A request that passed every check in this module.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest(SimulationRequest);

impl ValidatedRequest {
    pub fn request(&self) -> &SimulationRequest {
        &self.0
    }
}

impl std::ops::Deref for ValidatedRequest {
    type Target = SimulationRequest;

    fn deref(&self) -> &SimulationRequest {
        &self.0
    }
}

const WELL_PRESSURE: (f64, f64) = (1.0, 1000.0);
const TEMPERATURE: (f64, f64) = (-50.0, 250.0);
const MAX_WELL_FLOW: f64 = 100.0;
const SEPARATOR_PRESSURE: (f64, f64) = (1.01, 200.0);
const EXPORT_PRESSURE: (f64, f64) = (1.0, 500.0);

/// Parse and validate raw tool-call arguments.
pub fn validate_arguments(arguments: &Value) -> Result<ValidatedRequest, ValidationError> {
    let object = arguments
        .as_object()
        .ok_or_else(|| ValidationError::new("arguments", "must be a JSON object"))?;

    let request = SimulationRequest {
        well_pressure_bara: number(object, "well_pressure_bara")?,
        well_temperature_c: number(object, "well_temperature_c")?,
        well_flow_rate: number(object, "well_flow_rate")?,
        separator_pressures: array(object, "separator_pressures")?,
        heater_cooler_temperatures: array(object, "heater_cooler_temperatures")?,
        export_compressor_discharge_pressures: array(
            object,
            "export_compressor_discharge_pressures",
        )?,
        reflux_ratio: number(object, "reflux_ratio")?,
        topside_pressure_bara: optional(object, "topside_pressure_bara", number)?
            .unwrap_or_else(default_topside_pressure),
        topside_temperature_c: optional(object, "topside_temperature_c", number)?
            .unwrap_or_else(default_topside_temperature),
        export_cooler_temperatures: optional(object, "export_cooler_temperatures", array::<2>)?
            .unwrap_or_else(default_export_cooler_temperatures),
    };
    validate(request)
}

fn as_number(field: &str, value: &Value) -> Result<f64, ValidationError> {
    value
        .as_f64()
        .ok_or_else(|| ValidationError::new(field, format!("must be a number, got {value}")))
}

fn number(object: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    let value = object
        .get(field)
        .ok_or_else(|| ValidationError::new(field, "is required"))?;
    as_number(field, value)
}

fn array<const N: usize>(
    object: &Map<String, Value>,
    field: &str,
) -> Result<[f64; N], ValidationError> {
    let items = object
        .get(field)
        .ok_or_else(|| ValidationError::new(field, "is required"))?
        .as_array()
        .ok_or_else(|| ValidationError::new(field, format!("must be an array of {N} numbers")))?;
    if items.len() != N {
        return Err(ValidationError::new(
            field,
            format!("must have exactly {N} entries, got {}", items.len()),
        ));
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = as_number(field, item)?;
    }
    Ok(out)
}

fn optional<T>(
    object: &Map<String, Value>,
    field: &str,
    read: impl Fn(&Map<String, Value>, &str) -> Result<T, ValidationError>,
) -> Result<Option<T>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => read(object, field).map(Some),
    }
}

fn in_range(field: &str, value: f64, (min, max): (f64, f64), unit: &str) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::new(field, "must be finite"));
    }
    if value < min || value > max {
        return Err(ValidationError::new(
            field,
            format!("{value} is outside {min}..={max} {unit}").trim_end().to_string(),
        ));
    }
    Ok(())
}

fn each_in_range(
    field: &str,
    values: &[f64],
    range: (f64, f64),
    unit: &str,
) -> Result<(), ValidationError> {
    for (i, value) in values.iter().enumerate() {
        in_range(field, *value, range, unit).map_err(|e| {
            ValidationError::new(field, format!("entry {i}: {}", e.reason))
        })?;
    }
    Ok(())
}

/// Check physical ranges and cross-field constraints.
pub fn validate(request: SimulationRequest) -> Result<ValidatedRequest, ValidationError> {
    let r = &request;

    in_range("well_pressure_bara", r.well_pressure_bara, WELL_PRESSURE, "bara")?;
    in_range("well_temperature_c", r.well_temperature_c, TEMPERATURE, "°C")?;
    if !r.well_flow_rate.is_finite() {
        return Err(ValidationError::new("well_flow_rate", "must be finite"));
    }
    if r.well_flow_rate <= 0.0 || r.well_flow_rate > MAX_WELL_FLOW {
        return Err(ValidationError::new(
            "well_flow_rate",
            format!(
                "{} MSm3/day must be positive and at most {MAX_WELL_FLOW} MSm3/day",
                r.well_flow_rate
            ),
        ));
    }

    each_in_range(
        "separator_pressures",
        &r.separator_pressures,
        SEPARATOR_PRESSURE,
        "bara",
    )?;
    if let Some(pair) = r.separator_pressures.windows(2).find(|w| w[1] >= w[0]) {
        return Err(ValidationError::new(
            "separator_pressures",
            format!(
                "must be strictly decreasing from first to third stage, got {} then {}",
                pair[0], pair[1]
            ),
        ));
    }

    each_in_range(
        "heater_cooler_temperatures",
        &r.heater_cooler_temperatures,
        TEMPERATURE,
        "°C",
    )?;

    each_in_range(
        "export_compressor_discharge_pressures",
        &r.export_compressor_discharge_pressures,
        EXPORT_PRESSURE,
        "bara",
    )?;
    let [export_1, export_2] = r.export_compressor_discharge_pressures;
    if export_1 <= r.separator_pressures[0] {
        return Err(ValidationError::new(
            "export_compressor_discharge_pressures",
            format!(
                "first stage discharge {export_1} bara must exceed the first-stage separator pressure {} bara",
                r.separator_pressures[0]
            ),
        ));
    }
    if export_2 <= export_1 {
        return Err(ValidationError::new(
            "export_compressor_discharge_pressures",
            format!("must be strictly increasing, got {export_1} then {export_2}"),
        ));
    }

    in_range("reflux_ratio", r.reflux_ratio, (0.0, 1.0), "")?;

    in_range(
        "topside_pressure_bara",
        r.topside_pressure_bara,
        (r.separator_pressures[0], r.well_pressure_bara),
        "bara",
    )
    .map_err(|e| {
        ValidationError::new(
            e.field,
            format!(
                "{}; must lie between the first-stage separator pressure and the well pressure",
                e.reason
            ),
        )
    })?;
    in_range("topside_temperature_c", r.topside_temperature_c, TEMPERATURE, "°C")?;
    each_in_range(
        "export_cooler_temperatures",
        &r.export_cooler_temperatures,
        TEMPERATURE,
        "°C",
    )?;

    Ok(ValidatedRequest(request))
}
