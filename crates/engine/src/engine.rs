//! Sequential-modular reference engine.
//!
//! Units run in insertion order. Each unit reads its inlet streams from the
//! stream table and overwrites its outlets. A recycle unit's outlet is the
//! tear stream: a pass never changes its flows, only its conditions, so the
//! caller owns the fixed-point iteration through `set_stream_flows`.

use crate::components::{
    COMPONENT_COUNT, STANDARD_MOLAR_VOLUME, WATER, mass_flow, well_fluid_fractions,
};
use crate::thermo::{self, Flows, GAS_CONSTANT, KELVIN};
use oilstab_core::{EngineError, ProcessEngine, StreamSnapshot, UnitOperation};
use std::collections::HashMap;
use tracing::{debug, trace};

const INITIAL_TEMPERATURE_C: f64 = 15.0;
const INITIAL_PRESSURE_BARA: f64 = 1.01325;
const MAX_WATER_FRACTION: f64 = 0.5;

#[derive(Debug, Clone)]
struct Stream {
    pressure_bara: f64,
    temperature_c: f64,
    flows: Flows,
}

impl Stream {
    fn empty() -> Self {
        Self {
            pressure_bara: INITIAL_PRESSURE_BARA,
            temperature_c: INITIAL_TEMPERATURE_C,
            flows: [0.0; COMPONENT_COUNT],
        }
    }

    fn total(&self) -> f64 {
        self.flows.iter().sum()
    }
}

/// Mix streams adiabatically: cp-weighted temperature, lowest live pressure.
fn mix(inlets: &[&Stream]) -> Stream {
    let mut flows = [0.0; COMPONENT_COUNT];
    for s in inlets {
        for (acc, n) in flows.iter_mut().zip(s.flows.iter()) {
            *acc += n;
        }
    }

    let live: Vec<&&Stream> = inlets.iter().filter(|s| s.total() > 0.0).collect();
    if live.is_empty() {
        let pressure_bara = inlets
            .iter()
            .map(|s| s.pressure_bara)
            .fold(f64::INFINITY, f64::min);
        return Stream {
            pressure_bara: if pressure_bara.is_finite() {
                pressure_bara
            } else {
                INITIAL_PRESSURE_BARA
            },
            temperature_c: INITIAL_TEMPERATURE_C,
            flows,
        };
    }

    let (mut heat, mut capacity) = (0.0, 0.0);
    for s in &live {
        let c = s.total() * thermo::heat_capacity(&s.flows);
        heat += c * s.temperature_c;
        capacity += c;
    }
    Stream {
        pressure_bara: live
            .iter()
            .map(|s| s.pressure_bara)
            .fold(f64::INFINITY, f64::min),
        temperature_c: heat / capacity,
        flows,
    }
}

/// The reference implementation of [`ProcessEngine`].
#[derive(Debug, Default)]
pub struct ReferenceEngine {
    units: Vec<UnitOperation>,
    streams: HashMap<String, Stream>,
    powers: HashMap<String, f64>,
    passes: u64,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes run since the last clear.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn inlet(&self, name: &str) -> Result<&Stream, EngineError> {
        self.streams
            .get(name)
            .ok_or_else(|| EngineError::UnknownStream(name.to_string()))
    }

    fn set(&mut self, name: &str, stream: Stream) {
        self.streams.insert(name.to_string(), stream);
    }

    fn check_specification(unit: &UnitOperation) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidSpecification {
            unit: unit.name().to_string(),
            reason,
        };
        let positive = |what: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(invalid(format!("{what} must be positive, got {value}")))
            }
        };
        let temperature = |value: f64| {
            if value.is_finite() && value + KELVIN > 0.0 {
                Ok(())
            } else {
                Err(invalid(format!("temperature {value} °C is not physical")))
            }
        };

        match unit {
            UnitOperation::Source {
                pressure_bara,
                temperature_c,
                flow_rate,
                ..
            } => {
                positive("pressure", *pressure_bara)?;
                temperature(*temperature_c)?;
                positive("flow rate", *flow_rate)
            }
            UnitOperation::Heater {
                temperature_c,
                pressure_bara,
                ..
            } => {
                temperature(*temperature_c)?;
                match pressure_bara {
                    Some(p) => positive("pressure", *p),
                    None => Ok(()),
                }
            }
            UnitOperation::Valve { pressure_bara, .. } => positive("pressure", *pressure_bara),
            UnitOperation::Compressor {
                pressure_bara,
                isentropic_efficiency,
                ..
            } => {
                positive("pressure", *pressure_bara)?;
                if *isentropic_efficiency > 0.0 && *isentropic_efficiency <= 1.0 {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "isentropic efficiency must be in (0, 1], got {isentropic_efficiency}"
                    )))
                }
            }
            UnitOperation::Splitter { fraction, .. } => {
                if (0.0..=1.0).contains(fraction) {
                    Ok(())
                } else {
                    Err(invalid(format!("split fraction must be in [0, 1], got {fraction}")))
                }
            }
            UnitOperation::Separator { inlets, .. } | UnitOperation::Mixer { inlets, .. } => {
                if inlets.is_empty() {
                    Err(invalid("at least one inlet is required".into()))
                } else {
                    Ok(())
                }
            }
            UnitOperation::Saturator { .. } | UnitOperation::Recycle { .. } => Ok(()),
        }
    }

    fn execute(&mut self, unit: &UnitOperation) -> Result<(), EngineError> {
        let failed = |reason: String| EngineError::Calculation {
            unit: unit.name().to_string(),
            reason,
        };

        match unit {
            UnitOperation::Source {
                outlet,
                pressure_bara,
                temperature_c,
                flow_rate,
                ..
            } => {
                let molar_flow = flow_rate * 1e6 / STANDARD_MOLAR_VOLUME / 24.0;
                let flows = well_fluid_fractions().map(|z| z * molar_flow);
                self.set(
                    outlet,
                    Stream {
                        pressure_bara: *pressure_bara,
                        temperature_c: *temperature_c,
                        flows,
                    },
                );
            }
            UnitOperation::Saturator { inlet, outlet, .. } => {
                let mut stream = self.inlet(inlet)?.clone();
                let y = (thermo::water_vapor_pressure(stream.temperature_c)
                    / stream.pressure_bara)
                    .min(MAX_WATER_FRACTION);
                let dry = stream.total() - stream.flows[WATER];
                stream.flows[WATER] = stream.flows[WATER].max(dry * y / (1.0 - y));
                self.set(outlet, stream);
            }
            UnitOperation::Heater {
                inlet,
                outlet,
                temperature_c,
                pressure_bara,
                ..
            } => {
                let mut stream = self.inlet(inlet)?.clone();
                stream.temperature_c = *temperature_c;
                if let Some(p) = pressure_bara {
                    stream.pressure_bara = *p;
                }
                self.set(outlet, stream);
            }
            UnitOperation::Valve {
                inlet,
                outlet,
                pressure_bara,
                ..
            } => {
                let mut stream = self.inlet(inlet)?.clone();
                if *pressure_bara > stream.pressure_bara + 1e-9 {
                    return Err(failed(format!(
                        "outlet pressure {pressure_bara} bara exceeds inlet pressure {} bara",
                        stream.pressure_bara
                    )));
                }
                stream.pressure_bara = *pressure_bara;
                self.set(outlet, stream);
            }
            UnitOperation::Separator {
                inlets,
                gas_outlet,
                liquid_outlet,
                ..
            } => {
                let feed = {
                    let streams = inlets
                        .iter()
                        .map(|name| self.inlet(name))
                        .collect::<Result<Vec<_>, _>>()?;
                    mix(&streams)
                };
                let split = thermo::flash(&feed.flows, feed.temperature_c, feed.pressure_bara)
                    .map_err(failed)?;
                trace!(
                    unit = unit.name(),
                    vapor_fraction = split.vapor_fraction,
                    "flash"
                );
                self.set(
                    gas_outlet,
                    Stream {
                        flows: split.vapor,
                        ..feed.clone()
                    },
                );
                self.set(
                    liquid_outlet,
                    Stream {
                        flows: split.liquid,
                        ..feed
                    },
                );
            }
            UnitOperation::Compressor {
                name,
                inlet,
                outlet,
                pressure_bara,
                isentropic_efficiency,
            } => {
                let stream = self.inlet(inlet)?.clone();
                let ratio = pressure_bara / stream.pressure_bara;
                if ratio < 1.0 {
                    return Err(failed(format!(
                        "discharge pressure {pressure_bara} bara is below suction pressure {} bara",
                        stream.pressure_bara
                    )));
                }
                let molar_flow = stream.total();
                let (temperature_rise, power_kw) = if molar_flow > 0.0 {
                    let cp = thermo::heat_capacity(&stream.flows);
                    let k = cp / (cp - GAS_CONSTANT);
                    let rise = (stream.temperature_c + KELVIN)
                        * (ratio.powf((k - 1.0) / k) - 1.0)
                        / isentropic_efficiency;
                    (rise, molar_flow / 3600.0 * cp * rise)
                } else {
                    (0.0, 0.0)
                };
                self.powers.insert(name.clone(), power_kw);
                self.set(
                    outlet,
                    Stream {
                        pressure_bara: *pressure_bara,
                        temperature_c: stream.temperature_c + temperature_rise,
                        flows: stream.flows,
                    },
                );
            }
            UnitOperation::Mixer { inlets, outlet, .. } => {
                let mixed = {
                    let streams = inlets
                        .iter()
                        .map(|name| self.inlet(name))
                        .collect::<Result<Vec<_>, _>>()?;
                    mix(&streams)
                };
                self.set(outlet, mixed);
            }
            UnitOperation::Splitter {
                inlet,
                outlet,
                remainder,
                fraction,
                ..
            } => {
                let stream = self.inlet(inlet)?.clone();
                self.set(
                    outlet,
                    Stream {
                        flows: stream.flows.map(|n| n * fraction),
                        ..stream.clone()
                    },
                );
                self.set(
                    remainder,
                    Stream {
                        flows: stream.flows.map(|n| n * (1.0 - fraction)),
                        ..stream
                    },
                );
            }
            UnitOperation::Recycle { inlet, outlet, .. } => {
                let source = self.inlet(inlet)?;
                if source.total() > 0.0 {
                    let (p, t) = (source.pressure_bara, source.temperature_c);
                    if let Some(tear) = self.streams.get_mut(outlet.as_str()) {
                        tear.pressure_bara = p;
                        tear.temperature_c = t;
                    }
                }
            }
        }
        Ok(())
    }

    fn flows_of(&self, stream: &str) -> Result<Flows, EngineError> {
        Ok(self.inlet(stream)?.flows)
    }
}

impl ProcessEngine for ReferenceEngine {
    fn clear(&mut self) {
        self.units.clear();
        self.streams.clear();
        self.powers.clear();
        self.passes = 0;
    }

    fn is_clear(&self) -> bool {
        self.units.is_empty() && self.streams.is_empty()
    }

    fn add_unit(&mut self, unit: &UnitOperation) -> Result<(), EngineError> {
        if self.units.iter().any(|u| u.name() == unit.name()) {
            return Err(EngineError::DuplicateUnit(unit.name().to_string()));
        }
        Self::check_specification(unit)?;
        if !unit.is_recycle() {
            for inlet in unit.inlets() {
                self.inlet(inlet)?;
            }
        }
        for outlet in unit.outlets() {
            if self.streams.contains_key(outlet) {
                return Err(EngineError::DuplicateStream(outlet.to_string()));
            }
        }

        for outlet in unit.outlets() {
            self.streams.insert(outlet.to_string(), Stream::empty());
        }
        debug!(unit = unit.name(), kind = unit.kind(), "Unit added");
        self.units.push(unit.clone());
        Ok(())
    }

    fn run_pass(&mut self) -> Result<(), EngineError> {
        for unit in self.units.iter().filter(|u| u.is_recycle()) {
            for inlet in unit.inlets() {
                self.inlet(inlet)?;
            }
        }

        let units = std::mem::take(&mut self.units);
        let outcome = units.iter().try_for_each(|unit| self.execute(unit));
        self.units = units;
        outcome?;

        self.passes += 1;
        trace!(pass = self.passes, units = self.units.len(), "Pass complete");
        Ok(())
    }

    fn stream(&self, name: &str) -> Result<StreamSnapshot, EngineError> {
        let stream = self.inlet(name)?;
        Ok(StreamSnapshot {
            name: name.to_string(),
            pressure_bara: stream.pressure_bara,
            temperature_c: stream.temperature_c,
            molar_flow_kmol_per_hr: stream.total(),
            mass_flow_kg_per_hr: mass_flow(&stream.flows),
            component_flows: stream.flows.to_vec(),
        })
    }

    fn set_stream_flows(&mut self, name: &str, component_flows: &[f64]) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidSpecification {
            unit: name.to_string(),
            reason,
        };
        let flows: Flows = component_flows.try_into().map_err(|_| {
            invalid(format!(
                "expected {COMPONENT_COUNT} component flows, got {}",
                component_flows.len()
            ))
        })?;
        if flows.iter().any(|n| !n.is_finite() || *n < 0.0) {
            return Err(invalid("component flows must be finite and non-negative".into()));
        }
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStream(name.to_string()))?;
        stream.flows = flows;
        Ok(())
    }

    fn compressor_power_kw(&self, unit: &str) -> Result<f64, EngineError> {
        let is_compressor = self
            .units
            .iter()
            .any(|u| u.name() == unit && matches!(u, UnitOperation::Compressor { .. }));
        if !is_compressor {
            return Err(EngineError::UnknownUnit(unit.to_string()));
        }
        self.powers
            .get(unit)
            .copied()
            .ok_or_else(|| EngineError::Calculation {
                unit: unit.to_string(),
                reason: "no pass has run".into(),
            })
    }

    fn true_vapor_pressure_bara(
        &self,
        stream: &str,
        temperature_c: f64,
    ) -> Result<f64, EngineError> {
        thermo::bubble_point_pressure(&self.flows_of(stream)?, temperature_c).map_err(|reason| {
            EngineError::Calculation {
                unit: stream.to_string(),
                reason,
            }
        })
    }

    fn cricondenbar_bara(&self, stream: &str) -> Result<f64, EngineError> {
        thermo::cricondenbar(&self.flows_of(stream)?).map_err(|reason| EngineError::Calculation {
            unit: stream.to_string(),
            reason,
        })
    }
}
