//! The fixed oil stabilization flowsheet.
//!
//! A topology is an ordered list of typed units with named streams as
//! edges. Order matters: the engine runs units in this order, so every
//! stream is produced before it is consumed, except for the one feedback
//! edge that closes the LP liquid recycle loop.

use crate::validate::ValidatedRequest;
use oilstab_core::{BuildError, ProcessEngine, UnitOperation};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Stream names the solver and extractor read back.
pub mod streams {
    pub const STABLE_OIL: &str = "stable oil";
    pub const EXPORT_GAS: &str = "export gas";
    /// Recomputed LP liquid, upstream side of the tear.
    pub const LP_LIQUID_RETURN: &str = "lp liquid return";
    /// Current LP liquid guess entering the third stage.
    pub const LP_RECYCLE: &str = "lp recycle";
}

/// Compressor unit names, in reporting order.
pub const COMPRESSOR_TRAIN: [&str; 4] = [
    "1st stage compressor",
    "2nd stage compressor",
    "export 1st stage",
    "export 2nd stage",
];

pub const LP_RECYCLE_UNIT: &str = "lp liquid recycle";

/// The back edge of the flowsheet: a recycle unit whose inlet is produced
/// downstream of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEdge {
    pub unit: String,
    /// Recomputed stream.
    pub inlet: String,
    /// Tear stream holding the guess.
    pub outlet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessTopology {
    units: Vec<UnitOperation>,
}

fn heater(name: &str, inlet: &str, outlet: &str, temperature_c: f64) -> UnitOperation {
    UnitOperation::Heater {
        name: name.into(),
        inlet: inlet.into(),
        outlet: outlet.into(),
        temperature_c,
        pressure_bara: None,
    }
}

fn valve(name: &str, inlet: &str, outlet: &str, pressure_bara: f64) -> UnitOperation {
    UnitOperation::Valve {
        name: name.into(),
        inlet: inlet.into(),
        outlet: outlet.into(),
        pressure_bara,
    }
}

fn separator(name: &str, inlets: &[&str], gas: &str, liquid: &str) -> UnitOperation {
    UnitOperation::Separator {
        name: name.into(),
        inlets: inlets.iter().map(|s| s.to_string()).collect(),
        gas_outlet: gas.into(),
        liquid_outlet: liquid.into(),
    }
}

fn mixer(name: &str, inlets: &[&str], outlet: &str) -> UnitOperation {
    UnitOperation::Mixer {
        name: name.into(),
        inlets: inlets.iter().map(|s| s.to_string()).collect(),
        outlet: outlet.into(),
    }
}

impl ProcessTopology {
    /// Wrap an arbitrary unit list. Use [`ProcessTopology::validate`] before binding.
    pub fn from_units(units: Vec<UnitOperation>) -> Self {
        Self { units }
    }

    /// Three-stage separation with recompression, dew-point control and
    /// export compression, plus the LP liquid recycle into the third stage.
    pub fn oil_stabilization(request: &ValidatedRequest, isentropic_efficiency: f64) -> Self {
        let [p1, p2, p3] = request.separator_pressures;
        let [oil_heater_1, oil_heater_2, suction_cooler, intercooler, dew_point_cooler] =
            request.heater_cooler_temperatures;
        let [export_1, export_2] = request.export_compressor_discharge_pressures;
        let [interstage_cooler, aftercooler] = request.export_cooler_temperatures;

        let compressor = |name: &str, inlet: &str, outlet: &str, pressure_bara: f64| {
            UnitOperation::Compressor {
                name: name.into(),
                inlet: inlet.into(),
                outlet: outlet.into(),
                pressure_bara,
                isentropic_efficiency,
            }
        };

        let units = vec![
            UnitOperation::Source {
                name: "dry well stream".into(),
                outlet: "well fluid".into(),
                pressure_bara: request.well_pressure_bara,
                temperature_c: request.well_temperature_c,
                flow_rate: request.well_flow_rate,
            },
            UnitOperation::Saturator {
                name: "water saturator".into(),
                inlet: "well fluid".into(),
                outlet: "water saturated feed".into(),
            },
            UnitOperation::Heater {
                name: "topside conditioner".into(),
                inlet: "water saturated feed".into(),
                outlet: "topside feed".into(),
                temperature_c: request.topside_temperature_c,
                pressure_bara: Some(request.topside_pressure_bara),
            },
            valve("inlet choke", "topside feed", "first stage feed", p1),
            separator(
                "1st stage separator",
                &["first stage feed"],
                "first stage gas",
                "first stage oil",
            ),
            heater(
                "oil heater second stage",
                "first stage oil",
                "heated first stage oil",
                oil_heater_1,
            ),
            valve(
                "valve oil from first stage",
                "heated first stage oil",
                "second stage feed",
                p2,
            ),
            separator(
                "2nd stage separator",
                &["second stage feed"],
                "second stage gas",
                "second stage oil",
            ),
            heater(
                "oil heater third stage",
                "second stage oil",
                "heated second stage oil",
                oil_heater_2,
            ),
            valve(
                "valve oil from second stage",
                "heated second stage oil",
                "third stage feed",
                p3,
            ),
            UnitOperation::Recycle {
                name: LP_RECYCLE_UNIT.into(),
                inlet: streams::LP_LIQUID_RETURN.into(),
                outlet: streams::LP_RECYCLE.into(),
            },
            separator(
                "3rd stage separator",
                &["third stage feed", streams::LP_RECYCLE],
                "third stage gas",
                streams::STABLE_OIL,
            ),
            heater(
                "1st stage cooler",
                "third stage gas",
                "cooled third stage gas",
                suction_cooler,
            ),
            separator(
                "1st stage scrubber",
                &["cooled third stage gas"],
                "1st stage suction gas",
                "1st stage scrubber liquid",
            ),
            compressor(
                COMPRESSOR_TRAIN[0],
                "1st stage suction gas",
                "1st stage discharge",
                p2,
            ),
            mixer(
                "second stage gas mixer",
                &["1st stage discharge", "second stage gas"],
                "second stage mixed gas",
            ),
            heater(
                "2nd stage cooler",
                "second stage mixed gas",
                "cooled second stage gas",
                intercooler,
            ),
            separator(
                "2nd stage scrubber",
                &["cooled second stage gas"],
                "2nd stage suction gas",
                "2nd stage scrubber liquid",
            ),
            compressor(
                COMPRESSOR_TRAIN[1],
                "2nd stage suction gas",
                "2nd stage discharge",
                p1,
            ),
            mixer(
                "rich gas mixer",
                &["2nd stage discharge", "first stage gas"],
                "rich gas",
            ),
            heater(
                "dew point cooler",
                "rich gas",
                "cooled rich gas",
                dew_point_cooler,
            ),
            separator(
                "dew point scrubber",
                &["cooled rich gas"],
                "dew point gas",
                "dew point liquid",
            ),
            mixer(
                "lp liquid mixer",
                &[
                    "1st stage scrubber liquid",
                    "2nd stage scrubber liquid",
                    "dew point liquid",
                ],
                "lp liquid",
            ),
            UnitOperation::Splitter {
                name: "reflux splitter".into(),
                inlet: "lp liquid".into(),
                outlet: streams::LP_LIQUID_RETURN.into(),
                remainder: "lp liquid purge".into(),
                fraction: request.reflux_ratio,
            },
            compressor(
                COMPRESSOR_TRAIN[2],
                "dew point gas",
                "export 1st stage discharge",
                export_1,
            ),
            heater(
                "export interstage cooler",
                "export 1st stage discharge",
                "export 2nd stage suction",
                interstage_cooler,
            ),
            compressor(
                COMPRESSOR_TRAIN[3],
                "export 2nd stage suction",
                "export 2nd stage discharge",
                export_2,
            ),
            heater(
                "export cooler",
                "export 2nd stage discharge",
                streams::EXPORT_GAS,
                aftercooler,
            ),
        ];
        Self { units }
    }

    pub fn units(&self) -> &[UnitOperation] {
        &self.units
    }

    /// Check the graph shape without touching an engine.
    ///
    /// Unit names are unique, every stream has exactly one producer, every
    /// consumed stream has a producer, no stream has two consumers, and
    /// there is exactly one back edge, which enters a recycle unit.
    pub fn validate(&self) -> Result<FeedbackEdge, BuildError> {
        let mut names = HashSet::new();
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (index, unit) in self.units.iter().enumerate() {
            if !names.insert(unit.name()) {
                return Err(BuildError::Topology(format!(
                    "duplicate unit name '{}'",
                    unit.name()
                )));
            }
            for outlet in unit.outlets() {
                if producers.insert(outlet, index).is_some() {
                    return Err(BuildError::Topology(format!(
                        "stream '{outlet}' has more than one producer"
                    )));
                }
            }
        }

        let mut consumed = HashSet::new();
        let mut back_edges = Vec::new();
        for (index, unit) in self.units.iter().enumerate() {
            for inlet in unit.inlets() {
                let producer = producers.get(inlet).ok_or_else(|| {
                    BuildError::Topology(format!(
                        "unit '{}' consumes stream '{inlet}' which nothing produces",
                        unit.name()
                    ))
                })?;
                if !consumed.insert(inlet) {
                    return Err(BuildError::Topology(format!(
                        "stream '{inlet}' has more than one consumer"
                    )));
                }
                if *producer >= index {
                    back_edges.push((unit, inlet));
                }
            }
        }

        match back_edges.as_slice() {
            [(UnitOperation::Recycle { name, inlet, outlet }, _)] => Ok(FeedbackEdge {
                unit: name.clone(),
                inlet: inlet.clone(),
                outlet: outlet.clone(),
            }),
            [(unit, inlet)] => Err(BuildError::Topology(format!(
                "feedback edge '{inlet}' enters '{}', which is not a recycle unit",
                unit.name()
            ))),
            [] => Err(BuildError::Topology("no feedback edge found".into())),
            many => Err(BuildError::Topology(format!(
                "expected exactly one feedback edge, found {}",
                many.len()
            ))),
        }
    }

    /// Validate, then install every unit into a cleared engine context.
    ///
    /// On failure the context is left partially built; the caller clears it.
    pub fn bind(&self, engine: &mut dyn ProcessEngine) -> Result<FeedbackEdge, BuildError> {
        let edge = self.validate()?;
        for unit in &self.units {
            engine
                .add_unit(unit)
                .map_err(|source| BuildError::Engine {
                    unit: unit.name().to_string(),
                    source,
                })?;
        }
        debug!(
            units = self.units.len(),
            recycle = %edge.unit,
            "Topology bound"
        );
        Ok(edge)
    }
}
