//! Unit operations — the node types of a process topology.
//!
//! Every unit names its inlet and outlet streams explicitly. Stream names
//! are the edges of the graph; a stream is produced by exactly one unit
//! and consumed by at most one.

use serde::{Deserialize, Serialize};

/// A typed unit-operation node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitOperation {
    /// Well fluid entering the plant.
    Source {
        name: String,
        outlet: String,
        pressure_bara: f64,
        temperature_c: f64,
        /// MSm3/day
        flow_rate: f64,
    },
    /// Saturates the stream with water at its own conditions.
    Saturator {
        name: String,
        inlet: String,
        outlet: String,
    },
    /// Heater or cooler. Sets outlet temperature, and pressure if given.
    Heater {
        name: String,
        inlet: String,
        outlet: String,
        temperature_c: f64,
        pressure_bara: Option<f64>,
    },
    /// Pressure let-down.
    Valve {
        name: String,
        inlet: String,
        outlet: String,
        pressure_bara: f64,
    },
    /// Two-phase flash drum. Inlets are mixed before the flash.
    Separator {
        name: String,
        inlets: Vec<String>,
        gas_outlet: String,
        liquid_outlet: String,
    },
    Compressor {
        name: String,
        inlet: String,
        outlet: String,
        pressure_bara: f64,
        isentropic_efficiency: f64,
    },
    Mixer {
        name: String,
        inlets: Vec<String>,
        outlet: String,
    },
    /// Sends `fraction` of the inlet to `outlet` and the rest to `remainder`.
    Splitter {
        name: String,
        inlet: String,
        outlet: String,
        remainder: String,
        fraction: f64,
    },
    /// Tear point of a feedback loop. The outlet holds the current guess
    /// and is only changed by the solver; the inlet is the recomputed value.
    Recycle {
        name: String,
        inlet: String,
        outlet: String,
    },
}

impl UnitOperation {
    pub fn name(&self) -> &str {
        match self {
            UnitOperation::Source { name, .. }
            | UnitOperation::Saturator { name, .. }
            | UnitOperation::Heater { name, .. }
            | UnitOperation::Valve { name, .. }
            | UnitOperation::Separator { name, .. }
            | UnitOperation::Compressor { name, .. }
            | UnitOperation::Mixer { name, .. }
            | UnitOperation::Splitter { name, .. }
            | UnitOperation::Recycle { name, .. } => name,
        }
    }

    /// Short lowercase label of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitOperation::Source { .. } => "source",
            UnitOperation::Saturator { .. } => "saturator",
            UnitOperation::Heater { .. } => "heater",
            UnitOperation::Valve { .. } => "valve",
            UnitOperation::Separator { .. } => "separator",
            UnitOperation::Compressor { .. } => "compressor",
            UnitOperation::Mixer { .. } => "mixer",
            UnitOperation::Splitter { .. } => "splitter",
            UnitOperation::Recycle { .. } => "recycle",
        }
    }

    /// Upstream stream references.
    pub fn inlets(&self) -> Vec<&str> {
        match self {
            UnitOperation::Source { .. } => vec![],
            UnitOperation::Saturator { inlet, .. }
            | UnitOperation::Heater { inlet, .. }
            | UnitOperation::Valve { inlet, .. }
            | UnitOperation::Compressor { inlet, .. }
            | UnitOperation::Splitter { inlet, .. }
            | UnitOperation::Recycle { inlet, .. } => vec![inlet.as_str()],
            UnitOperation::Separator { inlets, .. } | UnitOperation::Mixer { inlets, .. } => {
                inlets.iter().map(String::as_str).collect()
            }
        }
    }

    /// Downstream stream references.
    pub fn outlets(&self) -> Vec<&str> {
        match self {
            UnitOperation::Source { outlet, .. }
            | UnitOperation::Saturator { outlet, .. }
            | UnitOperation::Heater { outlet, .. }
            | UnitOperation::Valve { outlet, .. }
            | UnitOperation::Compressor { outlet, .. }
            | UnitOperation::Mixer { outlet, .. }
            | UnitOperation::Recycle { outlet, .. } => vec![outlet.as_str()],
            UnitOperation::Separator {
                gas_outlet,
                liquid_outlet,
                ..
            } => vec![gas_outlet.as_str(), liquid_outlet.as_str()],
            UnitOperation::Splitter {
                outlet, remainder, ..
            } => vec![outlet.as_str(), remainder.as_str()],
        }
    }

    pub fn is_recycle(&self) -> bool {
        matches!(self, UnitOperation::Recycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_edges() {
        let unit = UnitOperation::Separator {
            name: "3rd stage separator".into(),
            inlets: vec!["oil to third stage".into(), "lp recycle".into()],
            gas_outlet: "third stage gas".into(),
            liquid_outlet: "stable oil".into(),
        };
        assert_eq!(unit.inlets(), vec!["oil to third stage", "lp recycle"]);
        assert_eq!(unit.outlets(), vec!["third stage gas", "stable oil"]);
        assert_eq!(unit.kind(), "separator");
        assert!(!unit.is_recycle());
    }

    #[test]
    fn serializes_with_type_tag() {
        let unit = UnitOperation::Recycle {
            name: "lp liquid recycle".into(),
            inlet: "lp liquid".into(),
            outlet: "lp recycle".into(),
        };
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["type"], "recycle");
        assert_eq!(json["outlet"], "lp recycle");
    }
}
