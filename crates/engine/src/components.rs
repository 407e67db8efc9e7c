//! Component table and the fixed well-fluid composition.

/// Pure-component constants used by the K-value and heat-capacity models.
#[derive(Debug, Clone, Copy)]
pub struct Component {
    pub name: &'static str,
    /// g/mol
    pub molar_mass: f64,
    /// K
    pub critical_temperature: f64,
    /// bar
    pub critical_pressure: f64,
    pub acentric_factor: f64,
    /// Ideal-gas heat capacity near ambient, J/(mol·K).
    pub heat_capacity: f64,
}

const fn pure(
    name: &'static str,
    molar_mass: f64,
    critical_temperature: f64,
    critical_pressure: f64,
    acentric_factor: f64,
    heat_capacity: f64,
) -> Component {
    Component {
        name,
        molar_mass,
        critical_temperature,
        critical_pressure,
        acentric_factor,
        heat_capacity,
    }
}

/// Pseudo-component from a TBP cut; heat capacity scales with molar mass.
const fn cut(
    name: &'static str,
    molar_mass: f64,
    critical_temperature: f64,
    critical_pressure: f64,
    acentric_factor: f64,
) -> Component {
    pure(
        name,
        molar_mass,
        critical_temperature,
        critical_pressure,
        acentric_factor,
        1.68 * molar_mass,
    )
}

pub const COMPONENT_COUNT: usize = 18;

pub const COMPONENTS: [Component; COMPONENT_COUNT] = [
    pure("nitrogen", 28.014, 126.2, 33.98, 0.037, 29.1),
    pure("CO2", 44.01, 304.1, 73.83, 0.225, 37.1),
    pure("methane", 16.043, 190.6, 45.99, 0.011, 35.7),
    pure("ethane", 30.07, 305.3, 48.72, 0.099, 52.5),
    pure("propane", 44.097, 369.8, 42.48, 0.152, 73.6),
    pure("i-butane", 58.123, 407.8, 36.40, 0.186, 96.8),
    pure("n-butane", 58.123, 425.1, 37.96, 0.200, 98.5),
    pure("i-pentane", 72.15, 460.4, 33.80, 0.229, 118.9),
    pure("n-pentane", 72.15, 469.7, 33.70, 0.252, 120.1),
    pure("water", 18.015, 647.1, 220.64, 0.344, 33.6),
    cut("C6", 84.99, 507.0, 30.1, 0.30),
    cut("C7", 97.87, 536.0, 28.0, 0.33),
    cut("C8", 111.54, 563.0, 25.5, 0.37),
    cut("C9", 126.1, 590.0, 23.0, 0.41),
    cut("C10", 140.14, 612.0, 21.5, 0.45),
    cut("C11", 175.0, 660.0, 18.0, 0.55),
    cut("C12", 280.0, 770.0, 13.0, 0.80),
    cut("C13", 560.0, 950.0, 8.0, 1.20),
];

pub const WATER: usize = 9;

/// First component counted in the C7+ fraction.
pub const C7_PLUS: usize = 11;

/// Dry well-fluid composition in table order, relative mole amounts.
/// Not normalized; see [`well_fluid_fractions`].
pub const WELL_FLUID: [f64; COMPONENT_COUNT] = [
    0.08, 3.56, 87.36, 4.02, 1.54, 0.2, 0.42, 0.15, 0.2, 0.0, 1.24, 1.34, 1.33, 1.19, 1.15,
    1.69, 1.5, 1.03,
];

/// Normalized dry well-fluid mole fractions.
pub fn well_fluid_fractions() -> [f64; COMPONENT_COUNT] {
    let total: f64 = WELL_FLUID.iter().sum();
    WELL_FLUID.map(|x| x / total)
}

/// Standard molar volume at 15 °C and 1.01325 bara, Sm3/kmol.
pub const STANDARD_MOLAR_VOLUME: f64 = 23.645;

/// Mass flow of a component-flow vector, kg/hr for kmol/hr input.
pub fn mass_flow(component_flows: &[f64]) -> f64 {
    component_flows
        .iter()
        .zip(COMPONENTS.iter())
        .map(|(n, c)| n * c.molar_mass)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_fluid_is_dry_and_normalizes() {
        let z = well_fluid_fractions();
        assert!((z.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(z[WATER], 0.0);
        assert!(z[2] > 0.8);
        assert_eq!(COMPONENTS[WATER].name, "water");
        assert_eq!(COMPONENTS[C7_PLUS].name, "C7");
    }

    #[test]
    fn mass_flow_uses_molar_masses() {
        let mut flows = [0.0; COMPONENT_COUNT];
        flows[2] = 10.0;
        assert!((mass_flow(&flows) - 160.43).abs() < 1e-9);
    }
}
