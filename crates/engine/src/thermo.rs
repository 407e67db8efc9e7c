//! Screening thermodynamics: K-values, flash, bubble point, phase envelope.
//!
//! K-values follow the Whitson–Torp convergence-pressure form of Wilson's
//! correlation, so every K tends to 1 as pressure approaches the
//! convergence pressure. The convergence pressure of a mixture comes from
//! Standing's correlation on the molar mass of its C7+ fraction.

use crate::components::{C7_PLUS, COMPONENT_COUNT, COMPONENTS};

/// Component flows or mole amounts, in table order.
pub type Flows = [f64; COMPONENT_COUNT];

pub const KELVIN: f64 = 273.15;
pub const GAS_CONSTANT: f64 = 8.314;
const ATMOSPHERIC: f64 = 1.01325;
const PSIA_PER_BAR: f64 = 14.5038;

const MIN_CONVERGENCE_PRESSURE: f64 = 50.0;
const MAX_CONVERGENCE_PRESSURE: f64 = 700.0;

/// Standing: Pk [psia] = 60 · M(C7+) − 4200, clamped to a sane band.
pub fn convergence_pressure(flows: &Flows) -> f64 {
    let heavy: f64 = flows[C7_PLUS..].iter().sum();
    if heavy <= 0.0 {
        return MIN_CONVERGENCE_PRESSURE;
    }
    let molar_mass = flows[C7_PLUS..]
        .iter()
        .zip(&COMPONENTS[C7_PLUS..])
        .map(|(n, c)| n * c.molar_mass)
        .sum::<f64>()
        / heavy;
    ((60.0 * molar_mass - 4200.0) / PSIA_PER_BAR)
        .clamp(MIN_CONVERGENCE_PRESSURE, MAX_CONVERGENCE_PRESSURE)
}

pub fn k_values(temperature_k: f64, pressure_bara: f64, convergence_pressure: f64) -> Flows {
    let a = if pressure_bara >= convergence_pressure {
        0.0
    } else {
        let reduced =
            (pressure_bara.max(ATMOSPHERIC) - ATMOSPHERIC) / (convergence_pressure - ATMOSPHERIC);
        1.0 - reduced.powf(0.6)
    };
    COMPONENTS.map(|c| {
        (c.critical_pressure / convergence_pressure).powf(a - 1.0)
            * (c.critical_pressure / pressure_bara)
            * (5.37 * a * (1.0 + c.acentric_factor) * (1.0 - c.critical_temperature / temperature_k))
                .exp()
    })
}

/// Vapor/liquid split of a flashed stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FlashSplit {
    pub vapor: Flows,
    pub liquid: Flows,
    pub vapor_fraction: f64,
}

fn check_conditions(temperature_c: f64, pressure_bara: f64) -> Result<(), String> {
    if !(temperature_c + KELVIN > 0.0) || !temperature_c.is_finite() {
        return Err(format!("temperature {temperature_c} °C is not physical"));
    }
    if !(pressure_bara > 0.0) || !pressure_bara.is_finite() {
        return Err(format!("pressure {pressure_bara} bara is not physical"));
    }
    Ok(())
}

fn fractions(flows: &Flows) -> Option<Flows> {
    let total: f64 = flows.iter().sum();
    (total > 0.0).then(|| flows.map(|n| n / total))
}

/// Isothermal two-phase flash.
pub fn flash(flows: &Flows, temperature_c: f64, pressure_bara: f64) -> Result<FlashSplit, String> {
    check_conditions(temperature_c, pressure_bara)?;
    let Some(z) = fractions(flows) else {
        return Ok(FlashSplit {
            vapor: [0.0; COMPONENT_COUNT],
            liquid: [0.0; COMPONENT_COUNT],
            vapor_fraction: 0.0,
        });
    };

    let k = k_values(
        temperature_c + KELVIN,
        pressure_bara,
        convergence_pressure(flows),
    );
    let bubble: f64 = z.iter().zip(&k).map(|(z, k)| z * k).sum();
    if bubble <= 1.0 {
        return Ok(FlashSplit {
            vapor: [0.0; COMPONENT_COUNT],
            liquid: *flows,
            vapor_fraction: 0.0,
        });
    }
    let dew: f64 = z.iter().zip(&k).map(|(z, k)| z / k).sum();
    if dew <= 1.0 {
        return Ok(FlashSplit {
            vapor: *flows,
            liquid: [0.0; COMPONENT_COUNT],
            vapor_fraction: 1.0,
        });
    }

    let beta = rachford_rice(&z, &k);
    let mut vapor = [0.0; COMPONENT_COUNT];
    let mut liquid = [0.0; COMPONENT_COUNT];
    for i in 0..COMPONENT_COUNT {
        vapor[i] = flows[i] * beta * k[i] / (1.0 + beta * (k[i] - 1.0));
        liquid[i] = (flows[i] - vapor[i]).max(0.0);
    }
    Ok(FlashSplit {
        vapor,
        liquid,
        vapor_fraction: beta,
    })
}

/// Vapor fraction from the Rachford–Rice equation, by bisection on (0, 1).
///
/// Only called when both the bubble and dew sums exceed one, so the
/// residual changes sign on the interval.
fn rachford_rice(z: &Flows, k: &Flows) -> f64 {
    let residual = |beta: f64| -> f64 {
        z.iter()
            .zip(k)
            .map(|(z, k)| z * (k - 1.0) / (1.0 + beta * (k - 1.0)))
            .sum()
    };
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if residual(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Bubble-point pressure at `temperature_c`. Below 1 mbar reports zero.
pub fn bubble_point_pressure(flows: &Flows, temperature_c: f64) -> Result<f64, String> {
    check_conditions(temperature_c, ATMOSPHERIC)?;
    let z = fractions(flows).ok_or("stream has no flow")?;
    let pk = convergence_pressure(flows);
    let t = temperature_c + KELVIN;
    let excess = |p: f64| -> f64 {
        z.iter()
            .zip(k_values(t, p, pk).iter())
            .map(|(z, k)| z * k)
            .sum::<f64>()
            - 1.0
    };

    let mut p = 1e-3;
    if excess(p) <= 0.0 {
        return Ok(0.0);
    }
    loop {
        let next = p * 1.2;
        if next >= pk {
            return Err(format!("no bubble point below {pk:.1} bara"));
        }
        if excess(next) <= 0.0 {
            break;
        }
        p = next;
    }

    let (mut lo, mut hi) = (p, p * 1.2);
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if excess(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// Highest pressure at which the mixture splits into two phases.
///
/// Scans -150..=150 °C in 2 K steps; at each temperature walks down from
/// just under the convergence pressure and bisects the first boundary hit.
pub fn cricondenbar(flows: &Flows) -> Result<f64, String> {
    let z = fractions(flows).ok_or("stream has no flow")?;
    let pk = convergence_pressure(flows);
    let two_phase = |t: f64, p: f64| -> bool {
        let k = k_values(t, p, pk);
        let bubble: f64 = z.iter().zip(&k).map(|(z, k)| z * k).sum();
        let dew: f64 = z.iter().zip(&k).map(|(z, k)| z / k).sum();
        bubble > 1.0 && dew > 1.0
    };

    let mut best: Option<f64> = None;
    for step in 0..=150 {
        let t = -150.0 + 2.0 * step as f64 + KELVIN;
        let mut above: Option<f64> = None;
        let mut p = 0.999 * pk;
        while p > 1.0 {
            if two_phase(t, p) {
                let edge = match above {
                    None => p,
                    Some(hi) => {
                        let (mut lo, mut hi) = (p, hi);
                        for _ in 0..40 {
                            let mid = 0.5 * (lo + hi);
                            if two_phase(t, mid) {
                                lo = mid;
                            } else {
                                hi = mid;
                            }
                        }
                        lo
                    }
                };
                best = Some(best.map_or(edge, |b| b.max(edge)));
                break;
            }
            above = Some(p);
            p /= 1.05;
        }
    }
    best.ok_or_else(|| "no two-phase region found".to_string())
}

/// Saturation pressure of water, Antoine equation, bara.
pub fn water_vapor_pressure(temperature_c: f64) -> f64 {
    let (a, b, c) = if temperature_c < 100.0 {
        (8.07131, 1730.63, 233.426)
    } else {
        (8.14019, 1810.94, 244.485)
    };
    10f64.powf(a - b / (c + temperature_c)) / 750.062
}

/// Molar ideal-gas heat capacity of a mixture, J/(mol·K).
pub fn heat_capacity(flows: &Flows) -> f64 {
    let total: f64 = flows.iter().sum();
    if total <= 0.0 {
        return COMPONENTS[2].heat_capacity;
    }
    flows
        .iter()
        .zip(COMPONENTS.iter())
        .map(|(n, c)| n * c.heat_capacity)
        .sum::<f64>()
        / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{WATER, well_fluid_fractions};

    #[test]
    fn k_values_approach_unity_at_convergence_pressure() {
        let k = k_values(300.0, 200.0, 200.0);
        assert!(k.iter().all(|k| (k - 1.0).abs() < 1e-12));
    }

    #[test]
    fn low_pressure_k_values_follow_volatility() {
        let k = k_values(300.0, 2.0, 345.0);
        assert!(k[2] > k[4], "methane lighter than propane");
        assert!(k[4] > k[COMPONENT_COUNT - 1]);
    }

    #[test]
    fn flash_conserves_every_component() {
        let z = well_fluid_fractions().map(|x| 100.0 * x);
        let split = flash(&z, 5.0, 75.0).unwrap();
        assert!(split.vapor_fraction > 0.5 && split.vapor_fraction < 1.0);
        for i in 0..COMPONENT_COUNT {
            assert!((split.vapor[i] + split.liquid[i] - z[i]).abs() < 1e-9);
        }
        // the gas is leaner than the liquid in heavy ends
        let last = COMPONENT_COUNT - 1;
        assert!(split.liquid[last] > split.vapor[last]);
    }

    #[test]
    fn flash_of_empty_stream_is_empty() {
        let split = flash(&[0.0; COMPONENT_COUNT], 20.0, 10.0).unwrap();
        assert_eq!(split.vapor_fraction, 0.0);
        assert!(split.liquid.iter().all(|n| *n == 0.0));
    }

    #[test]
    fn flash_rejects_non_physical_conditions() {
        let z = well_fluid_fractions();
        assert!(flash(&z, 20.0, 0.0).is_err());
        assert!(flash(&z, -300.0, 10.0).is_err());
    }

    #[test]
    fn bubble_point_of_heavy_liquid_is_low() {
        let mut heavy = [0.0; COMPONENT_COUNT];
        heavy[COMPONENT_COUNT - 1] = 1.0;
        assert_eq!(bubble_point_pressure(&heavy, 20.0).unwrap(), 0.0);

        let mut live = heavy;
        live[2] = 0.05;
        let p = bubble_point_pressure(&live, 20.0).unwrap();
        assert!(p > 1.0, "dissolved methane raises the bubble point, got {p}");
    }

    #[test]
    fn cricondenbar_stays_below_convergence_pressure() {
        let gas = well_fluid_fractions();
        let pk = convergence_pressure(&gas);
        let ccb = cricondenbar(&gas).unwrap();
        assert!(ccb > 1.0 && ccb < pk);
    }

    #[test]
    fn water_vapor_pressure_near_boiling() {
        let p = water_vapor_pressure(100.0);
        assert!((p - ATMOSPHERIC).abs() < 0.02);
        assert!(water_vapor_pressure(20.0) < 0.03);
        assert_eq!(WATER, 9);
    }

    #[test]
    fn heat_capacity_of_empty_stream_defaults_to_methane() {
        assert_eq!(heat_capacity(&[0.0; COMPONENT_COUNT]), 35.7);
    }
}
