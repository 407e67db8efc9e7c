//! Tear-stream convergence for the LP liquid recycle.
//!
//! Each iteration runs one engine pass, reads the recomputed liquid at the
//! recycle inlet, and writes the next guess into the tear stream. The loop
//! is converged when the total recycle flow changes by less than the
//! relative tolerance between the guess and the recomputed value.

use crate::topology::FeedbackEdge;
use oilstab_config::{Acceleration, SolverConfig};
use oilstab_core::{ConvergenceError, ProcessEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Relative change of total flow between guess and recomputed value.
pub fn residual(guess: &[f64], computed: &[f64]) -> f64 {
    let old: f64 = guess.iter().sum();
    let new: f64 = computed.iter().sum();
    (new - old).abs() / new.max(old).max(1e-9)
}

/// Two-point Wegstein acceleration with a bounded q.
///
/// With x the guess and g(x) the recomputed value, the slope
/// s = Δg/Δx between consecutive iterates gives q = s / (s − 1) and the
/// next guess q·x + (1 − q)·g(x). The first step is plain substitution.
#[derive(Debug, Clone)]
pub struct WegsteinAccelerator {
    previous: Option<(Vec<f64>, Vec<f64>)>,
    q_min: f64,
    q_max: f64,
}

impl WegsteinAccelerator {
    pub fn new(q_min: f64, q_max: f64) -> Self {
        Self {
            previous: None,
            q_min,
            q_max,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(-5.0, 0.0)
    }

    pub fn accelerate(&mut self, x: &[f64], gx: &[f64]) -> Vec<f64> {
        let next = match &self.previous {
            None => gx.to_vec(),
            Some((x_prev, g_prev)) => x
                .iter()
                .zip(gx)
                .zip(x_prev.iter().zip(g_prev))
                .map(|((&x, &g), (&x_prev, &g_prev))| {
                    let dx = x - x_prev;
                    if dx.abs() <= 1e-12 {
                        return g;
                    }
                    let s = (g - g_prev) / dx;
                    let q = if (s - 1.0).abs() > 1e-12 {
                        s / (s - 1.0)
                    } else {
                        0.0
                    };
                    let q = q.clamp(self.q_min, self.q_max);
                    q * x + (1.0 - q) * g
                })
                .collect(),
        };
        self.previous = Some((x.to_vec(), gx.to_vec()));
        next.into_iter().map(|v| v.max(0.0)).collect()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Outcome of a converged loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub iterations: u32,
    pub residual: f64,
}

#[derive(Debug, Clone)]
pub struct RecycleSolver {
    tolerance: f64,
    max_iterations: u32,
    acceleration: Acceleration,
}

impl RecycleSolver {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            tolerance: config.recycle_tolerance,
            max_iterations: config.max_recycle_iterations,
            acceleration: config.acceleration,
        }
    }

    /// Iterate passes until the tear stream settles.
    ///
    /// `cancel` is checked before every pass; once set, the loop stops with
    /// [`ConvergenceError::Abandoned`].
    pub fn solve(
        &self,
        engine: &mut dyn ProcessEngine,
        edge: &FeedbackEdge,
        cancel: &AtomicBool,
    ) -> Result<SolveReport, ConvergenceError> {
        let mut accelerator = WegsteinAccelerator::with_defaults();
        let mut guess = engine.stream(&edge.outlet)?.component_flows;
        let mut last_residual = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            if cancel.load(Ordering::Acquire) {
                return Err(ConvergenceError::Abandoned {
                    iterations: iteration - 1,
                });
            }

            engine.run_pass()?;
            let computed = engine.stream(&edge.inlet)?.component_flows;
            last_residual = residual(&guess, &computed);
            debug!(iteration, residual = last_residual, "Recycle iteration");

            if last_residual < self.tolerance {
                info!(iterations = iteration, residual = last_residual, "Recycle converged");
                return Ok(SolveReport {
                    iterations: iteration,
                    residual: last_residual,
                });
            }

            let next = match self.acceleration {
                Acceleration::Wegstein => accelerator.accelerate(&guess, &computed),
                Acceleration::Direct => computed,
            };
            engine.set_stream_flows(&edge.outlet, &next)?;
            guess = next;
        }

        Err(ConvergenceError::IterationCap {
            iterations: self.max_iterations,
            residual: last_residual,
            tolerance: self.tolerance,
        })
    }
}
