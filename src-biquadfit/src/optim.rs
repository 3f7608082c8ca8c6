//! biquadfit - Parametric equalizer fitting
//!
//! Copyright (C) 2025 Pierre Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.
//!
//! Joint filter optimizer.
//!
//! A box constrained quasi-Newton solver:
//!
//! - forward finite differences for the gradient, probing inwards at the
//!   upper bound
//! - L-BFGS two-loop recursion over the last [`HISTORY_SIZE`] steps
//! - gradient projection: components pushing into a saturated bound are
//!   dropped before the line search
//! - Armijo backtracking, accepting the last trial when none passes
//!
//! The solver never fails. It stops on a flat loss history, on a vanishing
//! projected direction, or after [`MAX_ITER`] iterations, and returns the
//! best point it has seen.

use std::collections::VecDeque;
use std::fmt;

use crate::constraints::{FilterParams, FilterSpec};
use crate::loss::LossData;
use crate::x2peq::{bounds, clip, params2x, x2params};
use ndarray::Array1;

/// Number of (s, y) pairs kept by L-BFGS
pub const HISTORY_SIZE: usize = 10;
/// Hard iteration cap
pub const MAX_ITER: usize = 150;
/// No convergence test before this many iterations
pub const MIN_ITER: usize = 50;
/// Losses in the long convergence window
pub const STD_WINDOW: usize = 8;
/// Std of the long window below which the solver has converged
pub const STD_TOL: f64 = 0.002;
/// Losses in the short convergence window
pub const SHORT_STD_WINDOW: usize = 4;
/// Std of the short window below which the solver has converged
pub const SHORT_STD_TOL: f64 = 0.001;
/// Armijo sufficient decrease constant
pub const ARMIJO_C: f64 = 1e-4;
/// Step shrink factor of the line search
pub const BACKTRACK_FACTOR: f64 = 0.5;
/// Halvings tried after the unit step
pub const MAX_HALVINGS: usize = 20;
/// Below this norm the projected direction counts as zero
pub const DIRECTION_TOL: f64 = 1e-10;
/// Relative curvature needed to keep an (s, y) pair
pub const CURVATURE_TOL: f64 = 1e-10;

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The loss history went flat
    Converged,
    /// No feasible descent direction is left
    Stationary,
    /// [`MAX_ITER`] reached
    MaxIterations,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Converged => "loss converged",
            StopReason::Stationary => "projected direction vanished",
            StopReason::MaxIterations => "iteration cap reached",
        };
        f.write_str(s)
    }
}

/// Solver state between iterations.
#[derive(Debug, Clone)]
pub struct OptimizerState {
    /// Current iterate
    pub x: Vec<f64>,
    /// Loss at `x`
    pub loss: f64,
    /// Gradient at `x`
    pub gradient: Vec<f64>,
    /// (s, y) pairs, oldest first
    pub history: VecDeque<(Vec<f64>, Vec<f64>)>,
    /// Best iterate seen so far
    pub best_x: Vec<f64>,
    /// Loss at `best_x`
    pub best_loss: f64,
    /// Loss of the initial point, then of every accepted iterate
    pub loss_history: Vec<f64>,
}

impl OptimizerState {
    fn new(x: Vec<f64>, loss: f64, gradient: Vec<f64>) -> Self {
        Self {
            best_x: x.clone(),
            best_loss: loss,
            loss_history: vec![loss],
            history: VecDeque::with_capacity(HISTORY_SIZE),
            x,
            loss,
            gradient,
        }
    }

    fn push_pair(&mut self, s: Vec<f64>, y: Vec<f64>) {
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back((s, y));
    }

    /// Move to `x_new`. The (s, y) pair is kept only when it carries enough
    /// positive curvature; returns whether it was kept.
    fn accept(&mut self, x_new: Vec<f64>, f_new: f64, g_new: Vec<f64>) -> bool {
        let s: Vec<f64> = x_new.iter().zip(&self.x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&self.gradient).map(|(a, b)| a - b).collect();
        let kept = dot(&s, &y) > CURVATURE_TOL * norm(&s) * norm(&y);
        if kept {
            self.push_pair(s, y);
        }

        self.x = x_new;
        self.loss = f_new;
        self.gradient = g_new;
        self.loss_history.push(f_new);
        if f_new < self.best_loss {
            self.best_loss = f_new;
            self.best_x = self.x.clone();
        }
        kept
    }
}

/// Result of one [`optimize`] call.
#[derive(Debug, Clone)]
pub struct OptimizeResult {
    /// Best filters found, inside their specs
    pub filters: Vec<FilterParams>,
    /// Loss of `filters`
    pub loss: f64,
    /// Iterations run
    pub iterations: usize,
    /// Why the solver stopped
    pub stop: StopReason,
    /// Initial loss followed by the loss of every iterate
    pub loss_history: Vec<f64>,
}

/// Loss and bounds for one optimization.
#[derive(Debug, Clone)]
pub struct Optimizer<'a> {
    specs: &'a [FilterSpec],
    data: LossData,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl<'a> Optimizer<'a> {
    /// Precompute the loss data and the box of the parameter vector.
    pub fn new(specs: &'a [FilterSpec], freqs: &Array1<f64>, target: &Array1<f64>, srate: f64) -> Self {
        let (lower, upper) = bounds(specs);
        Self {
            specs,
            data: LossData::new(freqs, target, srate),
            lower,
            upper,
        }
    }

    /// Loss at `x`.
    pub fn loss(&self, x: &[f64]) -> f64 {
        self.data.loss(x, self.specs)
    }

    /// Forward-difference gradient at `x` where the loss is `fx`.
    ///
    /// Each probe stays inside the box: a component at its upper bound is
    /// probed backwards, and one that cannot move either way gets 0.
    pub fn gradient(&self, x: &[f64], fx: f64) -> Vec<f64> {
        let h = f64::EPSILON.sqrt();
        let mut probe = x.to_vec();
        (0..x.len())
            .map(|i| {
                let step = if x[i] + h <= self.upper[i] {
                    h
                } else if x[i] - h >= self.lower[i] {
                    -h
                } else {
                    return 0.0;
                };
                probe[i] = x[i] + step;
                let f = self.loss(&probe);
                probe[i] = x[i];
                (f - fx) / step
            })
            .collect()
    }

    /// Drop direction components that push into a bound `x` already sits on.
    pub fn project(&self, x: &[f64], d: &mut [f64]) {
        for i in 0..d.len() {
            if (x[i] <= self.lower[i] && d[i] < 0.0) || (x[i] >= self.upper[i] && d[i] > 0.0) {
                d[i] = 0.0;
            }
        }
    }

    /// Run the solver from `initial`.
    pub fn run(&self, initial: &[FilterParams]) -> OptimizeResult {
        let mut x = params2x(initial);
        clip(&mut x, &self.lower, &self.upper);
        let fx = self.loss(&x);
        let g = self.gradient(&x, fx);
        let mut state = OptimizerState::new(x, fx, g);
        log::debug!("optimizer start: loss={:.6}", fx);

        let mut stop = StopReason::MaxIterations;
        let mut iterations = 0;
        while iterations < MAX_ITER {
            let mut d = lbfgs_direction(&state.gradient, &state.history);
            self.project(&state.x, &mut d);
            if dot(&state.gradient, &d) >= 0.0 {
                d = state.gradient.iter().map(|v| -v).collect();
                self.project(&state.x, &mut d);
            }
            if norm(&d) < DIRECTION_TOL {
                stop = StopReason::Stationary;
                break;
            }

            let (x_new, f_new, t) = self.line_search(&state, &d);
            let g_new = self.gradient(&x_new, f_new);
            state.accept(x_new, f_new, g_new);
            iterations += 1;
            log::debug!(
                "iter {:3}: loss={:.6} step={:.3e} history={}",
                iterations,
                f_new,
                t,
                state.history.len()
            );

            if iterations >= MIN_ITER && has_converged(&state.loss_history) {
                stop = StopReason::Converged;
                break;
            }
        }
        log::debug!(
            "optimizer stop after {} iterations ({}), best loss={:.6}",
            iterations,
            stop,
            state.best_loss
        );

        let mut best = state.best_x;
        clip(&mut best, &self.lower, &self.upper);
        OptimizeResult {
            filters: x2params(&best, self.specs),
            loss: state.best_loss,
            iterations,
            stop,
            loss_history: state.loss_history,
        }
    }

    // Armijo backtracking along d; returns (x, loss, step)
    fn line_search(&self, state: &OptimizerState, d: &[f64]) -> (Vec<f64>, f64, f64) {
        let slope = dot(&state.gradient, d);
        let mut t = 1.0;
        let mut trial = state.x.clone();
        let mut f_trial = state.loss;
        for _ in 0..=MAX_HALVINGS {
            for i in 0..trial.len() {
                trial[i] = state.x[i] + t * d[i];
            }
            clip(&mut trial, &self.lower, &self.upper);
            f_trial = self.loss(&trial);
            if f_trial <= state.loss + ARMIJO_C * t * slope {
                return (trial, f_trial, t);
            }
            t *= BACKTRACK_FACTOR;
        }
        // no trial passed: keep the last one
        (trial, f_trial, t / BACKTRACK_FACTOR)
    }
}

/// Refine `initial` filters against `target` on the `freqs` grid.
pub fn optimize(
    initial: &[FilterParams],
    specs: &[FilterSpec],
    freqs: &Array1<f64>,
    target: &Array1<f64>,
    srate: f64,
) -> OptimizeResult {
    Optimizer::new(specs, freqs, target, srate).run(initial)
}

fn has_converged(losses: &[f64]) -> bool {
    let tail_std = |w: usize| {
        if losses.len() < w {
            return None;
        }
        Some(population_std(&losses[losses.len() - w..]))
    };
    tail_std(STD_WINDOW).is_some_and(|s| s < STD_TOL)
        || tail_std(SHORT_STD_WINDOW).is_some_and(|s| s < SHORT_STD_TOL)
}

fn population_std(v: &[f64]) -> f64 {
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    (v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn lbfgs_direction(g: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>)>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y) in history.iter().rev() {
        let rho = 1.0 / dot(y, s);
        let alpha = rho * dot(s, &q);
        axpy(&mut q, -alpha, y);
        alphas.push((rho, alpha));
    }
    if let Some((s, y)) = history.back() {
        let gamma = dot(s, y) / dot(y, y);
        q.iter_mut().for_each(|v| *v *= gamma);
    }
    for ((s, y), (rho, alpha)) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &q);
        axpy(&mut q, alpha - beta, s);
    }
    q.iter().map(|v| -v).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn axpy(y: &mut [f64], a: f64, x: &[f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}
