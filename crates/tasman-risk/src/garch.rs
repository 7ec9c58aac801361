//! GARCH(1,1) with constant mean and normal innovations.
//!
//! ```text
//! r_t  = μ + ε_t
//! σ²_t = ω + α·ε²_{t-1} + β·σ²_{t-1}
//! ```
//!
//! Parameters are estimated by maximum likelihood. The constraints
//! `ω > 0`, `α, β ≥ 0` and `α + β < 1` are enforced by optimising over an
//! unconstrained reparameterisation:
//!
//! ```text
//! ω = exp(x₁)
//! α + β = 0.9999 · sigmoid(x₂)
//! α = (α + β) · sigmoid(x₃)
//! ```
//!
//! The pre-sample variance and squared residual are seeded with an
//! exponentially weighted backcast of the first squared residuals.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Upper bound on α + β.
const MAX_PERSISTENCE: f64 = 0.9999;

/// Decay of the backcast weights.
const BACKCAST_DECAY: f64 = 0.94;

/// Squared residuals used for the backcast.
const BACKCAST_WINDOW: usize = 75;

/// Sample variance at or below this is treated as zero.
const DEGENERATE_VARIANCE: f64 = 1e-12;

/// Errors that can occur while fitting the model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelFitError {
    /// Too few observations to fit.
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required observations.
        required: usize,
        /// Available observations.
        actual: usize,
    },

    /// Input or likelihood is not finite.
    #[error("Non-finite value: {0}")]
    NonFinite(String),

    /// Optimiser hit its iteration cap.
    #[error("Optimiser did not converge within {iterations} iterations")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
    },
}

/// Estimation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GarchModel {
    /// Minimum observations required to fit (default: 30)
    pub min_observations: usize,
    /// Nelder-Mead iteration cap (default: 5000)
    pub max_iterations: usize,
    /// Relative tolerance on the simplex's likelihood spread (default: 1e-9)
    pub tolerance: f64,
}

impl Default for GarchModel {
    fn default() -> Self {
        Self {
            min_observations: 30,
            max_iterations: 5000,
            tolerance: 1e-9,
        }
    }
}

/// Fitted GARCH(1,1) parameters and terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GarchFit {
    /// Constant mean μ.
    pub mu: f64,
    /// Variance intercept ω.
    pub omega: f64,
    /// ARCH coefficient α.
    pub alpha: f64,
    /// GARCH coefficient β.
    pub beta: f64,
    /// Maximised log-likelihood.
    pub log_likelihood: f64,
    /// Optimiser iterations used.
    pub iterations: usize,
    /// Observations fitted.
    pub n_obs: usize,
    /// Training slice had zero variance.
    pub degenerate: bool,
    last_variance: f64,
    last_residual: f64,
}

impl GarchFit {
    /// Fit for a constant series: zero variance at every horizon.
    pub const fn degenerate(mu: f64, n_obs: usize) -> Self {
        Self {
            mu,
            omega: 0.0,
            alpha: 0.0,
            beta: 0.0,
            log_likelihood: f64::INFINITY,
            iterations: 0,
            n_obs,
            degenerate: true,
            last_variance: 0.0,
            last_residual: 0.0,
        }
    }

    /// α + β.
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Long-run variance `ω / (1 − α − β)`.
    pub fn unconditional_variance(&self) -> Option<f64> {
        let gap = 1.0 - self.persistence();
        (gap > 0.0).then(|| self.omega / gap)
    }

    /// Conditional variance of the last fitted observation.
    pub const fn last_variance(&self) -> f64 {
        self.last_variance
    }

    /// Variance path for steps `T+1 ..= T+horizon`.
    pub fn forecast_variance(&self, horizon: usize) -> Array1<f64> {
        let mut path = Array1::zeros(horizon);
        if self.degenerate {
            return path;
        }

        let mut variance = self.omega
            + self.alpha * self.last_residual * self.last_residual
            + self.beta * self.last_variance;
        for step in path.iter_mut() {
            *step = variance;
            variance = self.omega + self.persistence() * variance;
        }
        path
    }

    /// Mean forecast volatility per step, scaled to `horizon` steps.
    ///
    /// `mean_h(sqrt(σ²_{T+h})) · sqrt(horizon)`
    pub fn forecast_volatility(&self, horizon: usize) -> f64 {
        if horizon == 0 {
            return 0.0;
        }
        let path = self.forecast_variance(horizon);
        let mean_sigma = path.mapv(f64::sqrt).sum() / horizon as f64;
        mean_sigma * (horizon as f64).sqrt()
    }
}

/// Model parameters in natural form.
#[derive(Debug, Clone, Copy)]
struct Params {
    mu: f64,
    omega: f64,
    alpha: f64,
    beta: f64,
}

impl Params {
    fn from_unconstrained(x: &[f64; 4]) -> Self {
        let persistence = MAX_PERSISTENCE * sigmoid(x[2]);
        let alpha = persistence * sigmoid(x[3]);
        Self {
            mu: x[0],
            omega: x[1].exp(),
            alpha,
            beta: persistence - alpha,
        }
    }

    fn to_unconstrained(self) -> [f64; 4] {
        let persistence = self.alpha + self.beta;
        [
            self.mu,
            self.omega.ln(),
            logit(persistence / MAX_PERSISTENCE),
            logit(self.alpha / persistence),
        ]
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Observation data shared by every likelihood evaluation.
struct Likelihood<'a> {
    returns: ArrayView1<'a, f64>,
    backcast: f64,
}

impl Likelihood<'_> {
    /// Negative log-likelihood, `+∞` where it is not finite.
    fn negative(&self, params: &Params) -> f64 {
        let (nll, _, _) = self.recurse(params);
        if nll.is_finite() { nll } else { f64::INFINITY }
    }

    /// Run the variance recursion; returns (nll, last σ², last ε).
    fn recurse(&self, p: &Params) -> (f64, f64, f64) {
        let ln_2pi = (2.0 * PI).ln();
        let mut variance = p.omega + (p.alpha + p.beta) * self.backcast;
        let mut nll = 0.0;
        let mut residual = 0.0;

        for (t, &r) in self.returns.iter().enumerate() {
            if t > 0 {
                variance = p.omega + p.alpha * residual * residual + p.beta * variance;
            }
            variance = variance.max(f64::MIN_POSITIVE);
            residual = r - p.mu;
            nll += 0.5 * (ln_2pi + variance.ln() + residual * residual / variance);
        }

        (nll, variance, residual)
    }
}

/// Exponentially weighted mean of the first squared residuals.
fn backcast(residuals: &Array1<f64>) -> f64 {
    let window = residuals.len().min(BACKCAST_WINDOW);
    let (weighted, total) = residuals
        .iter()
        .take(window)
        .enumerate()
        .fold((0.0, 0.0), |(acc, norm), (i, e)| {
            let w = BACKCAST_DECAY.powi(i as i32);
            (acc + w * e * e, norm + w)
        });
    weighted / total
}

impl GarchModel {
    /// Create a model with the given settings.
    pub const fn new(min_observations: usize, max_iterations: usize, tolerance: f64) -> Self {
        Self {
            min_observations,
            max_iterations,
            tolerance,
        }
    }

    /// Fit the model by maximum likelihood.
    ///
    /// A series with zero sample variance yields a [degenerate](GarchFit::degenerate)
    /// fit instead of an error.
    pub fn fit(&self, returns: ArrayView1<'_, f64>) -> Result<GarchFit, ModelFitError> {
        let n = returns.len();
        let required = self.min_observations.max(2);
        if n < required {
            return Err(ModelFitError::InsufficientData {
                required,
                actual: n,
            });
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(ModelFitError::NonFinite("input return".to_string()));
        }

        let mean = returns.sum() / n as f64;
        let residuals = returns.mapv(|r| r - mean);
        let variance = residuals.mapv(|e| e * e).sum() / n as f64;
        if variance <= DEGENERATE_VARIANCE {
            return Ok(GarchFit::degenerate(mean, n));
        }

        let likelihood = Likelihood {
            returns,
            backcast: backcast(&residuals),
        };

        let start = self.starting_point(&likelihood, mean, variance)?;
        let steps = [0.1 * variance.sqrt(), 0.5, 0.5, 0.5];
        let result = nelder_mead(
            |x| likelihood.negative(&Params::from_unconstrained(x)),
            start,
            steps,
            self.max_iterations,
            self.tolerance,
        );

        if !result.converged {
            return Err(ModelFitError::NotConverged {
                iterations: result.iterations,
            });
        }

        let params = Params::from_unconstrained(&result.x);
        let (nll, last_variance, last_residual) = likelihood.recurse(&params);
        if !nll.is_finite() {
            return Err(ModelFitError::NonFinite("log-likelihood".to_string()));
        }

        Ok(GarchFit {
            mu: params.mu,
            omega: params.omega,
            alpha: params.alpha,
            beta: params.beta,
            log_likelihood: -nll,
            iterations: result.iterations,
            n_obs: n,
            degenerate: false,
            last_variance,
            last_residual,
        })
    }

    /// Best of a small grid of (α, α+β) pairs, ω matched to the sample variance.
    fn starting_point(
        &self,
        likelihood: &Likelihood<'_>,
        mean: f64,
        variance: f64,
    ) -> Result<[f64; 4], ModelFitError> {
        let mut best: Option<(f64, Params)> = None;

        for alpha in [0.01, 0.05, 0.1, 0.2] {
            for persistence in [0.5, 0.7, 0.9, 0.98] {
                if alpha >= persistence {
                    continue;
                }
                let candidate = Params {
                    mu: mean,
                    omega: variance * (1.0 - persistence),
                    alpha,
                    beta: persistence - alpha,
                };
                let nll = likelihood.negative(&candidate);
                if nll.is_finite() && best.is_none_or(|(b, _)| nll < b) {
                    best = Some((nll, candidate));
                }
            }
        }

        best.map(|(_, params)| params.to_unconstrained())
            .ok_or_else(|| ModelFitError::NonFinite("starting likelihood".to_string()))
    }
}

/// Nelder-Mead outcome.
#[derive(Debug, Clone, Copy)]
struct Minimum {
    x: [f64; 4],
    iterations: usize,
    converged: bool,
}

/// Minimise `f` with the Nelder-Mead simplex method.
///
/// Converges when the spread of function values across the simplex falls
/// below `tolerance · (1 + |f_best|)`.
fn nelder_mead<F>(
    f: F,
    start: [f64; 4],
    steps: [f64; 4],
    max_iterations: usize,
    tolerance: f64,
) -> Minimum
where
    F: Fn(&[f64; 4]) -> f64,
{
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let mut simplex: Vec<([f64; 4], f64)> = Vec::with_capacity(5);
    simplex.push((start, f(&start)));
    for (i, step) in steps.iter().enumerate() {
        let mut vertex = start;
        vertex[i] += step;
        simplex.push((vertex, f(&vertex)));
    }

    let along = |from: &[f64; 4], to: &[f64; 4], t: f64| -> [f64; 4] {
        std::array::from_fn(|i| from[i] + t * (to[i] - from[i]))
    };

    for iteration in 0..max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[4].1;
        if best.is_finite() && (worst - best).abs() <= tolerance * (1.0 + best.abs()) {
            return Minimum {
                x: simplex[0].0,
                iterations: iteration,
                converged: true,
            };
        }

        let centroid: [f64; 4] =
            std::array::from_fn(|i| simplex[..4].iter().map(|(v, _)| v[i]).sum::<f64>() / 4.0);
        let worst_vertex = simplex[4].0;

        let reflected = along(&centroid, &worst_vertex, -REFLECT);
        let f_reflected = f(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = along(&centroid, &worst_vertex, -EXPAND);
            let f_expanded = f(&expanded);
            simplex[4] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[3].1 {
            simplex[4] = (reflected, f_reflected);
        } else {
            let (target, f_target) = if f_reflected < simplex[4].1 {
                (reflected, f_reflected)
            } else {
                (worst_vertex, simplex[4].1)
            };
            let contracted = along(&centroid, &target, CONTRACT);
            let f_contracted = f(&contracted);
            if f_contracted < f_target {
                simplex[4] = (contracted, f_contracted);
            } else {
                let anchor = simplex[0].0;
                for vertex in simplex.iter_mut().skip(1) {
                    let shrunk = along(&anchor, &vertex.0, SHRINK);
                    *vertex = (shrunk, f(&shrunk));
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    Minimum {
        x: simplex[0].0,
        iterations: max_iterations,
        converged: false,
    }
}
