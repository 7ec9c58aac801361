//! Walk-forward monthly volatility forecasts.
//!
//! The evaluation window runs from `train_end` (inclusive) to `test_end`
//! (exclusive). Each calendar month in it is one step: the model is refit on
//! every observation strictly before the month's first test point (an
//! expanding window) and forecasts the next `horizon_days` of variance.
//! Realized volatility of the month and of the month before are reported
//! next to each forecast.

use crate::aggregate::AggregateReturnPoint;
use crate::garch::GarchModel;
use crate::stats::sample_std;
use chrono::NaiveDate;
use ndarray::{Array1, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tasman_data::month::{feed_date, month_start, shift_months};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a whole forecast run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// No return observations at all.
    #[error("Return series is empty")]
    EmptySeries,

    /// Not enough data to define the evaluation window.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A return observation is NaN or infinite.
    #[error("Non-finite return at {date}")]
    NonFiniteReturn {
        /// Observation date.
        date: NaiveDate,
    },

    /// Two observations share a date.
    #[error("Duplicate observation at {date}")]
    DuplicateDate {
        /// Observation date.
        date: NaiveDate,
    },

    /// Invalid configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Forecaster configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Forecast horizon in trading days (default: 22)
    pub horizon_days: usize,

    /// Trading days per month used to scale realized volatility (default: 22)
    pub trading_days_per_month: usize,

    /// Multiplier applied to returns before fitting (default: 100.0)
    pub return_scale: f64,

    /// Exclusive end of the evaluation window; all remaining data if unset
    #[serde(with = "optional_date")]
    pub test_end: Option<NaiveDate>,

    /// Minimum training observations for a step to be fitted (default: 30)
    pub min_training_observations: usize,

    /// Optimiser iteration cap per fit (default: 5000)
    pub max_iterations: usize,

    /// Optimiser convergence tolerance (default: 1e-9)
    pub tolerance: f64,

    /// Run steps on the rayon pool (default: true)
    pub parallel: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 22,
            trading_days_per_month: 22,
            return_scale: 100.0,
            test_end: None,
            min_training_observations: 30,
            max_iterations: 5000,
            tolerance: 1e-9,
            parallel: true,
        }
    }
}

mod optional_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| tasman_data::month::parse_date(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// One month of the walk-forward plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastStep {
    /// Calendar month (first day).
    pub month: NaiveDate,
    /// First test point of the month; `None` if the month has no test data.
    pub origin: Option<NaiveDate>,
    /// Observations strictly before the origin.
    pub training_len: usize,
}

/// Outcome of a step's model fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    /// Model fitted normally.
    Fitted,
    /// Training slice had zero variance; forecast is zero.
    Degenerate,
    /// No forecast; see the record's `failure_reason`.
    Failed,
}

/// Forecast and realized volatility for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityRecord {
    /// Calendar month (first day).
    #[serde(with = "feed_date")]
    pub month: NaiveDate,
    /// Forecast volatility over the horizon.
    pub forecast_volatility: Option<f64>,
    /// Realized volatility of the month.
    pub realized_volatility: Option<f64>,
    /// Realized volatility of the previous month.
    pub lagged_realized_volatility: Option<f64>,
    /// Fit outcome.
    pub forecast_status: ForecastStatus,
    /// Why the step failed.
    pub failure_reason: Option<String>,
}

/// Monthly volatility table.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityTable {
    /// One record per calendar month in the evaluation window, ascending.
    pub records: Vec<VolatilityRecord>,
    /// Plan the records were produced from.
    pub steps: Vec<ForecastStep>,
}

impl VolatilityTable {
    /// Number of months.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no months.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Months whose step failed.
    pub fn failed_months(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .filter(|r| r.forecast_status == ForecastStatus::Failed)
            .map(|r| r.month)
            .collect()
    }

    /// Number of steps with a forecast.
    pub fn forecast_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.forecast_volatility.is_some())
            .count()
    }
}

/// A sorted, validated return series.
struct Series {
    dates: Vec<NaiveDate>,
    returns: Array1<f64>,
}

impl Series {
    fn new(points: &[AggregateReturnPoint]) -> Result<Self, ForecastError> {
        if points.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        let mut sorted: Vec<(NaiveDate, f64)> = points
            .iter()
            .map(|p| (p.date, p.value_weighted_return))
            .collect();
        sorted.sort_by_key(|(date, _)| *date);

        if let Some(pair) = sorted.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(ForecastError::DuplicateDate { date: pair[0].0 });
        }
        if let Some((date, _)) = sorted.iter().find(|(_, r)| !r.is_finite()) {
            return Err(ForecastError::NonFiniteReturn { date: *date });
        }

        let (dates, returns): (Vec<_>, Vec<_>) = sorted.into_iter().unzip();
        Ok(Self {
            dates,
            returns: Array1::from(returns),
        })
    }

    /// Returns of `range` as a slice.
    fn slice(&self, range: std::ops::Range<usize>) -> Vec<f64> {
        self.returns.slice(s![range]).to_vec()
    }
}

/// Index range and step of one evaluation month.
#[derive(Debug, Clone)]
struct MonthSpan {
    step: ForecastStep,
    test: std::ops::Range<usize>,
}

/// Walk-forward GARCH(1,1) volatility forecaster.
#[derive(Debug)]
pub struct VolatilityForecaster {
    config: ForecastConfig,
    model: GarchModel,
}

impl VolatilityForecaster {
    /// Create a forecaster with the given configuration.
    pub fn new(config: ForecastConfig) -> Result<Self, ForecastError> {
        if config.horizon_days == 0 {
            return Err(ForecastError::InvalidConfig(
                "horizon_days must be at least 1".to_string(),
            ));
        }
        if config.trading_days_per_month == 0 {
            return Err(ForecastError::InvalidConfig(
                "trading_days_per_month must be at least 1".to_string(),
            ));
        }
        if !(config.return_scale.is_finite() && config.return_scale > 0.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "return_scale must be positive, got {}",
                config.return_scale
            )));
        }
        if !(config.tolerance.is_finite() && config.tolerance > 0.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                config.tolerance
            )));
        }
        if config.max_iterations == 0 {
            return Err(ForecastError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let model = GarchModel::new(
            config.min_training_observations,
            config.max_iterations,
            config.tolerance,
        );
        Ok(Self { config, model })
    }

    /// Create a forecaster with default configuration.
    ///
    /// # Errors
    /// Returns an error if the default configuration is invalid (should not happen).
    pub fn try_default() -> Result<Self, ForecastError> {
        Self::new(ForecastConfig::default())
    }

    /// Forecaster configuration.
    pub const fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// The ordered walk-forward steps for `series` and `train_end`.
    pub fn plan(
        &self,
        series: &[AggregateReturnPoint],
        train_end: NaiveDate,
    ) -> Result<Vec<ForecastStep>, ForecastError> {
        let series = Series::new(series)?;
        Ok(self
            .spans(&series, train_end)?
            .into_iter()
            .map(|span| span.step)
            .collect())
    }

    /// Run the walk-forward forecast.
    ///
    /// # Errors
    /// * [`ForecastError::EmptySeries`] for an empty series.
    /// * [`ForecastError::InsufficientData`] if there is no test data or the
    ///   last training month cannot seed the lagged volatility.
    ///
    /// Per-step fit failures do not error; they are recorded as
    /// [`ForecastStatus::Failed`] months.
    pub fn forecast(
        &self,
        series: &[AggregateReturnPoint],
        train_end: NaiveDate,
    ) -> Result<VolatilityTable, ForecastError> {
        self.forecast_with(series, train_end, |_, _| {})
    }

    /// Like [`forecast`](Self::forecast), calling `on_step` with each finished
    /// step and the total step count. Steps may finish out of order when the
    /// forecast runs in parallel.
    pub fn forecast_with<F>(
        &self,
        series: &[AggregateReturnPoint],
        train_end: NaiveDate,
        on_step: F,
    ) -> Result<VolatilityTable, ForecastError>
    where
        F: Fn(&ForecastStep, usize) + Sync,
    {
        let series = Series::new(series)?;
        let spans = self.spans(&series, train_end)?;
        let first_test = spans
            .iter()
            .find_map(|span| span.step.origin.map(|_| span.test.start))
            .ok_or_else(|| ForecastError::InsufficientData("no test observations".to_string()))?;

        let seed = self.lag_seed(&series, first_test)?;
        let realized: Vec<Option<f64>> = spans
            .iter()
            .map(|span| self.realized(&series.slice(span.test.clone())))
            .collect();

        let total = spans.len();
        let run_step = |span: &MonthSpan| {
            let outcome = self.run_step(&series, span);
            on_step(&span.step, total);
            outcome
        };
        let outcomes: Vec<StepOutcome> = if self.config.parallel {
            spans.par_iter().map(run_step).collect()
        } else {
            spans.iter().map(run_step).collect()
        };

        let records: Vec<VolatilityRecord> = spans
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(i, (span, outcome))| {
                let lagged = if i == 0 { Some(seed) } else { realized[i - 1] };
                VolatilityRecord {
                    month: span.step.month,
                    forecast_volatility: outcome.forecast,
                    realized_volatility: realized[i],
                    lagged_realized_volatility: lagged,
                    forecast_status: outcome.status,
                    failure_reason: outcome.reason,
                }
            })
            .collect();

        let table = VolatilityTable {
            records,
            steps: spans.iter().map(|span| span.step).collect(),
        };
        info!(
            months = table.len(),
            forecasts = table.forecast_count(),
            failed = table.failed_months().len(),
            "Volatility forecast finished"
        );
        Ok(table)
    }

    /// One span per calendar month from the first to the last test point.
    fn spans(
        &self,
        series: &Series,
        train_end: NaiveDate,
    ) -> Result<Vec<MonthSpan>, ForecastError> {
        if let Some(test_end) = self.config.test_end
            && test_end <= train_end
        {
            return Err(ForecastError::InvalidConfig(format!(
                "test_end {test_end} must be after train_end {train_end}"
            )));
        }

        let start = series.dates.partition_point(|d| *d < train_end);
        let end = match self.config.test_end {
            Some(test_end) => series.dates.partition_point(|d| *d < test_end),
            None => series.dates.len(),
        };
        if start >= end {
            return Err(ForecastError::InsufficientData(format!(
                "no observations on or after {train_end}"
            )));
        }

        let first_month = month_start(series.dates[start]);
        let last_month = month_start(series.dates[end - 1]);
        let mut spans = Vec::new();
        let mut month = first_month;
        let mut cursor = start;

        while month <= last_month {
            let next = shift_months(month, 1).ok_or_else(|| {
                ForecastError::InsufficientData(format!("month after {month} out of range"))
            })?;
            let month_end = cursor + series.dates[cursor..end].partition_point(|d| *d < next);
            let origin = (month_end > cursor).then(|| series.dates[cursor]);
            spans.push(MonthSpan {
                step: ForecastStep {
                    month,
                    origin,
                    training_len: cursor,
                },
                test: cursor..month_end,
            });
            cursor = month_end;
            month = next;
        }

        Ok(spans)
    }

    /// Realized volatility of the last calendar month before `first_test`.
    fn lag_seed(&self, series: &Series, first_test: usize) -> Result<f64, ForecastError> {
        let Some(last_training) = first_test.checked_sub(1) else {
            return Err(ForecastError::InsufficientData(
                "no training observations to seed lagged volatility".to_string(),
            ));
        };
        let seed_month = month_start(series.dates[last_training]);
        let seed_start = series.dates[..first_test].partition_point(|d| *d < seed_month);

        self.realized(&series.slice(seed_start..first_test))
            .ok_or_else(|| {
                ForecastError::InsufficientData(format!(
                    "training month {seed_month} has fewer than two observations"
                ))
            })
    }

    /// Sample std of `returns` scaled to a month; `None` below two points.
    fn realized(&self, returns: &[f64]) -> Option<f64> {
        sample_std(returns).map(|std| std * (self.config.trading_days_per_month as f64).sqrt())
    }

    fn run_step(&self, series: &Series, span: &MonthSpan) -> StepOutcome {
        let step = span.step;
        if step.origin.is_none() {
            return StepOutcome::failed("no observations".to_string());
        }

        let scale = self.config.return_scale;
        let training = series
            .returns
            .slice(s![..step.training_len])
            .mapv(|r| r * scale);

        match self.model.fit(training.view()) {
            Ok(fit) => {
                let forecast = fit.forecast_volatility(self.config.horizon_days) / scale;
                debug!(
                    month = %step.month,
                    training = step.training_len,
                    alpha = fit.alpha,
                    beta = fit.beta,
                    forecast,
                    "Fitted forecast step"
                );
                StepOutcome {
                    forecast: Some(forecast),
                    status: if fit.degenerate {
                        ForecastStatus::Degenerate
                    } else {
                        ForecastStatus::Fitted
                    },
                    reason: None,
                }
            }
            Err(error) => {
                warn!(month = %step.month, %error, "Forecast step failed");
                StepOutcome::failed(error.to_string())
            }
        }
    }
}

/// Result of one forecast step.
#[derive(Debug, Clone)]
struct StepOutcome {
    forecast: Option<f64>,
    status: ForecastStatus,
    reason: Option<String>,
}

impl StepOutcome {
    const fn failed(reason: String) -> Self {
        Self {
            forecast: None,
            status: ForecastStatus::Failed,
            reason: Some(reason),
        }
    }
}
