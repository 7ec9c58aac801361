//! Run summaries for terminal display.
//!
//! A [`RunSummary`] collects headline numbers from each stage of a run:
//! universe coverage, the aggregate index and the volatility forecast.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tasman_data::MembershipRecord;
use tasman_risk::{AggregateSeries, ForecastStatus, VolatilityTable, stats};

/// Universe coverage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseSummary {
    /// Holding months with at least one member.
    pub holding_months: usize,
    /// First holding month.
    pub first_month: Option<NaiveDate>,
    /// Last holding month.
    pub last_month: Option<NaiveDate>,
    /// Membership rows.
    pub records: usize,
    /// Distinct entities ever held.
    pub distinct_entities: usize,
    /// Rows carried forward from the formation month.
    pub bridged_records: usize,
    /// Mean members per holding month.
    pub mean_size: f64,
    /// Formation months that failed.
    pub failed_months: Vec<NaiveDate>,
}

impl UniverseSummary {
    /// Summarise a membership table.
    pub fn from_records(records: &[MembershipRecord], failed_months: Vec<NaiveDate>) -> Self {
        let months: BTreeSet<NaiveDate> = records.iter().map(|r| r.holding_month).collect();
        let entities: BTreeSet<&str> = records.iter().map(|r| r.entity_id.as_str()).collect();
        let mean_size = if months.is_empty() {
            0.0
        } else {
            records.len() as f64 / months.len() as f64
        };

        Self {
            holding_months: months.len(),
            first_month: months.first().copied(),
            last_month: months.last().copied(),
            records: records.len(),
            distinct_entities: entities.len(),
            bridged_records: records.iter().filter(|r| r.is_bridged).count(),
            mean_size,
            failed_months,
        }
    }
}

/// Aggregate index statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Index dates.
    pub days: usize,
    /// First index date.
    pub first_date: Option<NaiveDate>,
    /// Last index date.
    pub last_date: Option<NaiveDate>,
    /// Mean daily return.
    pub mean_return: f64,
    /// Sample standard deviation of daily returns.
    pub volatility: f64,
    /// Compounded return over the whole series.
    pub cumulative_return: f64,
    /// Ambiguous (entity, date) pairs excluded.
    pub ambiguous: usize,
}

impl IndexSummary {
    /// Summarise an aggregate return series.
    pub fn from_series(series: &AggregateSeries) -> Self {
        let returns = series.returns();
        let n = returns.len();
        let mean_return = stats::mean(&returns).unwrap_or(0.0);
        let volatility = stats::sample_std(&returns).unwrap_or(0.0);
        let cumulative_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;

        Self {
            days: n,
            first_date: series.points.first().map(|p| p.date),
            last_date: series.points.last().map(|p| p.date),
            mean_return,
            volatility,
            cumulative_return,
            ambiguous: series.ambiguous.len(),
        }
    }
}

/// Forecast accuracy over the test months.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySummary {
    /// Test months.
    pub months: usize,
    /// Months with a GARCH fit.
    pub fitted: usize,
    /// Months where the fit collapsed to constant variance.
    pub degenerate: usize,
    /// Months with no forecast.
    pub failed: usize,
    /// Mean forecast − realized over months with both values.
    pub mean_error: Option<f64>,
    /// Root mean squared forecast error.
    pub rmse: Option<f64>,
    /// Root mean squared error of the lagged realized benchmark.
    pub lagged_rmse: Option<f64>,
}

impl VolatilitySummary {
    /// Summarise a volatility table.
    pub fn from_table(table: &VolatilityTable) -> Self {
        let count = |status: ForecastStatus| {
            table
                .records
                .iter()
                .filter(|r| r.forecast_status == status)
                .count()
        };

        let forecast_errors: Vec<f64> = table
            .records
            .iter()
            .filter_map(|r| Some(r.forecast_volatility? - r.realized_volatility?))
            .collect();
        let lagged_errors: Vec<f64> = table
            .records
            .iter()
            .filter_map(|r| Some(r.lagged_realized_volatility? - r.realized_volatility?))
            .collect();

        Self {
            months: table.len(),
            fitted: count(ForecastStatus::Fitted),
            degenerate: count(ForecastStatus::Degenerate),
            failed: count(ForecastStatus::Failed),
            mean_error: stats::mean(&forecast_errors),
            rmse: root_mean_square(&forecast_errors),
            lagged_rmse: root_mean_square(&lagged_errors),
        }
    }
}

fn root_mean_square(values: &[f64]) -> Option<f64> {
    (!values.is_empty())
        .then(|| (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt())
}

/// Headline numbers for a pipeline run. Stages that were not run are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Universe stage.
    pub universe: Option<UniverseSummary>,
    /// Aggregate index stage.
    pub index: Option<IndexSummary>,
    /// Volatility stage.
    pub volatility: Option<VolatilitySummary>,
}

impl RunSummary {
    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str("\nRun Summary\n");
        output.push_str(&"=".repeat(80));
        output.push('\n');

        if let Some(universe) = &self.universe {
            output.push_str("\nUniverse:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!(
                "  Holding Months:           {} ({} to {})\n",
                universe.holding_months,
                fmt_date(universe.first_month),
                fmt_date(universe.last_month)
            ));
            output.push_str(&format!(
                "  Membership Rows:          {} ({} bridged)\n",
                universe.records, universe.bridged_records
            ));
            output.push_str(&format!(
                "  Distinct Entities:        {}\n",
                universe.distinct_entities
            ));
            output.push_str(&format!(
                "  Mean Size:                {:.1}\n",
                universe.mean_size
            ));
            if !universe.failed_months.is_empty() {
                let months: Vec<String> = universe
                    .failed_months
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                output.push_str(&format!(
                    "  Failed Formations:        {}\n",
                    months.join(", ")
                ));
            }
        }

        if let Some(index) = &self.index {
            output.push_str("\nAggregate Index:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!(
                "  Days:                     {} ({} to {})\n",
                index.days,
                fmt_date(index.first_date),
                fmt_date(index.last_date)
            ));
            output.push_str(&format!(
                "  Mean Daily Return:        {:.4}%\n",
                index.mean_return * 100.0
            ));
            output.push_str(&format!(
                "  Daily Volatility:         {:.4}%\n",
                index.volatility * 100.0
            ));
            output.push_str(&format!(
                "  Cumulative Return:        {:.2}%\n",
                index.cumulative_return * 100.0
            ));
            if index.ambiguous > 0 {
                output.push_str(&format!(
                    "  Ambiguous Rows Excluded:  {}\n",
                    index.ambiguous
                ));
            }
        }

        if let Some(vol) = &self.volatility {
            output.push_str("\nVolatility Forecast:\n");
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!(
                "{:<20} {:>12} {:>12} {:>12} {:>12}\n",
                "Months", "Fitted", "Degenerate", "Failed", "RMSE"
            ));
            output.push_str(&format!(
                "{:<20} {:>12} {:>12} {:>12} {:>12}\n",
                vol.months,
                vol.fitted,
                vol.degenerate,
                vol.failed,
                fmt_pct(vol.rmse)
            ));
            output.push_str(&format!(
                "  Mean Forecast Error:      {}\n",
                fmt_pct(vol.mean_error)
            ));
            output.push_str(&format!(
                "  Lagged Realized RMSE:     {}\n",
                fmt_pct(vol.lagged_rmse)
            ));
        }

        output.push_str(&"=".repeat(80));
        output.push('\n');

        output
    }
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}%", v * 100.0))
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(universe) = &self.universe {
            writeln!(
                f,
                "Universe: {} months, {} rows, {} entities",
                universe.holding_months, universe.records, universe.distinct_entities
            )?;
        }
        if let Some(index) = &self.index {
            writeln!(
                f,
                "Index: {} days, cumulative {:.2}%",
                index.days,
                index.cumulative_return * 100.0
            )?;
        }
        if let Some(vol) = &self.volatility {
            writeln!(
                f,
                "Volatility: {} months, {} failed, RMSE {}",
                vol.months,
                vol.failed,
                fmt_pct(vol.rmse)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tasman_data::{RawObservation, SecurityObservation};
    use tasman_risk::{AggregateReturnPoint, VolatilityRecord};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(id: &str, holding: NaiveDate, bridged: bool) -> MembershipRecord {
        let obs = SecurityObservation::from_raw(
            RawObservation::new(id, holding, id, 10.0, 1.0, 1.0),
            holding,
        );
        if bridged {
            MembershipRecord::bridged(&obs, holding, 1)
        } else {
            MembershipRecord::native(&obs, d(2020, 12, 1), holding, 1)
        }
    }

    #[test]
    fn test_universe_summary() {
        let records = vec![
            record("A", d(2021, 1, 1), false),
            record("B", d(2021, 1, 1), false),
            record("A", d(2021, 2, 1), true),
        ];
        let summary = UniverseSummary::from_records(&records, vec![d(2021, 2, 1)]);

        assert_eq!(summary.holding_months, 2);
        assert_eq!(summary.distinct_entities, 2);
        assert_eq!(summary.bridged_records, 1);
        assert_eq!(summary.first_month, Some(d(2021, 1, 1)));
        assert_relative_eq!(summary.mean_size, 1.5);
    }

    #[test]
    fn test_index_summary() {
        let point = |day, r| AggregateReturnPoint {
            date: d(2021, 1, day),
            value_weighted_return: r,
            constituents: 2,
        };
        let series = AggregateSeries {
            points: vec![point(4, 0.1), point(5, -0.1)],
            ambiguous: vec![],
        };
        let summary = IndexSummary::from_series(&series);

        assert_eq!(summary.days, 2);
        assert_relative_eq!(summary.mean_return, 0.0);
        assert_relative_eq!(summary.cumulative_return, -0.01, epsilon = 1e-12);
        assert_relative_eq!(summary.volatility, 0.02f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_index_summary_of_short_series() {
        let empty = IndexSummary::from_series(&AggregateSeries::default());
        assert_eq!(empty.days, 0);
        assert_relative_eq!(empty.mean_return, 0.0);
        assert_relative_eq!(empty.volatility, 0.0);

        let series = AggregateSeries {
            points: vec![AggregateReturnPoint {
                date: d(2021, 1, 4),
                value_weighted_return: 0.05,
                constituents: 1,
            }],
            ambiguous: vec![],
        };
        let single = IndexSummary::from_series(&series);
        assert_relative_eq!(single.mean_return, 0.05);
        assert_relative_eq!(single.volatility, 0.0);
    }

    #[test]
    fn test_volatility_summary_skips_missing_values() {
        let table = VolatilityTable {
            records: vec![
                VolatilityRecord {
                    month: d(2021, 1, 1),
                    forecast_volatility: Some(0.06),
                    realized_volatility: Some(0.05),
                    lagged_realized_volatility: Some(0.02),
                    forecast_status: ForecastStatus::Fitted,
                    failure_reason: None,
                },
                VolatilityRecord {
                    month: d(2021, 2, 1),
                    forecast_volatility: None,
                    realized_volatility: Some(0.05),
                    lagged_realized_volatility: Some(0.05),
                    forecast_status: ForecastStatus::Failed,
                    failure_reason: Some("no fit".to_string()),
                },
            ],
            steps: vec![],
        };
        let summary = VolatilitySummary::from_table(&table);

        assert_eq!(summary.months, 2);
        assert_eq!(summary.fitted, 1);
        assert_eq!(summary.failed, 1);
        assert_relative_eq!(summary.rmse.unwrap(), 0.01, epsilon = 1e-12);
        assert_relative_eq!(summary.mean_error.unwrap(), 0.01, epsilon = 1e-12);
        // sqrt((0.03^2 + 0) / 2)
        assert_relative_eq!(
            summary.lagged_rmse.unwrap(),
            (0.0009f64 / 2.0).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_ascii_table_only_shows_run_stages() {
        let summary = RunSummary {
            universe: Some(UniverseSummary::default()),
            index: None,
            volatility: None,
        };
        let table = summary.to_ascii_table();
        assert!(table.contains("Universe:"));
        assert!(!table.contains("Aggregate Index:"));
        assert!(!table.contains("Volatility Forecast:"));
    }
}
