//! Polars `DataFrame` views of the output tables.
//!
//! Dates become `Date` columns and missing values become nulls, so the
//! frames can be joined with other monthly panels downstream.

use polars::prelude::*;
use tasman_data::MembershipRecord;
use tasman_risk::{AggregateSeries, EntityVolatilityTable, ForecastStatus, VolatilityTable};

/// Membership table, one row per held (entity, month).
pub fn membership_frame(records: &[MembershipRecord]) -> PolarsResult<DataFrame> {
    let entity_ids: Vec<&str> = records.iter().map(|r| r.entity_id.as_str()).collect();
    let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
    let formation: Vec<chrono::NaiveDate> = records.iter().map(|r| r.formation_month).collect();
    let holding: Vec<chrono::NaiveDate> = records.iter().map(|r| r.holding_month).collect();
    let ranks: Vec<u64> = records.iter().map(|r| r.market_cap_rank as u64).collect();
    let bridged: Vec<bool> = records.iter().map(|r| r.is_bridged).collect();
    let caps: Vec<Option<f64>> = records.iter().map(|r| r.market_cap).collect();
    let prices: Vec<Option<f64>> = records.iter().map(|r| r.adjusted_price).collect();
    let returns: Vec<Option<f64>> = records.iter().map(|r| r.ret).collect();
    let lagged: Vec<Option<f64>> = records.iter().map(|r| r.lagged_return).collect();
    let sectors: Vec<Option<u32>> = records.iter().map(|r| r.sector_code).collect();

    DataFrame::new(vec![
        Series::new("entity_id".into(), entity_ids).into(),
        Series::new("label".into(), labels).into(),
        Series::new("formation_month".into(), formation).into(),
        Series::new("date".into(), holding).into(),
        Series::new("market_cap_rank".into(), ranks).into(),
        Series::new("is_bridged".into(), bridged).into(),
        Series::new("market_cap".into(), caps).into(),
        Series::new("adjusted_price".into(), prices).into(),
        Series::new("return".into(), returns).into(),
        Series::new("lagged_return".into(), lagged).into(),
        Series::new("sector_code".into(), sectors).into(),
    ])
}

/// Aggregate return series.
pub fn aggregate_frame(series: &AggregateSeries) -> PolarsResult<DataFrame> {
    let dates: Vec<chrono::NaiveDate> = series.points.iter().map(|p| p.date).collect();
    let returns: Vec<f64> = series
        .points
        .iter()
        .map(|p| p.value_weighted_return)
        .collect();
    let constituents: Vec<u64> = series
        .points
        .iter()
        .map(|p| p.constituents as u64)
        .collect();

    DataFrame::new(vec![
        Series::new("date".into(), dates).into(),
        Series::new("value_weighted_return".into(), returns).into(),
        Series::new("constituents".into(), constituents).into(),
    ])
}

/// Monthly volatility table with a `forecast_error` column
/// (`forecast_volatility − realized_volatility`).
pub fn volatility_frame(table: &VolatilityTable) -> PolarsResult<DataFrame> {
    let months: Vec<chrono::NaiveDate> = table.records.iter().map(|r| r.month).collect();
    let forecast: Vec<Option<f64>> = table
        .records
        .iter()
        .map(|r| r.forecast_volatility)
        .collect();
    let realized: Vec<Option<f64>> = table
        .records
        .iter()
        .map(|r| r.realized_volatility)
        .collect();
    let lagged: Vec<Option<f64>> = table
        .records
        .iter()
        .map(|r| r.lagged_realized_volatility)
        .collect();
    let status: Vec<&str> = table
        .records
        .iter()
        .map(|r| status_name(r.forecast_status))
        .collect();

    let df = DataFrame::new(vec![
        Series::new("month".into(), months).into(),
        Series::new("forecast_volatility".into(), forecast).into(),
        Series::new("realized_volatility".into(), realized).into(),
        Series::new("lagged_realized_volatility".into(), lagged).into(),
        Series::new("forecast_status".into(), status).into(),
    ])?;

    df.lazy()
        .with_column(
            (col("forecast_volatility") - col("realized_volatility")).alias("forecast_error"),
        )
        .collect()
}

/// Per-entity monthly volatility.
pub fn entity_volatility_frame(table: &EntityVolatilityTable) -> PolarsResult<DataFrame> {
    let entity_ids: Vec<&str> = table
        .records
        .iter()
        .map(|r| r.entity_id.as_str())
        .collect();
    let months: Vec<chrono::NaiveDate> = table.records.iter().map(|r| r.month).collect();
    let vols: Vec<f64> = table.records.iter().map(|r| r.volatility).collect();
    let counts: Vec<u64> = table
        .records
        .iter()
        .map(|r| r.observations as u64)
        .collect();

    DataFrame::new(vec![
        Series::new("entity_id".into(), entity_ids).into(),
        Series::new("month".into(), months).into(),
        Series::new("volatility".into(), vols).into(),
        Series::new("observations".into(), counts).into(),
    ])
}

const fn status_name(status: ForecastStatus) -> &'static str {
    match status {
        ForecastStatus::Fitted => "fitted",
        ForecastStatus::Degenerate => "degenerate",
        ForecastStatus::Failed => "failed",
    }
}
