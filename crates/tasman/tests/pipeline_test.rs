//! End-to-end: monthly universe, daily aggregate index, volatility forecast.

use approx::assert_relative_eq;
use chrono::{Datelike, NaiveDate};
use tasman::data::month::shift_months;
use tasman::data::{Frequency, RawObservation, SecurityPanel};
use tasman::risk::{
    AggregateReturnBuilder, EntityVolatilityBuilder, ForecastConfig, ForecastStatus,
    VolatilityForecaster,
};
use tasman::{UniverseConfig, UniverseSelector};

const ENTITIES: [(&str, f64); 4] = [
    ("A", 4_000.0),
    ("B", 3_000.0),
    ("C", 2_000.0),
    ("D", 1_000.0),
];

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()
}

/// Deterministic pseudo-random price move in [-2%, 2%].
fn wiggle(seed: usize) -> f64 {
    let x = (seed.wrapping_mul(2_654_435_761) % 1_000) as f64 / 1_000.0;
    0.04 * x - 0.02
}

/// Weekday prices for every entity over 30 months from 2019-01.
fn daily_rows() -> Vec<RawObservation> {
    let end = shift_months(start(), 30).unwrap();
    let mut rows = Vec::new();
    for (k, (id, shares)) in ENTITIES.iter().enumerate() {
        let mut price = 50.0 + 10.0 * k as f64;
        let mut date = start();
        let mut t = 0;
        while date < end {
            if date.weekday().number_from_monday() <= 5 {
                price *= 1.0 + wiggle(t * 7 + k * 13 + 1);
                rows.push(RawObservation::new(*id, date, *id, price, *shares, 1.0));
                t += 1;
            }
            date = date.succ_opt().unwrap();
        }
    }
    rows
}

/// Month-end snapshot of the daily rows.
fn monthly_rows(daily: &[RawObservation]) -> Vec<RawObservation> {
    let mut rows: Vec<RawObservation> = Vec::new();
    for row in daily {
        match rows.last_mut() {
            Some(last)
                if last.entity_id == row.entity_id
                    && last.date.year() == row.date.year()
                    && last.date.month() == row.date.month() =>
            {
                *last = row.clone();
            }
            _ => rows.push(row.clone()),
        }
    }
    rows
}

#[test]
fn test_universe_to_volatility() {
    let daily_raw = daily_rows();
    let monthly = SecurityPanel::from_raw(monthly_rows(&daily_raw), Frequency::Monthly);
    let daily = SecurityPanel::from_raw(daily_raw, Frequency::Daily);

    let selector = UniverseSelector::new(UniverseConfig {
        target_size: 3,
        ..Default::default()
    })
    .unwrap();
    let run = selector.select_all(&monthly);
    assert!(run.is_complete());
    let membership = run.records();
    assert!(!membership.is_empty());
    for records in run.memberships.values() {
        assert!(records.len() <= 3);
    }

    let builder = AggregateReturnBuilder::new();
    let index = builder.aggregate(&daily, &membership);
    assert!(index.ambiguous.is_empty());
    // Universe holdings start in 2020-02 (12 months of history plus the holding lag).
    assert_eq!(index.points[0].date.year(), 2020);
    for weights in builder.weights(&daily, &membership).values() {
        assert_relative_eq!(weights.values().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    let train_end = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let sequential = VolatilityForecaster::new(ForecastConfig {
        parallel: false,
        min_training_observations: 60,
        ..Default::default()
    })
    .unwrap()
    .forecast(&index.points, train_end)
    .unwrap();
    let parallel = VolatilityForecaster::new(ForecastConfig {
        parallel: true,
        min_training_observations: 60,
        ..Default::default()
    })
    .unwrap()
    .forecast(&index.points, train_end)
    .unwrap();

    assert_eq!(sequential, parallel);
    assert_eq!(sequential.len(), 6);
    for pair in sequential.records.windows(2) {
        assert_eq!(pair[1].lagged_realized_volatility, pair[0].realized_volatility);
    }
    for record in &sequential.records {
        assert!(record.realized_volatility.is_some());
        if record.forecast_status != ForecastStatus::Failed {
            assert!(record.forecast_volatility.unwrap() >= 0.0);
        }
    }

    let entity_vol = EntityVolatilityBuilder::default().monthly(&daily, &membership);
    assert_eq!(entity_vol.records.len(), membership.len());
}
