//! Integration tests for monthly universe construction.

use chrono::NaiveDate;
use rstest::rstest;
use std::collections::BTreeSet;
use tasman::data::month::shift_months;
use tasman::data::{EntityId, Frequency, RawObservation, SecurityPanel};
use tasman::universe::filters::{ActivityFilter, ContinuityFilter, LongevityFilter, SizeFilter};
use tasman::universe::{CandidateFilter, FilterContext, FilterPipeline, UniverseRun};
use tasman::{Universe, UniverseConfig, UniverseSelector};

fn month(index: i32) -> NaiveDate {
    shift_months(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), index).unwrap()
}

/// Monthly rows for months `0..len`, price drifting by `step` each month.
fn listing(id: &str, len: i32, start: f64, step: f64, shares: f64) -> Vec<RawObservation> {
    (0..len)
        .map(|i| {
            let price = start + step * f64::from(i) + if i % 2 == 0 { 0.0 } else { 0.3 };
            RawObservation::new(id, month(i), id, price, shares, 1.0)
        })
        .collect()
}

/// A, B and C listed for months 0..=12; C is delisted before month 13.
fn delisting_panel() -> SecurityPanel {
    let mut rows = listing("A", 14, 50.0, 1.0, 1_000.0);
    rows.extend(listing("B", 14, 30.0, 0.5, 1_000.0));
    rows.extend(listing("C", 13, 20.0, 0.2, 1_000.0));
    SecurityPanel::from_raw(rows, Frequency::Monthly)
}

#[test]
fn test_delisted_entity_is_bridged() {
    let panel = delisting_panel();
    let selector = UniverseSelector::try_default().unwrap();

    let records = selector.select(&panel, month(12)).unwrap();

    let ids: Vec<_> = records.iter().map(|r| r.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert!(records.iter().all(|r| r.holding_month == month(13)));

    let c = &records[2];
    assert!(c.is_bridged);
    assert_eq!(c.ret, Some(0.0));
    assert_eq!(c.label, "C");
    assert_eq!(c.market_cap, panel.at(&EntityId::from("C"), month(12))[0].market_cap);

    for record in &records[..2] {
        assert!(!record.is_bridged);
        let native = &panel.at(&record.entity_id, month(13))[0];
        assert_eq!(record.ret, native.ret);
        assert_eq!(record.market_cap, native.market_cap);
    }
}

#[test]
fn test_full_run_over_panel() {
    let panel = delisting_panel();
    let run: UniverseRun = UniverseSelector::try_default().unwrap().select_all(&panel);

    assert!(run.is_complete());
    // Formation months 0..=12; month 13 has no holding month in the panel.
    assert_eq!(run.memberships.len(), 13);
    assert_eq!(run.record_count(), 3);
    assert_eq!(run.bridged_count(), 1);
    assert_eq!(run.held_in(month(13)).map(|held| held.size()), Some(3));
    assert!(run.held_in(month(13)).unwrap().contains(&EntityId::from("C")));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(600)]
fn test_admitted_count_bounded_and_filtered(#[case] target_size: usize) {
    let panel = delisting_panel();
    let selector = UniverseSelector::new(UniverseConfig {
        target_size,
        ..Default::default()
    })
    .unwrap();

    let formation = month(12);
    let records = selector.select(&panel, formation).unwrap();
    assert!(records.len() <= target_size);

    // Every admitted entity passes the standalone filter pipeline.
    let filters: Vec<Box<dyn CandidateFilter>> = vec![
        Box::new(SizeFilter),
        Box::new(ContinuityFilter),
        Box::new(LongevityFilter { lookback_months: 12 }),
        Box::new(ActivityFilter {
            lookback_months: 12,
            min_observations: 8,
            min_nonzero_returns: 4,
        }),
    ];
    let pipeline = FilterPipeline::new(filters);
    let ctx = FilterContext::new(&panel, formation);
    let (survivors, _) = pipeline
        .run(&ctx, panel.entities().cloned().collect())
        .unwrap();
    let admitted: BTreeSet<EntityId> = records.iter().map(|r| r.entity_id.clone()).collect();
    assert!(admitted.is_subset(&survivors));

    let ranks: Vec<_> = records.iter().map(|r| r.market_cap_rank).collect();
    assert_eq!(ranks, (1..=records.len()).collect::<Vec<_>>());
}

#[test]
fn test_selection_is_idempotent() {
    let panel = delisting_panel();
    let selector = UniverseSelector::try_default().unwrap();

    let first = selector.select_all(&panel).records();
    let second = selector.select_all(&panel).records();
    assert_eq!(first, second);
}

#[test]
fn test_input_order_does_not_matter() {
    let mut rows = listing("A", 14, 50.0, 1.0, 1_000.0);
    rows.extend(listing("B", 14, 30.0, 0.5, 1_000.0));
    rows.extend(listing("C", 13, 20.0, 0.2, 1_000.0));
    let forward = SecurityPanel::from_raw(rows.clone(), Frequency::Monthly);
    rows.reverse();
    let reversed = SecurityPanel::from_raw(rows, Frequency::Monthly);

    let selector = UniverseSelector::try_default().unwrap();
    assert_eq!(
        selector.select(&forward, month(12)).unwrap(),
        selector.select(&reversed, month(12)).unwrap()
    );
}

#[test]
fn test_relabelled_entity_stays_eligible() {
    let mut rows: Vec<RawObservation> = listing("A", 15, 50.0, 1.0, 1_000.0)
        .into_iter()
        .enumerate()
        .map(|(i, mut obs)| {
            obs.label = if i < 12 { "OLD" } else { "NEW" }.to_string();
            obs
        })
        .collect();
    rows.extend(listing("B", 15, 30.0, 0.5, 1_000.0));
    let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);
    let a = EntityId::from("A");

    assert!(panel.at(&a, month(12))[0].ret.is_some());
    assert!(panel.at(&a, month(13))[0].lagged_return.is_some());

    let records = UniverseSelector::try_default()
        .unwrap()
        .select(&panel, month(13))
        .unwrap();
    let a_record = records.iter().find(|r| r.entity_id == a).unwrap();
    assert_eq!(a_record.label, "NEW");
    assert!(!a_record.is_bridged);
}
