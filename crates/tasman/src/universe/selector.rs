//! Monthly universe construction.
//!
//! For each formation month the selector runs the survivorship filter
//! pipeline, ranks the survivors by market cap, keeps the top `target_size`
//! and carries them into the holding month. Entities missing from the panel
//! in the holding month are bridged with a zero-return placeholder so the
//! held universe does not silently shrink.

use super::UniverseError;
use super::filters::{
    ActivityFilter, CandidateFilter, CandidateSet, ContinuityFilter, FilterContext,
    FilterPipeline, LongevityFilter, SizeFilter,
};
use super::{Membership, PeriodFailure, Universe, UniverseRun};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tasman_data::month::month_start;
use tasman_data::{EntityId, Frequency, MembershipRecord, SecurityObservation, SecurityPanel};
use tracing::{debug, info, warn};

/// Configuration for universe selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Maximum number of admitted entities per formation month (default: 600)
    pub target_size: usize,

    /// Months of history required before formation (default: 12)
    pub lookback_months: u32,

    /// Minimum observations in the lookback window, formation month included (default: 8)
    pub min_window_observations: usize,

    /// Minimum observations in the window with a nonzero return (default: 4)
    pub min_nonzero_returns: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            target_size: 600,
            lookback_months: 12,
            min_window_observations: 8,
            min_nonzero_returns: 4,
        }
    }
}

/// Point-in-time universe selector.
#[derive(Debug)]
pub struct UniverseSelector {
    config: UniverseConfig,
    pipeline: FilterPipeline,
}

impl UniverseSelector {
    /// Create a selector with the standard filter pipeline.
    pub fn new(config: UniverseConfig) -> Result<Self, UniverseError> {
        if config.target_size == 0 {
            return Err(UniverseError::InvalidParameter(
                "target_size must be at least 1".to_string(),
            ));
        }
        if config.lookback_months == 0 {
            return Err(UniverseError::InvalidParameter(
                "lookback_months must be at least 1".to_string(),
            ));
        }

        let filters: Vec<Box<dyn CandidateFilter>> = vec![
            Box::new(SizeFilter),
            Box::new(ContinuityFilter),
            Box::new(LongevityFilter {
                lookback_months: config.lookback_months,
            }),
            Box::new(ActivityFilter {
                lookback_months: config.lookback_months,
                min_observations: config.min_window_observations,
                min_nonzero_returns: config.min_nonzero_returns,
            }),
        ];

        Ok(Self {
            config,
            pipeline: FilterPipeline::new(filters),
        })
    }

    /// Create a selector with default configuration.
    ///
    /// # Errors
    /// Returns an error if the default configuration is invalid (should not happen).
    pub fn try_default() -> Result<Self, UniverseError> {
        Self::new(UniverseConfig::default())
    }

    /// Selector configuration.
    pub const fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// Entities passing every filter at `formation_month`, in natural order.
    pub fn eligible(
        &self,
        panel: &SecurityPanel,
        formation_month: NaiveDate,
    ) -> Result<CandidateSet, UniverseError> {
        let formation_month = Self::check_formation(panel, formation_month)?;
        let ctx = FilterContext::new(panel, formation_month);
        let initial: CandidateSet = panel
            .rows_on(formation_month)
            .map(|obs| obs.entity_id.clone())
            .collect();

        let (survivors, stages) = self.pipeline.run(&ctx, initial)?;
        debug!(
            month = %formation_month,
            stages = ?stages,
            survivors = survivors.len(),
            "Applied survivorship filters"
        );
        Ok(survivors)
    }

    /// Select the universe formed at `formation_month` and held the month after.
    ///
    /// Returns one record per admitted entity, ordered by market cap rank.
    ///
    /// # Errors
    /// * [`UniverseError::InsufficientData`] if the panel has no observation at
    ///   the formation month.
    /// * [`UniverseError::ConflictingAttributes`] if a selected entity has
    ///   formation-month rows that disagree on static attributes.
    pub fn select(
        &self,
        panel: &SecurityPanel,
        formation_month: NaiveDate,
    ) -> Result<Vec<MembershipRecord>, UniverseError> {
        let formation_month = Self::check_formation(panel, formation_month)?;
        let holding_month = FilterContext::new(panel, formation_month).offset(1)?;
        let eligible = self.eligible(panel, formation_month)?;

        let mut ranked: Vec<(&EntityId, f64)> = eligible
            .iter()
            .map(|entity| {
                let market_cap = panel
                    .at(entity, formation_month)
                    .iter()
                    .find_map(|obs| obs.market_cap)
                    .unwrap_or(f64::NEG_INFINITY);
                (entity, market_cap)
            })
            .collect();

        // Stable sort keeps natural entity order among equal caps.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.config.target_size);

        // Only admitted entities need consistent formation rows.
        let ranked = ranked
            .into_iter()
            .map(|(entity, market_cap)| {
                formation_template(panel.at(entity, formation_month))
                    .map(|template| (template, market_cap))
                    .ok_or_else(|| UniverseError::ConflictingAttributes {
                        entity: entity.clone(),
                        month: formation_month,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let records: Vec<MembershipRecord> = ranked
            .iter()
            .enumerate()
            .map(|(i, (formation, _))| {
                let rank = i + 1;
                let held = panel.at(&formation.entity_id, holding_month);
                let native = held
                    .iter()
                    .find(|obs| obs.label == formation.label)
                    .or_else(|| held.first());
                match native {
                    Some(obs) => {
                        MembershipRecord::native(obs, formation_month, holding_month, rank)
                    }
                    None => MembershipRecord::bridged(formation, holding_month, rank),
                }
            })
            .collect();

        debug!(
            formation = %formation_month,
            holding = %holding_month,
            eligible = eligible.len(),
            admitted = Membership(&records).size(),
            bridged = records.iter().filter(|r| r.is_bridged).count(),
            "Selected universe"
        );

        Ok(records)
    }

    /// Run [`select`](Self::select) for every formation month in the panel.
    ///
    /// Months whose holding month lies past the panel's last month are
    /// skipped. A failing month is recorded and does not stop the others.
    pub fn select_all(&self, panel: &SecurityPanel) -> UniverseRun {
        self.select_all_with(panel, |_| {})
    }

    /// Like [`select_all`](Self::select_all), calling `on_month` after each
    /// formation month is processed.
    pub fn select_all_with<F>(&self, panel: &SecurityPanel, mut on_month: F) -> UniverseRun
    where
        F: FnMut(NaiveDate),
    {
        let mut run = UniverseRun::default();
        let Some(last) = panel.last_date() else {
            return run;
        };

        for formation_month in panel.dates() {
            let holding_month = match FilterContext::new(panel, formation_month).offset(1) {
                Ok(month) => month,
                Err(error) => {
                    run.failures.push(PeriodFailure {
                        formation_month,
                        error,
                    });
                    continue;
                }
            };
            if holding_month > last {
                continue;
            }

            match self.select(panel, formation_month) {
                Ok(records) => {
                    run.memberships.insert(formation_month, records);
                }
                Err(error) => {
                    warn!(month = %formation_month, %error, "Formation month failed");
                    run.failures.push(PeriodFailure {
                        formation_month,
                        error,
                    });
                }
            }
            on_month(formation_month);
        }

        info!(
            months = run.memberships.len(),
            failed = run.failures.len(),
            records = run.record_count(),
            bridged = run.bridged_count(),
            "Universe construction finished"
        );
        run
    }

    fn check_formation(
        panel: &SecurityPanel,
        formation_month: NaiveDate,
    ) -> Result<NaiveDate, UniverseError> {
        if panel.frequency() != Frequency::Monthly {
            return Err(UniverseError::UnsupportedFrequency(panel.frequency()));
        }
        let formation_month = month_start(formation_month);
        if panel.count_on(formation_month) == 0 {
            return Err(UniverseError::InsufficientData {
                month: formation_month,
            });
        }
        Ok(formation_month)
    }
}

/// First formation-month row, provided every row agrees with it.
fn formation_template(rows: &[SecurityObservation]) -> Option<&SecurityObservation> {
    let first = rows.first()?;
    rows.iter()
        .all(|obs| obs.same_static_attributes(first))
        .then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasman_data::month::shift_months;
    use tasman_data::{EntityId, RawObservation};

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    /// `months` monthly rows from 2020-01 with steadily rising prices.
    fn listing(id: &str, months: usize, shares: f64) -> Vec<RawObservation> {
        (0..months)
            .map(|i| {
                let date = shift_months(month(2020, 1), i as i32).unwrap();
                RawObservation::new(id, date, id, 10.0 + i as f64, shares, 1.0)
            })
            .collect()
    }

    fn selector(target_size: usize) -> UniverseSelector {
        UniverseSelector::new(UniverseConfig {
            target_size,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = UniverseConfig::default();
        assert_eq!(config.target_size, 600);
        assert_eq!(config.lookback_months, 12);
        assert_eq!(config.min_window_observations, 8);
        assert_eq!(config.min_nonzero_returns, 4);
    }

    #[test]
    fn test_zero_target_size_rejected() {
        assert!(UniverseSelector::new(UniverseConfig {
            target_size: 0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_top_n_by_market_cap() {
        let mut rows = listing("A", 14, 100.0);
        rows.extend(listing("B", 14, 300.0));
        rows.extend(listing("C", 14, 200.0));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);

        let records = selector(2).select(&panel, month(2021, 1)).unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(records[0].market_cap_rank, 1);
        assert_eq!(records[1].market_cap_rank, 2);
        assert!(records.iter().all(|r| r.holding_month == month(2021, 2)));
        assert!(records.iter().all(|r| !r.is_bridged));
    }

    #[test]
    fn test_ties_follow_entity_order() {
        let mut rows = listing("Z", 14, 100.0);
        rows.extend(listing("M", 14, 100.0));
        rows.extend(listing("A", 14, 100.0));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);

        let records = selector(2).select(&panel, month(2021, 1)).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "M"]);
    }

    #[test]
    fn test_empty_formation_month_is_insufficient_data() {
        let panel = SecurityPanel::from_raw(listing("A", 3, 1.0), Frequency::Monthly);
        let err = selector(10).select(&panel, month(2025, 1)).unwrap_err();
        assert_eq!(
            err,
            UniverseError::InsufficientData {
                month: month(2025, 1)
            }
        );
    }

    #[test]
    fn test_no_survivors_is_not_an_error() {
        // Only three months of history: the longevity filter rejects everyone.
        let panel = SecurityPanel::from_raw(listing("A", 3, 1.0), Frequency::Monthly);
        let records = selector(10).select(&panel, month(2020, 3)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_conflicting_formation_rows_fail_the_month() {
        let mut rows = listing("A", 14, 100.0);
        rows.push(RawObservation::new("A", month(2021, 1), "A2", 99.0, 100.0, 1.0));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);

        let err = selector(5).select(&panel, month(2021, 1)).unwrap_err();
        assert!(matches!(
            err,
            UniverseError::ConflictingAttributes { ref entity, .. } if entity == &EntityId::from("A")
        ));
    }

    #[test]
    fn test_conflicts_outside_target_size_are_ignored() {
        let mut rows = listing("A", 14, 1_000.0);
        rows.extend(listing("B", 14, 100.0));
        rows.push(RawObservation::new("B", month(2021, 1), "B2", 99.0, 100.0, 1.0));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);

        let records = selector(1).select(&panel, month(2021, 1)).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["A"]);
    }

    #[test]
    fn test_daily_panel_rejected() {
        let panel = SecurityPanel::from_raw(listing("A", 3, 1.0), Frequency::Daily);
        assert!(matches!(
            selector(1).select(&panel, month(2020, 3)),
            Err(UniverseError::UnsupportedFrequency(Frequency::Daily))
        ));
    }

    #[test]
    fn test_select_all_isolates_failures() {
        let mut rows = listing("A", 16, 100.0);
        rows.extend(listing("B", 16, 50.0));
        // Conflicting duplicate listing for B only in 2021-02.
        rows.push(RawObservation::new("B", month(2021, 2), "B-old", 1.0, 1.0, 1.0));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);

        let mut seen = Vec::new();
        let run = selector(5).select_all_with(&panel, |m| seen.push(m));

        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].formation_month, month(2021, 2));
        // 2021-01 and 2021-03 are the eligible months; 2021-04 has no holding month.
        assert_eq!(run.held_in(month(2021, 2)).map(|held| held.size()), Some(2));
        assert_eq!(run.held_in(month(2021, 4)).map(|held| held.size()), Some(2));
        assert!(!run.memberships.contains_key(&month(2021, 4)));
        assert_eq!(seen.len(), 15);
    }
}
