//! Point-in-time survivorship filters.
//!
//! Each filter narrows a candidate set of entity ids and only ever sees the
//! survivors of the filters before it. The standard pipeline is:
//!
//! 1. [`SizeFilter`]: market cap present at the formation month.
//! 2. [`ContinuityFilter`]: returns present at the formation month and the
//!    month before.
//! 3. [`LongevityFilter`]: adjusted price present exactly `lookback` months
//!    before formation.
//! 4. [`ActivityFilter`]: enough observations, and enough nonzero returns,
//!    in the lookback window.

use super::UniverseError;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use tasman_data::month::shift_months;
use tasman_data::{EntityId, SecurityPanel};

/// Candidate entity ids, in natural entity order.
pub type CandidateSet = BTreeSet<EntityId>;

/// The panel and formation month a filter pass runs against.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Monthly security panel.
    pub panel: &'a SecurityPanel,
    /// Formation month (first day of the month).
    pub formation_month: NaiveDate,
}

impl<'a> FilterContext<'a> {
    /// Create a context.
    pub const fn new(panel: &'a SecurityPanel, formation_month: NaiveDate) -> Self {
        Self {
            panel,
            formation_month,
        }
    }

    /// The formation month shifted by `months`.
    pub fn offset(&self, months: i32) -> Result<NaiveDate, UniverseError> {
        shift_months(self.formation_month, months).ok_or(UniverseError::MonthOutOfRange {
            month: self.formation_month,
        })
    }
}

/// A single survivorship filter.
pub trait CandidateFilter: fmt::Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Keep the candidates that pass this filter.
    fn apply(
        &self,
        ctx: &FilterContext<'_>,
        candidates: CandidateSet,
    ) -> Result<CandidateSet, UniverseError>;
}

/// Entity must have a market cap at the formation month.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeFilter;

impl CandidateFilter for SizeFilter {
    fn name(&self) -> &'static str {
        "size"
    }

    fn apply(
        &self,
        ctx: &FilterContext<'_>,
        candidates: CandidateSet,
    ) -> Result<CandidateSet, UniverseError> {
        Ok(candidates
            .into_iter()
            .filter(|entity| {
                ctx.panel
                    .at(entity, ctx.formation_month)
                    .iter()
                    .any(|obs| obs.market_cap.is_some())
            })
            .collect())
    }
}

/// Entity must have returns at the formation month and the month before it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuityFilter;

impl CandidateFilter for ContinuityFilter {
    fn name(&self) -> &'static str {
        "continuity"
    }

    fn apply(
        &self,
        ctx: &FilterContext<'_>,
        candidates: CandidateSet,
    ) -> Result<CandidateSet, UniverseError> {
        let month_prior = ctx.offset(-1)?;
        let has_return = |entity: &EntityId, date: NaiveDate| {
            ctx.panel.at(entity, date).iter().any(|obs| obs.ret.is_some())
        };

        Ok(candidates
            .into_iter()
            .filter(|entity| {
                has_return(entity, ctx.formation_month) && has_return(entity, month_prior)
            })
            .collect())
    }
}

/// Entity must have an adjusted price exactly `lookback_months` before formation.
#[derive(Debug, Clone, Copy)]
pub struct LongevityFilter {
    /// Months between the required price and the formation month.
    pub lookback_months: u32,
}

impl CandidateFilter for LongevityFilter {
    fn name(&self) -> &'static str {
        "longevity"
    }

    fn apply(
        &self,
        ctx: &FilterContext<'_>,
        candidates: CandidateSet,
    ) -> Result<CandidateSet, UniverseError> {
        let year_prior = ctx.offset(-(self.lookback_months as i32))?;

        Ok(candidates
            .into_iter()
            .filter(|entity| {
                ctx.panel
                    .at(entity, year_prior)
                    .iter()
                    .any(|obs| obs.adjusted_price.is_some())
            })
            .collect())
    }
}

/// Entity must look actively traded over the lookback window.
///
/// Guards against stale or halted securities whose flat prices would
/// otherwise pass as liquid.
#[derive(Debug, Clone, Copy)]
pub struct ActivityFilter {
    /// Window length before the formation month (inclusive on both ends).
    pub lookback_months: u32,
    /// Minimum observations in the window.
    pub min_observations: usize,
    /// Minimum observations in the window with a strictly nonzero return.
    pub min_nonzero_returns: usize,
}

impl CandidateFilter for ActivityFilter {
    fn name(&self) -> &'static str {
        "activity"
    }

    fn apply(
        &self,
        ctx: &FilterContext<'_>,
        candidates: CandidateSet,
    ) -> Result<CandidateSet, UniverseError> {
        let window_start = ctx.offset(-(self.lookback_months as i32))?;

        Ok(candidates
            .into_iter()
            .filter(|entity| {
                let window = ctx.panel.window(entity, window_start, ctx.formation_month);
                let traded = window.iter().filter(|obs| obs.has_nonzero_return()).count();
                window.len() >= self.min_observations && traded >= self.min_nonzero_returns
            })
            .collect())
    }
}

/// Survivors after one stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStage {
    /// Filter name.
    pub name: &'static str,
    /// Candidates remaining after the filter.
    pub survivors: usize,
}

/// Ordered list of filters applied left to right.
#[derive(Debug)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn CandidateFilter>>,
}

impl FilterPipeline {
    /// Build a pipeline from filters in application order.
    pub fn new(filters: Vec<Box<dyn CandidateFilter>>) -> Self {
        Self { filters }
    }

    /// Names of the filters, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every filter starting from `initial`.
    ///
    /// Returns the final survivors and the survivor count after each stage.
    pub fn run(
        &self,
        ctx: &FilterContext<'_>,
        initial: CandidateSet,
    ) -> Result<(CandidateSet, Vec<FilterStage>), UniverseError> {
        let mut stages = Vec::with_capacity(self.filters.len());
        let mut candidates = initial;

        for filter in &self.filters {
            candidates = filter.apply(ctx, candidates)?;
            stages.push(FilterStage {
                name: filter.name(),
                survivors: candidates.len(),
            });
        }

        Ok((candidates, stages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasman_data::{Frequency, RawObservation};

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    /// Thirteen monthly rows ending at 2021-01 with prices from `prices`.
    fn history(id: &str, prices: &[f64]) -> Vec<RawObservation> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let date = shift_months(month(2020, 1), i as i32).unwrap();
                RawObservation::new(id, date, id, p, 1_000.0, 1.0)
            })
            .collect()
    }

    fn ids(set: &CandidateSet) -> Vec<&str> {
        set.iter().map(EntityId::as_str).collect()
    }

    fn everyone(panel: &SecurityPanel) -> CandidateSet {
        panel.entities().cloned().collect()
    }

    #[test]
    fn test_size_filter_needs_cap_at_formation() {
        let mut rows = history("A", &[10.0, 11.0]);
        let mut gap = RawObservation::new("B", month(2020, 2), "B", 5.0, 1.0, 1.0);
        gap.shares_outstanding = None;
        rows.push(gap);
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);
        let ctx = FilterContext::new(&panel, month(2020, 2));

        let kept = SizeFilter.apply(&ctx, everyone(&panel)).unwrap();
        assert_eq!(ids(&kept), vec!["A"]);
    }

    #[test]
    fn test_continuity_filter_needs_two_consecutive_returns() {
        // A: returns at 2020-02 and 2020-03. B: first return only at 2020-03.
        let mut rows = history("A", &[10.0, 11.0, 12.0]);
        rows.extend([
            RawObservation::new("B", month(2020, 2), "B", 5.0, 1.0, 1.0),
            RawObservation::new("B", month(2020, 3), "B", 6.0, 1.0, 1.0),
        ]);
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);
        let ctx = FilterContext::new(&panel, month(2020, 3));

        let kept = ContinuityFilter.apply(&ctx, everyone(&panel)).unwrap();
        assert_eq!(ids(&kept), vec!["A"]);
    }

    #[test]
    fn test_longevity_filter_needs_price_a_year_back() {
        let mut rows = history("A", &[10.0; 13]);
        rows.extend(history("B", &[10.0; 13]).into_iter().skip(1));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);
        let ctx = FilterContext::new(&panel, month(2021, 1));
        let filter = LongevityFilter { lookback_months: 12 };

        let kept = filter.apply(&ctx, everyone(&panel)).unwrap();
        assert_eq!(ids(&kept), vec!["A"]);
    }

    #[test]
    fn test_activity_filter_rejects_stale_prices() {
        // A trades every month; B's price moves only three times.
        let active: Vec<f64> = (0..13).map(|i| 10.0 + i as f64).collect();
        let stale = [10.0, 10.0, 11.0, 11.0, 11.0, 12.0, 12.0, 12.0, 12.0, 13.0, 13.0, 13.0, 13.0];
        let mut rows = history("A", &active);
        rows.extend(history("B", &stale));
        // C has too few observations in the window.
        rows.extend(history("C", &active).into_iter().step_by(2));
        let panel = SecurityPanel::from_raw(rows, Frequency::Monthly);
        let ctx = FilterContext::new(&panel, month(2021, 1));
        let filter = ActivityFilter {
            lookback_months: 12,
            min_observations: 8,
            min_nonzero_returns: 4,
        };

        let kept = filter.apply(&ctx, everyone(&panel)).unwrap();
        assert_eq!(ids(&kept), vec!["A"]);
    }

    #[test]
    fn test_pipeline_reports_stages() {
        let panel = SecurityPanel::from_raw(history("A", &[10.0, 11.0, 12.0]), Frequency::Monthly);
        let ctx = FilterContext::new(&panel, month(2020, 3));
        let filters: Vec<Box<dyn CandidateFilter>> = vec![
            Box::new(SizeFilter),
            Box::new(ContinuityFilter),
            Box::new(LongevityFilter { lookback_months: 12 }),
        ];
        let pipeline = FilterPipeline::new(filters);

        let (kept, stages) = pipeline.run(&ctx, everyone(&panel)).unwrap();
        assert!(kept.is_empty());
        assert_eq!(pipeline.names(), vec!["size", "continuity", "longevity"]);
        assert_eq!(
            stages.iter().map(|s| s.survivors).collect::<Vec<_>>(),
            vec![1, 1, 0]
        );
    }
}
