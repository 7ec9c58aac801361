//! Value-weighted aggregate returns over the held universe.
//!
//! On each date the admitted rows are those whose entity is held for the
//! calendar month containing the date and that carry both a market cap and a
//! return. Each admitted row is weighted by its share of the summed market
//! cap on that date:
//!
//! ```text
//! w_i = cap_i / Σ cap
//! R   = Σ w_i · r_i
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tasman_data::month::feed_date;
use tasman_data::{EntityId, HoldingIndex, MembershipRecord, SecurityObservation, SecurityPanel};
use tracing::{debug, info, warn};

/// One aggregate return observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReturnPoint {
    /// Observation date.
    #[serde(with = "feed_date")]
    pub date: NaiveDate,
    /// Market-cap-weighted return of the admitted rows.
    pub value_weighted_return: f64,
    /// Number of admitted rows.
    #[serde(default)]
    pub constituents: usize,
}

/// An (entity, date) whose rows disagree on listing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousIdentity {
    /// Entity id.
    pub entity_id: EntityId,
    /// Observation date.
    #[serde(with = "feed_date")]
    pub date: NaiveDate,
    /// Conflicting labels, ascending.
    pub labels: Vec<String>,
}

/// Aggregate return series plus the data-quality items found building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSeries {
    /// Points in ascending date order.
    pub points: Vec<AggregateReturnPoint>,
    /// Held (entity, date) pairs excluded for conflicting labels.
    pub ambiguous: Vec<AmbiguousIdentity>,
}

impl AggregateSeries {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns in date order.
    pub fn returns(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value_weighted_return).collect()
    }
}

/// Split one entity's date-ordered rows into unambiguous rows and
/// (entity, date) pairs with several conflicting rows.
pub(crate) fn split_ambiguous(
    rows: &[SecurityObservation],
) -> (Vec<&SecurityObservation>, Vec<AmbiguousIdentity>) {
    let mut clean = Vec::with_capacity(rows.len());
    let mut ambiguous = Vec::new();

    for group in rows.chunk_by(|a, b| a.date == b.date) {
        match group {
            [single] => clean.push(single),
            [first, ..] => ambiguous.push(AmbiguousIdentity {
                entity_id: first.entity_id.clone(),
                date: first.date,
                labels: group.iter().map(|obs| obs.label.clone()).collect(),
            }),
            [] => {}
        }
    }

    (clean, ambiguous)
}

/// Builds value-weighted aggregate returns restricted to a held universe.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateReturnBuilder;

/// Admitted (entity, cap, return) rows per date.
type AdmittedRows = BTreeMap<NaiveDate, Vec<(EntityId, f64, f64)>>;

impl AggregateReturnBuilder {
    /// Create a builder.
    pub const fn new() -> Self {
        Self
    }

    /// Aggregate `panel` over the entities held according to `membership`.
    ///
    /// Dates with no admitted row emit no point. The panel may be daily or
    /// monthly.
    pub fn aggregate(
        &self,
        panel: &SecurityPanel,
        membership: &[MembershipRecord],
    ) -> AggregateSeries {
        let (admitted, ambiguous) = Self::admitted(panel, membership);

        let points: Vec<AggregateReturnPoint> = admitted
            .into_iter()
            .filter_map(|(date, rows)| {
                let total_cap: f64 = rows.iter().map(|(_, cap, _)| cap).sum();
                if total_cap <= 0.0 {
                    debug!(%date, "Skipping date with non-positive total market cap");
                    return None;
                }
                let value_weighted_return = rows
                    .iter()
                    .map(|(_, cap, ret)| cap / total_cap * ret)
                    .sum();
                Some(AggregateReturnPoint {
                    date,
                    value_weighted_return,
                    constituents: rows.len(),
                })
            })
            .collect();

        info!(
            points = points.len(),
            ambiguous = ambiguous.len(),
            "Built aggregate return series"
        );

        AggregateSeries { points, ambiguous }
    }

    /// Weights applied on each date, keyed by entity.
    pub fn weights(
        &self,
        panel: &SecurityPanel,
        membership: &[MembershipRecord],
    ) -> BTreeMap<NaiveDate, BTreeMap<EntityId, f64>> {
        let (admitted, _) = Self::admitted(panel, membership);

        admitted
            .into_iter()
            .filter_map(|(date, rows)| {
                let total_cap: f64 = rows.iter().map(|(_, cap, _)| cap).sum();
                (total_cap > 0.0).then(|| {
                    let weights = rows
                        .into_iter()
                        .map(|(entity, cap, _)| (entity, cap / total_cap))
                        .collect();
                    (date, weights)
                })
            })
            .collect()
    }

    fn admitted(
        panel: &SecurityPanel,
        membership: &[MembershipRecord],
    ) -> (AdmittedRows, Vec<AmbiguousIdentity>) {
        let held = HoldingIndex::new(membership);
        let mut admitted = AdmittedRows::new();
        let mut ambiguous = Vec::new();

        for entity in panel.entities() {
            let (clean, conflicts) = split_ambiguous(panel.series(entity));

            for conflict in conflicts {
                if held.is_held(&conflict.entity_id, conflict.date) {
                    warn!(
                        entity = %conflict.entity_id,
                        date = %conflict.date,
                        labels = ?conflict.labels,
                        "Excluding rows with conflicting identity labels"
                    );
                    ambiguous.push(conflict);
                }
            }

            for obs in clean {
                if !held.is_held(entity, obs.date) {
                    continue;
                }
                if let (Some(cap), Some(ret)) = (obs.market_cap, obs.ret) {
                    admitted
                        .entry(obs.date)
                        .or_default()
                        .push((entity.clone(), cap, ret));
                }
            }
        }

        (admitted, ambiguous)
    }
}
