//! Immutable per-security time series.
//!
//! A [`SecurityPanel`] is built in one pass from raw feed rows:
//!
//! 1. Dates are normalised (first of month for monthly feeds).
//! 2. Rows are sorted by (entity, date, label, input order) and exact
//!    duplicates collapse to the first occurrence.
//! 3. Each entity's series derives its returns in time order. A row chains
//!    to the previous date's row with the same label, or to the previous
//!    date's only row, so a relabelled entity keeps a continuous return.
//! 4. The finished rows are indexed by entity and date.
//!
//! Sorting before segmenting keeps every derived field independent of the
//! order the feed was read in.

use crate::month::month_start;
use crate::observation::{EntityId, Frequency, RawObservation, SecurityObservation};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, warn};

/// Point-in-time panel of security observations.
#[derive(Debug, Clone)]
pub struct SecurityPanel {
    frequency: Frequency,
    observations: Vec<SecurityObservation>,
    entity_ranges: BTreeMap<EntityId, Range<usize>>,
    date_index: BTreeMap<NaiveDate, Vec<usize>>,
    collapsed_duplicates: usize,
}

impl SecurityPanel {
    /// Build a panel from raw feed rows.
    pub fn from_raw(rows: Vec<RawObservation>, frequency: Frequency) -> Self {
        let mut tagged: Vec<(usize, SecurityObservation)> = rows
            .into_iter()
            .enumerate()
            .map(|(order, raw)| {
                let date = match frequency {
                    Frequency::Monthly => month_start(raw.date),
                    Frequency::Daily => raw.date,
                };
                (order, SecurityObservation::from_raw(raw, date))
            })
            .collect();

        tagged.sort_by(|(ia, a), (ib, b)| {
            a.entity_id
                .cmp(&b.entity_id)
                .then_with(|| a.date.cmp(&b.date))
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| ia.cmp(ib))
        });

        let mut collapsed_duplicates = 0;
        let mut deduped: Vec<SecurityObservation> = Vec::with_capacity(tagged.len());
        for (_, obs) in tagged {
            if let Some(last) = deduped.last()
                && last.entity_id == obs.entity_id
                && last.label == obs.label
                && last.date == obs.date
            {
                if !last.same_static_attributes(&obs) {
                    warn!(
                        entity = %obs.entity_id,
                        label = %obs.label,
                        date = %obs.date,
                        "Duplicate listing row with differing values, keeping first"
                    );
                }
                collapsed_duplicates += 1;
                continue;
            }
            deduped.push(obs);
        }

        derive_returns(&mut deduped);

        let panel = Self::index(frequency, deduped, collapsed_duplicates);
        debug!(
            rows = panel.len(),
            entities = panel.entity_ranges.len(),
            dates = panel.date_index.len(),
            collapsed_duplicates,
            "Built security panel"
        );
        panel
    }

    fn index(
        frequency: Frequency,
        observations: Vec<SecurityObservation>,
        collapsed_duplicates: usize,
    ) -> Self {
        let mut entity_ranges: BTreeMap<EntityId, Range<usize>> = BTreeMap::new();
        let mut date_index: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();

        for (i, obs) in observations.iter().enumerate() {
            entity_ranges
                .entry(obs.entity_id.clone())
                .and_modify(|range| range.end = i + 1)
                .or_insert(i..i + 1);
            date_index.entry(obs.date).or_default().push(i);
        }

        Self {
            frequency,
            observations,
            entity_ranges,
            date_index,
            collapsed_duplicates,
        }
    }

    /// Feed frequency of the panel.
    pub const fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// All observations, ordered by (entity, date, label).
    pub fn observations(&self) -> &[SecurityObservation] {
        &self.observations
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the panel has no observations.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of exact-key duplicate rows dropped during construction.
    pub const fn collapsed_duplicates(&self) -> usize {
        self.collapsed_duplicates
    }

    /// Entities in natural order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entity_ranges.keys()
    }

    /// Distinct observation dates, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.date_index.keys().copied()
    }

    /// Earliest observation date.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.date_index.keys().next().copied()
    }

    /// Latest observation date.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.date_index.keys().next_back().copied()
    }

    /// Every observation of an entity, ordered by date then label.
    pub fn series(&self, entity: &EntityId) -> &[SecurityObservation] {
        match self.entity_ranges.get(entity) {
            Some(range) => &self.observations[range.clone()],
            None => &[],
        }
    }

    /// Observations of an entity within `[start, end]` inclusive.
    pub fn window(
        &self,
        entity: &EntityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> &[SecurityObservation] {
        let series = self.series(entity);
        let lo = series.partition_point(|obs| obs.date < start);
        let hi = series.partition_point(|obs| obs.date <= end);
        if lo >= hi { &[] } else { &series[lo..hi] }
    }

    /// Observations of an entity exactly at `date` (several if it has several listings).
    pub fn at(&self, entity: &EntityId, date: NaiveDate) -> &[SecurityObservation] {
        self.window(entity, date, date)
    }

    /// All observations on `date`, in entity order.
    pub fn rows_on(&self, date: NaiveDate) -> impl Iterator<Item = &SecurityObservation> {
        self.date_index
            .get(&date)
            .into_iter()
            .flatten()
            .map(|&i| &self.observations[i])
    }

    /// Number of observations on `date`.
    pub fn count_on(&self, date: NaiveDate) -> usize {
        self.date_index.get(&date).map_or(0, Vec::len)
    }
}

/// Fill `ret` and `lagged_return` for rows sorted by (entity, date, label).
fn derive_returns(rows: &mut [SecurityObservation]) {
    let mut previous: Range<usize> = 0..0;
    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        while end < rows.len()
            && rows[end].entity_id == rows[start].entity_id
            && rows[end].date == rows[start].date
        {
            end += 1;
        }

        let same_entity = previous.end > previous.start
            && rows[previous.start].entity_id == rows[start].entity_id;
        for i in start..end {
            let link = if same_entity {
                rows[previous.clone()]
                    .iter()
                    .position(|obs| obs.label == rows[i].label)
                    .map(|offset| previous.start + offset)
                    .or_else(|| (previous.len() == 1).then_some(previous.start))
            } else {
                None
            };
            let Some(link) = link else {
                continue;
            };
            let ret = match (rows[link].adjusted_price, rows[i].adjusted_price) {
                (Some(prev), Some(curr)) if prev != 0.0 => Some(curr / prev - 1.0),
                _ => None,
            };
            rows[i].lagged_return = rows[link].ret;
            rows[i].ret = ret;
        }

        previous = start..end;
        start = end;
    }
}
