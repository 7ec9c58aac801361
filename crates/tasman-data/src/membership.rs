//! Universe membership records.
//!
//! A membership record admits an entity at its formation month and makes it
//! eligible to be held in the following (holding) month. The record carries
//! the entity's holding-month observation, either native or bridged.

use crate::month::{feed_date, month_start};
use crate::observation::{EntityId, SecurityObservation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// One admitted entity for one holding month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Security identifier.
    pub entity_id: EntityId,
    /// Listing identity label at formation.
    pub label: String,
    /// Month the entity was selected in.
    #[serde(with = "feed_date")]
    pub formation_month: NaiveDate,
    /// Month the entity is held in (`formation_month + 1`).
    #[serde(with = "feed_date")]
    pub holding_month: NaiveDate,
    /// 1-based market cap rank within the formation month.
    pub market_cap_rank: usize,
    /// Synthesized because the entity had no holding-month observation.
    pub is_bridged: bool,
    /// Market cap of the holding-month row.
    pub market_cap: Option<f64>,
    /// Adjusted price of the holding-month row.
    pub adjusted_price: Option<f64>,
    /// Holding-month return (exactly zero when bridged).
    #[serde(rename = "return")]
    pub ret: Option<f64>,
    /// Previous period return.
    pub lagged_return: Option<f64>,
    /// GICS sector code.
    pub sector_code: Option<u32>,
}

impl MembershipRecord {
    /// Record backed by a native holding-month observation.
    pub fn native(
        holding: &SecurityObservation,
        formation_month: NaiveDate,
        holding_month: NaiveDate,
        market_cap_rank: usize,
    ) -> Self {
        Self {
            entity_id: holding.entity_id.clone(),
            label: holding.label.clone(),
            formation_month,
            holding_month,
            market_cap_rank,
            is_bridged: false,
            market_cap: holding.market_cap,
            adjusted_price: holding.adjusted_price,
            ret: holding.ret,
            lagged_return: holding.lagged_return,
            sector_code: holding.sector_code,
        }
    }

    /// Placeholder for an entity that vanished before its holding month.
    ///
    /// Static attributes come from the formation-month row and the return is
    /// exactly zero.
    pub fn bridged(
        formation: &SecurityObservation,
        holding_month: NaiveDate,
        market_cap_rank: usize,
    ) -> Self {
        Self {
            entity_id: formation.entity_id.clone(),
            label: formation.label.clone(),
            formation_month: formation.date,
            holding_month,
            market_cap_rank,
            is_bridged: true,
            market_cap: formation.market_cap,
            adjusted_price: formation.adjusted_price,
            ret: Some(0.0),
            lagged_return: formation.ret,
            sector_code: formation.sector_code,
        }
    }
}

/// Held (entity, month) pairs of a membership table.
///
/// Lookups accept any date; it is mapped to its calendar month.
#[derive(Debug, Clone, Default)]
pub struct HoldingIndex {
    held: HashSet<(EntityId, NaiveDate)>,
    months: BTreeSet<NaiveDate>,
}

impl HoldingIndex {
    /// Index a membership table.
    pub fn new(records: &[MembershipRecord]) -> Self {
        let mut index = Self::default();
        for record in records {
            let month = month_start(record.holding_month);
            index.held.insert((record.entity_id.clone(), month));
            index.months.insert(month);
        }
        index
    }

    /// Whether `entity` is held in the month containing `date`.
    pub fn is_held(&self, entity: &EntityId, date: NaiveDate) -> bool {
        self.held.contains(&(entity.clone(), month_start(date)))
    }

    /// Holding months present, ascending.
    pub fn months(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.months.iter().copied()
    }

    /// Number of held (entity, month) pairs.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::RawObservation;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_bridged_record_has_zero_return() {
        let raw = RawObservation::new("C", d(2020, 12, 1), "CCC", 20.0, 10.0, 1.0).with_sector(40);
        let mut formation = SecurityObservation::from_raw(raw, d(2020, 12, 1));
        formation.ret = Some(0.05);

        let record = MembershipRecord::bridged(&formation, d(2021, 1, 1), 3);

        assert!(record.is_bridged);
        assert_eq!(record.ret, Some(0.0));
        assert_eq!(record.lagged_return, Some(0.05));
        assert_eq!(record.market_cap, Some(200.0));
        assert_eq!(record.sector_code, Some(40));
        assert_eq!(record.formation_month, d(2020, 12, 1));
    }

    #[test]
    fn test_holding_index_maps_days_to_months() {
        let raw = RawObservation::new("A", d(2021, 1, 1), "AAA", 1.0, 1.0, 1.0);
        let obs = SecurityObservation::from_raw(raw, d(2021, 1, 1));
        let records = vec![MembershipRecord::native(&obs, d(2020, 12, 1), d(2021, 1, 1), 1)];
        let index = HoldingIndex::new(&records);

        assert!(index.is_held(&EntityId::from("A"), d(2021, 1, 15)));
        assert!(!index.is_held(&EntityId::from("A"), d(2021, 2, 1)));
        assert!(!index.is_held(&EntityId::from("B"), d(2021, 1, 15)));
        assert_eq!(index.months().collect::<Vec<_>>(), vec![d(2021, 1, 1)]);
    }
}
