//! Point-in-time investable universe.
//!
//! Builds a monthly universe from a security panel: survivorship filters
//! applied at each formation month, top-N ranking by market cap and
//! zero-return bridging of entities that disappear before their holding month.

pub mod filters;
pub mod gics;
pub mod selector;

pub use filters::{CandidateFilter, CandidateSet, FilterContext, FilterPipeline, FilterStage};
pub use gics::{GicsSector, SectorBreakdown};
pub use selector::{UniverseConfig, UniverseSelector};

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tasman_data::month::shift_months;
use tasman_data::{EntityId, Frequency, MembershipRecord};
use thiserror::Error;

/// Errors that can occur during universe selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniverseError {
    /// No observations at the formation month.
    #[error("No observations at formation month {month}")]
    InsufficientData {
        /// Formation month.
        month: NaiveDate,
    },

    /// Duplicate formation-month rows disagree on static attributes.
    #[error("Entity {entity} has conflicting attributes at {month}")]
    ConflictingAttributes {
        /// Entity with conflicting rows.
        entity: EntityId,
        /// Formation month.
        month: NaiveDate,
    },

    /// A month offset fell outside the calendar range.
    #[error("Month offset out of range from {month}")]
    MonthOutOfRange {
        /// Month the offset was taken from.
        month: NaiveDate,
    },

    /// Universe selection needs a monthly panel.
    #[error("Universe selection requires a monthly panel, got {0:?}")]
    UnsupportedFrequency(Frequency),

    /// Invalid configuration.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Trait for a set of admitted entities.
pub trait Universe {
    /// Entities in the universe, in rank order.
    fn entities(&self) -> Vec<&EntityId>;

    /// Check if an entity is in the universe.
    fn contains(&self, entity: &EntityId) -> bool {
        self.entities().contains(&entity)
    }

    /// Number of admitted entities.
    fn size(&self) -> usize {
        self.entities().len()
    }
}

/// One formation month's membership, in rank order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Membership<'a>(pub &'a [MembershipRecord]);

impl<'a> Membership<'a> {
    /// The underlying records.
    pub const fn records(&self) -> &'a [MembershipRecord] {
        self.0
    }
}

impl Universe for Membership<'_> {
    fn entities(&self) -> Vec<&EntityId> {
        self.0.iter().map(|r| &r.entity_id).collect()
    }

    fn size(&self) -> usize {
        self.0.len()
    }
}

/// A formation month that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodFailure {
    /// Formation month.
    pub formation_month: NaiveDate,
    /// Why the month failed.
    pub error: UniverseError,
}

/// Output of a full universe construction run.
#[derive(Debug, Clone, Default)]
pub struct UniverseRun {
    /// Membership per formation month, each in rank order.
    pub memberships: BTreeMap<NaiveDate, Vec<MembershipRecord>>,
    /// Formation months that failed.
    pub failures: Vec<PeriodFailure>,
}

impl UniverseRun {
    /// Every membership record, ordered by formation month then rank.
    pub fn records(&self) -> Vec<MembershipRecord> {
        self.memberships.values().flatten().cloned().collect()
    }

    /// Records held in `holding_month`.
    pub fn held_in(&self, holding_month: NaiveDate) -> Option<Membership<'_>> {
        let formation = shift_months(holding_month, -1)?;
        self.memberships
            .get(&formation)
            .map(|records| Membership(records.as_slice()))
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.memberships.values().map(Vec::len).sum()
    }

    /// Number of bridged records.
    pub fn bridged_count(&self) -> usize {
        self.memberships
            .values()
            .flatten()
            .filter(|r| r.is_bridged)
            .count()
    }

    /// Whether every formation month succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasman_data::{RawObservation, SecurityObservation};

    fn record(id: &str, rank: usize, bridged: bool) -> MembershipRecord {
        let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let obs = SecurityObservation::from_raw(
            RawObservation::new(id, date, id, 1.0, 1.0, 1.0),
            date,
        );
        let formation = NaiveDate::from_ymd_opt(2020, 12, 1).unwrap();
        if bridged {
            let mut formation_obs = obs;
            formation_obs.date = formation;
            MembershipRecord::bridged(&formation_obs, date, rank)
        } else {
            MembershipRecord::native(&obs, formation, date, rank)
        }
    }

    #[test]
    fn test_universe_trait() {
        let records = vec![record("A", 1, false), record("B", 2, true)];
        let universe = Membership(&records);

        assert!(universe.contains(&EntityId::from("A")));
        assert!(!universe.contains(&EntityId::from("Z")));
        assert_eq!(universe.size(), 2);
    }

    #[test]
    fn test_run_lookup_by_holding_month() {
        let formation = NaiveDate::from_ymd_opt(2020, 12, 1).unwrap();
        let mut run = UniverseRun::default();
        run.memberships
            .insert(formation, vec![record("A", 1, false), record("B", 2, true)]);

        let held = run
            .held_in(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
            .unwrap();
        assert_eq!(held.size(), 2);
        assert!(held.records()[1].is_bridged);
        assert_eq!(run.record_count(), 2);
        assert_eq!(run.bridged_count(), 1);
        assert!(run.is_complete());
        assert!(run.held_in(formation).is_none());
    }
}
