//! Per-entity realized volatility for held entities.
//!
//! Both measures are the sample standard deviation of an entity's daily
//! returns within a calendar month, scaled by `sqrt(trading_days_per_month)`.
//! [`EntityVolatilityBuilder::monthly`] uses the holding month itself;
//! [`EntityVolatilityBuilder::previous_month`] uses the month before it and
//! reports the value at the holding month.

use crate::aggregate::{AmbiguousIdentity, split_ambiguous};
use crate::stats::sample_std;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tasman_data::month::{feed_date, month_start, shift_months};
use tasman_data::{EntityId, MembershipRecord, SecurityPanel};
use tracing::{info, warn};

/// Entity volatility configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityVolatilityConfig {
    /// Minimum daily returns in the holding month (default: 5)
    pub min_observations: usize,

    /// Minimum daily returns in the previous month (default: 2)
    pub min_previous_observations: usize,

    /// Scaling from daily to monthly volatility (default: 22)
    pub trading_days_per_month: usize,
}

impl Default for EntityVolatilityConfig {
    fn default() -> Self {
        Self {
            min_observations: 5,
            min_previous_observations: 2,
            trading_days_per_month: 22,
        }
    }
}

/// Volatility of one entity in one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVolatilityRecord {
    /// Entity id.
    pub entity_id: EntityId,
    /// Month the value is reported at.
    #[serde(with = "feed_date")]
    pub month: NaiveDate,
    /// Scaled sample standard deviation of daily returns.
    pub volatility: f64,
    /// Daily returns used.
    pub observations: usize,
}

/// Entity volatility records plus excluded ambiguous rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityVolatilityTable {
    /// Records ordered by (entity, month).
    pub records: Vec<EntityVolatilityRecord>,
    /// (entity, date) pairs excluded for conflicting labels.
    pub ambiguous: Vec<AmbiguousIdentity>,
}

/// Builds per-entity monthly volatility for a membership table.
#[derive(Debug, Clone, Default)]
pub struct EntityVolatilityBuilder {
    config: EntityVolatilityConfig,
}

impl EntityVolatilityBuilder {
    /// Create a builder.
    pub const fn new(config: EntityVolatilityConfig) -> Self {
        Self { config }
    }

    /// Builder configuration.
    pub const fn config(&self) -> &EntityVolatilityConfig {
        &self.config
    }

    /// Volatility of each held entity within its holding month.
    pub fn monthly(
        &self,
        daily: &SecurityPanel,
        membership: &[MembershipRecord],
    ) -> EntityVolatilityTable {
        let table = self.build(daily, membership, 0, self.config.min_observations);
        info!(records = table.records.len(), "Built monthly entity volatility");
        table
    }

    /// Volatility of each held entity in the month before its holding month.
    pub fn previous_month(
        &self,
        daily: &SecurityPanel,
        membership: &[MembershipRecord],
    ) -> EntityVolatilityTable {
        let table = self.build(daily, membership, -1, self.config.min_previous_observations);
        info!(
            records = table.records.len(),
            "Built previous-month entity volatility"
        );
        table
    }

    fn build(
        &self,
        daily: &SecurityPanel,
        membership: &[MembershipRecord],
        offset: i32,
        min_observations: usize,
    ) -> EntityVolatilityTable {
        let held: BTreeSet<(EntityId, NaiveDate)> = membership
            .iter()
            .map(|r| (r.entity_id.clone(), month_start(r.holding_month)))
            .collect();
        let scale = (self.config.trading_days_per_month as f64).sqrt();
        let mut table = EntityVolatilityTable::default();

        for (entity, month) in held {
            let Some((start, end)) = shift_months(month, offset).and_then(month_bounds) else {
                continue;
            };
            let (clean, conflicts) = split_ambiguous(daily.window(&entity, start, end));
            for conflict in &conflicts {
                warn!(
                    entity = %conflict.entity_id,
                    date = %conflict.date,
                    "Excluding rows with conflicting identity labels"
                );
            }
            table.ambiguous.extend(conflicts);

            let returns: Vec<f64> = clean.iter().filter_map(|obs| obs.ret).collect();
            if returns.len() < min_observations {
                continue;
            }
            if let Some(std) = sample_std(&returns) {
                table.records.push(EntityVolatilityRecord {
                    entity_id: entity,
                    month,
                    volatility: std * scale,
                    observations: returns.len(),
                });
            }
        }

        table.ambiguous.sort_by(|a, b| {
            a.entity_id
                .cmp(&b.entity_id)
                .then_with(|| a.date.cmp(&b.date))
        });
        table.ambiguous.dedup();
        table
    }
}

/// First and last day of `month`.
fn month_bounds(month: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let next = shift_months(month, 1)?;
    Some((month, next.pred_opt()?))
}
