//! Feed rows and derived security observations.

use crate::month::feed_date;
use chrono::NaiveDate;
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Stable security identifier (e.g. a CUSIP or GVKEY).
///
/// Ordering of `EntityId` is the natural entity ordering used for
/// deterministic tie-breaks.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Sampling frequency of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// One row per entity per calendar month, keyed by the month's first day.
    Monthly,
    /// One row per entity per trading day.
    Daily,
}

/// One row of a raw security feed, before any derived field exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Security identifier.
    pub entity_id: EntityId,
    /// Observation date.
    #[serde(with = "feed_date")]
    pub date: NaiveDate,
    /// Listing identity label (ticker).
    #[serde(default)]
    pub label: String,
    /// Unadjusted closing price.
    pub price: Option<f64>,
    /// Shares outstanding.
    pub shares_outstanding: Option<f64>,
    /// Cumulative price adjustment factor.
    pub adjustment_factor: Option<f64>,
    /// GICS sector code.
    pub sector_code: Option<u32>,
}

impl RawObservation {
    /// Create a raw observation with every numeric field present.
    pub fn new(
        entity_id: impl Into<EntityId>,
        date: NaiveDate,
        label: impl Into<String>,
        price: f64,
        shares_outstanding: f64,
        adjustment_factor: f64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            date,
            label: label.into(),
            price: Some(price),
            shares_outstanding: Some(shares_outstanding),
            adjustment_factor: Some(adjustment_factor),
            sector_code: None,
        }
    }

    /// Attach a sector code.
    pub fn with_sector(mut self, sector_code: u32) -> Self {
        self.sector_code = Some(sector_code);
        self
    }
}

/// A feed row with its derived fields attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityObservation {
    /// Security identifier.
    pub entity_id: EntityId,
    /// Listing identity label (ticker).
    pub label: String,
    /// Observation date (first of month for monthly panels).
    #[serde(with = "feed_date")]
    pub date: NaiveDate,
    /// Unadjusted closing price.
    pub price: Option<f64>,
    /// Split/dividend adjusted price, `price / adjustment_factor`.
    pub adjusted_price: Option<f64>,
    /// Shares outstanding.
    pub shares_outstanding: Option<f64>,
    /// Cumulative price adjustment factor.
    pub adjustment_factor: Option<f64>,
    /// Market capitalisation, `price * shares_outstanding`.
    pub market_cap: Option<f64>,
    /// Simple return against the previous observation of the same listing.
    #[serde(rename = "return")]
    pub ret: Option<f64>,
    /// Return of the previous observation of the same listing.
    pub lagged_return: Option<f64>,
    /// GICS sector code.
    pub sector_code: Option<u32>,
}

impl SecurityObservation {
    /// Derive price-level fields from a raw row. Returns are filled in by the panel.
    pub fn from_raw(raw: RawObservation, date: NaiveDate) -> Self {
        let market_cap = raw.price.zip(raw.shares_outstanding).map(|(p, s)| p * s);
        let adjusted_price = raw
            .price
            .zip(raw.adjustment_factor)
            .filter(|(_, factor)| *factor != 0.0)
            .map(|(p, factor)| p / factor);

        Self {
            entity_id: raw.entity_id,
            label: raw.label,
            date,
            price: raw.price,
            adjusted_price,
            shares_outstanding: raw.shares_outstanding,
            adjustment_factor: raw.adjustment_factor,
            market_cap,
            ret: None,
            lagged_return: None,
            sector_code: raw.sector_code,
        }
    }

    /// Whether two rows agree on every static (non-return) attribute.
    pub fn same_static_attributes(&self, other: &Self) -> bool {
        self.label == other.label
            && self.sector_code == other.sector_code
            && self.price == other.price
            && self.shares_outstanding == other.shares_outstanding
            && self.adjustment_factor == other.adjustment_factor
    }

    /// Whether the return is present and strictly nonzero.
    pub fn has_nonzero_return(&self) -> bool {
        self.ret.is_some_and(|r| r != 0.0)
    }
}
