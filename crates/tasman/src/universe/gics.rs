//! GICS sector classification of admitted entities.
//!
//! Feed rows carry a numeric GICS code at whatever depth the vendor provides
//! (sector `45`, industry group `4510`, sub-industry `45102010`); the sector
//! is always the leading two digits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tasman_data::MembershipRecord;

/// GICS Level 1 sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GicsSector {
    /// Energy
    Energy,
    /// Materials
    Materials,
    /// Industrials
    Industrials,
    /// Consumer Discretionary
    ConsumerDiscretionary,
    /// Consumer Staples
    ConsumerStaples,
    /// Health Care
    HealthCare,
    /// Financials
    Financials,
    /// Information Technology
    InformationTechnology,
    /// Communication Services
    CommunicationServices,
    /// Utilities
    Utilities,
    /// Real Estate
    RealEstate,
}

impl GicsSector {
    /// Sectors in code order.
    pub const ALL: [Self; 11] = [
        Self::Energy,
        Self::Materials,
        Self::Industrials,
        Self::ConsumerDiscretionary,
        Self::ConsumerStaples,
        Self::HealthCare,
        Self::Financials,
        Self::InformationTechnology,
        Self::CommunicationServices,
        Self::Utilities,
        Self::RealEstate,
    ];

    /// Two-digit sector code.
    pub const fn code(&self) -> u32 {
        match self {
            Self::Energy => 10,
            Self::Materials => 15,
            Self::Industrials => 20,
            Self::ConsumerDiscretionary => 25,
            Self::ConsumerStaples => 30,
            Self::HealthCare => 35,
            Self::Financials => 40,
            Self::InformationTechnology => 45,
            Self::CommunicationServices => 50,
            Self::Utilities => 55,
            Self::RealEstate => 60,
        }
    }

    /// Full sector name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Energy => "Energy",
            Self::Materials => "Materials",
            Self::Industrials => "Industrials",
            Self::ConsumerDiscretionary => "Consumer Discretionary",
            Self::ConsumerStaples => "Consumer Staples",
            Self::HealthCare => "Health Care",
            Self::Financials => "Financials",
            Self::InformationTechnology => "Information Technology",
            Self::CommunicationServices => "Communication Services",
            Self::Utilities => "Utilities",
            Self::RealEstate => "Real Estate",
        }
    }

    /// Sector of a GICS code at any depth (2, 4, 6 or 8 digits).
    pub const fn from_code(code: u32) -> Option<Self> {
        let mut sector = code;
        while sector >= 100 {
            sector /= 100;
        }
        match sector {
            10 => Some(Self::Energy),
            15 => Some(Self::Materials),
            20 => Some(Self::Industrials),
            25 => Some(Self::ConsumerDiscretionary),
            30 => Some(Self::ConsumerStaples),
            35 => Some(Self::HealthCare),
            40 => Some(Self::Financials),
            45 => Some(Self::InformationTechnology),
            50 => Some(Self::CommunicationServices),
            55 => Some(Self::Utilities),
            60 => Some(Self::RealEstate),
            _ => None,
        }
    }
}

impl fmt::Display for GicsSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Count and market cap of a membership list per sector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorBreakdown {
    /// (count, total market cap) per known sector.
    pub sectors: BTreeMap<GicsSector, (usize, f64)>,
    /// Records without a recognised sector code.
    pub unclassified: usize,
}

impl SectorBreakdown {
    /// Tally `records` by sector.
    pub fn from_records(records: &[MembershipRecord]) -> Self {
        let mut breakdown = Self::default();
        for record in records {
            match record.sector_code.and_then(GicsSector::from_code) {
                Some(sector) => {
                    let entry = breakdown.sectors.entry(sector).or_insert((0, 0.0));
                    entry.0 += 1;
                    entry.1 += record.market_cap.unwrap_or(0.0);
                }
                None => breakdown.unclassified += 1,
            }
        }
        breakdown
    }

    /// Number of records in `sector`.
    pub fn count(&self, sector: GicsSector) -> usize {
        self.sectors.get(&sector).map_or(0, |(n, _)| *n)
    }

    /// Share of total classified market cap held by each sector.
    pub fn cap_weights(&self) -> BTreeMap<GicsSector, f64> {
        let total: f64 = self.sectors.values().map(|(_, cap)| cap).sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        self.sectors
            .iter()
            .map(|(sector, (_, cap))| (*sector, cap / total))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use tasman_data::{RawObservation, SecurityObservation};

    #[test]
    fn test_all_sectors() {
        assert_eq!(GicsSector::ALL.len(), 11);
        assert!(GicsSector::ALL.windows(2).all(|w| w[0].code() < w[1].code()));
    }

    #[rstest]
    #[case(45, Some(GicsSector::InformationTechnology))]
    #[case(4510, Some(GicsSector::InformationTechnology))]
    #[case(45102010, Some(GicsSector::InformationTechnology))]
    #[case(101020, Some(GicsSector::Energy))]
    #[case(60, Some(GicsSector::RealEstate))]
    #[case(99, None)]
    #[case(7, None)]
    fn test_from_code(#[case] code: u32, #[case] expected: Option<GicsSector>) {
        assert_eq!(GicsSector::from_code(code), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", GicsSector::InformationTechnology),
            "Information Technology"
        );
        assert_eq!(format!("{}", GicsSector::Energy), "Energy");
    }

    #[test]
    fn test_breakdown() {
        let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let formation = NaiveDate::from_ymd_opt(2020, 12, 1).unwrap();
        let make = |id: &str, cap: f64, sector: Option<u32>| {
            let mut raw = RawObservation::new(id, date, id, cap, 1.0, 1.0);
            raw.sector_code = sector;
            let obs = SecurityObservation::from_raw(raw, date);
            MembershipRecord::native(&obs, formation, date, 1)
        };
        let records = vec![
            make("A", 300.0, Some(4510)),
            make("B", 100.0, Some(45)),
            make("C", 100.0, Some(10)),
            make("D", 50.0, None),
        ];

        let breakdown = SectorBreakdown::from_records(&records);

        assert_eq!(breakdown.count(GicsSector::InformationTechnology), 2);
        assert_eq!(breakdown.count(GicsSector::Energy), 1);
        assert_eq!(breakdown.count(GicsSector::Utilities), 0);
        assert_eq!(breakdown.unclassified, 1);
        let weights = breakdown.cap_weights();
        assert!((weights[&GicsSector::InformationTechnology] - 0.8).abs() < 1e-12);
    }
}
