//! CSV and JSON export of pipeline tables.
//!
//! Every output table is a list of flat serde records, so a single
//! [`Exporter`] implementation over record slices covers the membership
//! table, the aggregate return series, the volatility table and the entity
//! volatility table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tasman_data::month::feed_date;
use tasman_data::{EntityId, MembershipRecord};
use tasman_risk::{AggregateSeries, AmbiguousIdentity, EntityVolatilityTable, VolatilityTable};
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DataFrame construction error.
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Serialized CSV was not valid UTF-8.
    #[error("Invalid UTF-8 in CSV output: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Comma-separated values format.
    #[default]
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pretty-json" | "pretty_json" | "prettyjson" => Ok(Self::PrettyJson),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

impl<T: Serialize> Exporter for [T] {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for record in self {
                    wtr.serialize(record)?;
                }
                let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
                Ok(String::from_utf8(bytes)?)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for AggregateSeries {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        self.points.export_to_string(format)
    }
}

impl Exporter for VolatilityTable {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        self.records.export_to_string(format)
    }
}

impl Exporter for EntityVolatilityTable {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        self.records.export_to_string(format)
    }
}

/// Flat form of an [`AmbiguousIdentity`] with labels joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousRow {
    /// Entity id.
    pub entity_id: EntityId,
    /// Observation date.
    #[serde(with = "feed_date")]
    pub date: chrono::NaiveDate,
    /// Conflicting labels.
    pub labels: String,
}

impl From<&AmbiguousIdentity> for AmbiguousRow {
    fn from(item: &AmbiguousIdentity) -> Self {
        Self {
            entity_id: item.entity_id.clone(),
            date: item.date,
            labels: item.labels.join("|"),
        }
    }
}

/// Flatten ambiguous identities for tabular export.
pub fn ambiguous_rows(items: &[AmbiguousIdentity]) -> Vec<AmbiguousRow> {
    items.iter().map(AmbiguousRow::from).collect()
}

/// Distinct entity ids of a membership table, ascending.
pub fn entity_list(records: &[MembershipRecord]) -> Vec<EntityId> {
    records
        .iter()
        .map(|r| r.entity_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Write the distinct entity ids of a membership table, one per line.
///
/// This is the id list used to request daily data for the held universe.
pub fn write_entity_list(path: &Path, records: &[MembershipRecord]) -> Result<(), ExportError> {
    let mut file = File::create(path)?;
    for entity in entity_list(records) {
        writeln!(file, "{entity}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tasman_data::{RawObservation, SecurityObservation};
    use tasman_risk::{AggregateReturnPoint, ForecastStatus, VolatilityRecord};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn membership() -> Vec<MembershipRecord> {
        let obs = SecurityObservation::from_raw(
            RawObservation::new("B", d(2021, 1, 1), "BBB", 10.0, 5.0, 1.0),
            d(2021, 1, 1),
        );
        let mut formation = obs.clone();
        formation.entity_id = EntityId::from("A");
        formation.date = d(2020, 12, 1);
        vec![
            MembershipRecord::native(&obs, d(2020, 12, 1), d(2021, 1, 1), 1),
            MembershipRecord::bridged(&formation, d(2021, 1, 1), 2),
            MembershipRecord::native(&obs, d(2021, 1, 1), d(2021, 2, 1), 1),
        ]
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(
            "pretty-json".parse::<ExportFormat>().unwrap(),
            ExportFormat::PrettyJson
        );
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(ExportError::InvalidFormat(_))
        ));
        assert_eq!(ExportFormat::PrettyJson.extension(), "json");
    }

    #[test]
    fn test_membership_csv() {
        let csv = membership().export_to_string(ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("entity_id,label,formation_month,holding_month"));
        assert!(header.contains(",return,"));
        assert_eq!(lines.count(), 3);
        assert!(csv.contains("A,BBB,2020-12-01,2021-01-01,2,true"));
    }

    #[test]
    fn test_membership_csv_reads_back() {
        let records = membership();
        let csv = records.export_to_string(ExportFormat::Csv).unwrap();
        let parsed: Vec<MembershipRecord> =
            tasman_data::feed::read_records(csv.as_bytes()).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_volatility_csv_has_empty_cells_for_missing() {
        let table = VolatilityTable {
            records: vec![VolatilityRecord {
                month: d(2021, 5, 1),
                forecast_volatility: None,
                realized_volatility: Some(0.04),
                lagged_realized_volatility: Some(0.05),
                forecast_status: ForecastStatus::Failed,
                failure_reason: Some("no observations".to_string()),
            }],
            steps: vec![],
        };

        let csv = table.export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.contains("2021-05-01,,0.04,0.05,failed,no observations"));
    }

    #[test]
    fn test_aggregate_pretty_json() {
        let series = AggregateSeries {
            points: vec![AggregateReturnPoint {
                date: d(2021, 1, 5),
                value_weighted_return: 0.0125,
                constituents: 2,
            }],
            ambiguous: vec![],
        };
        let json = series.export_to_string(ExportFormat::PrettyJson).unwrap();
        assert!(json.contains("\"2021-01-05\""));
        assert!(json.contains("  "));
    }

    #[test]
    fn test_ambiguous_rows_flatten_labels() {
        let items = vec![AmbiguousIdentity {
            entity_id: EntityId::from("B"),
            date: d(2021, 1, 5),
            labels: vec!["B".to_string(), "B2".to_string()],
        }];
        let csv = ambiguous_rows(&items)
            .export_to_string(ExportFormat::Csv)
            .unwrap();
        assert!(csv.contains("B,2021-01-05,B|B2"));
    }

    #[test]
    fn test_entity_list_is_distinct() {
        let ids = entity_list(&membership());
        assert_eq!(ids, vec![EntityId::from("A"), EntityId::from("B")]);
    }
}
