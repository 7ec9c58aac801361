//! CSV feed loading.
//!
//! Transport is plain CSV with a header row; any record type that implements
//! `Deserialize` can be read, which covers the raw security feed as well as
//! membership lists and aggregate series produced by earlier runs.

use crate::error::{DataError, Result};
use crate::observation::{Frequency, RawObservation};
use crate::panel::SecurityPanel;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Read every record of a CSV reader.
pub fn read_records<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    rdr.deserialize().map(|record| record.map_err(DataError::from)).collect()
}

/// Read every record of a CSV file.
pub fn read_records_from_path<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path)?;
    read_records(file)
}

/// Load a raw security feed from CSV and build its panel.
///
/// Expected columns: `entity_id, date, label, price, shares_outstanding,
/// adjustment_factor, sector_code`. Empty numeric cells are read as missing.
pub fn load_panel(path: &Path, frequency: Frequency) -> Result<SecurityPanel> {
    let rows: Vec<RawObservation> = read_records_from_path(path)?;
    if rows.is_empty() {
        return Err(DataError::EmptyFeed(path.display().to_string()));
    }
    info!(path = %path.display(), rows = rows.len(), ?frequency, "Loaded security feed");
    Ok(SecurityPanel::from_raw(rows, frequency))
}
