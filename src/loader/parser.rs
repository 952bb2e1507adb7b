use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::api::ratio_dto::RatioRecordDto;
use crate::domain::network::flow::Path as RouterPath;
use crate::domain::ratio::ratio_table::RatioTable;
use crate::domain::utils::id::FlowId;
use crate::error::{Error, Result};

/// Parses a JSON file into a given type `T`.
///
/// Errors are automatically converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let data = fs::read_to_string(file_path).map_err(Error::IoError)?;

    let parsed_data: T = serde_json::from_str(&data).map_err(Error::DeserializationError)?;

    Ok(parsed_data)
}

/// Reads a `timestamp;flow;path;ratio` table, as written by a previous run, grouped by timestamp.
pub fn parse_ratio_csv<P: AsRef<Path>>(file_path: P) -> Result<BTreeMap<String, RatioTable>> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_path(file_path)?;
    let mut tables: BTreeMap<String, RatioTable> = BTreeMap::new();

    for record in reader.deserialize() {
        let record: RatioRecordDto = record?;
        let flow: FlowId = record.flow.parse()?;
        let path: RouterPath = record.path.parse()?;

        tables.entry(record.timestamp).or_default().insert(flow, path, record.ratio);
    }

    log::info!("Loaded external ratios for {} buckets.", tables.len());
    Ok(tables)
}
