//! String property bag and the property-file format.
//!
//! Every knob in the harness is a string property. Properties come from
//! `-P <file>` workload files (line-oriented `key = value`, `#` comments),
//! `-p k=v` command-line overrides, and a handful of dedicated flags. Typed
//! access goes through the `get_*` helpers, which turn parse failures into
//! [`Error::Config`] with the offending key and value in the message.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

// ── property names and defaults ──

pub const PROP_WORKLOAD: &str = "workload";

pub const PROP_DB: &str = "db";
pub const PROP_DB_DEFAULT: &str = "basic";

pub const PROP_EXPORTER: &str = "exporter";
pub const PROP_EXPORTER_DEFAULT: &str = "text";
pub const PROP_EXPORT_FILE: &str = "exportfile";

pub const PROP_THREAD_COUNT: &str = "threadcount";
pub const PROP_THREAD_COUNT_DEFAULT: &str = "1";

pub const PROP_RECORD_COUNT: &str = "recordcount";
pub const PROP_RECORD_COUNT_DEFAULT: &str = "0";
pub const PROP_OPERATION_COUNT: &str = "operationcount";
pub const PROP_OPERATION_COUNT_DEFAULT: &str = "0";
pub const PROP_INSERT_COUNT: &str = "insertcount";

pub const PROP_TARGET: &str = "target";
pub const PROP_TARGET_DEFAULT: &str = "0";
pub const PROP_MAX_EXECUTION_TIME: &str = "maxexecutiontime";
pub const PROP_MAX_EXECUTION_TIME_DEFAULT: &str = "0";

pub const PROP_TRANSACTIONS: &str = "dotransactions";
pub const PROP_STATUS_INTERVAL: &str = "status.interval";
pub const PROP_STATUS_INTERVAL_DEFAULT: &str = "10";

pub const PROP_INSERT_START: &str = "insertstart";
pub const PROP_INSERT_START_DEFAULT: &str = "0";

pub const PROP_TABLE_NAME: &str = "table";
pub const PROP_TABLE_NAME_DEFAULT: &str = "usertable";

pub const PROP_FIELD_COUNT: &str = "fieldcount";
pub const PROP_FIELD_COUNT_DEFAULT: &str = "10";
pub const PROP_FIELD_LENGTH: &str = "fieldlength";
pub const PROP_FIELD_LENGTH_DEFAULT: &str = "100";
pub const PROP_FIELD_LENGTH_DISTRIBUTION: &str = "fieldlengthdistribution";
pub const PROP_FIELD_LENGTH_DISTRIBUTION_DEFAULT: &str = "constant";
pub const PROP_FIELD_LENGTH_HISTOGRAM: &str = "fieldlengthhistogram";
pub const PROP_FIELD_LENGTH_HISTOGRAM_DEFAULT: &str = "hist.txt";

pub const PROP_READ_ALL_FIELDS: &str = "readallfields";
pub const PROP_READ_ALL_FIELDS_DEFAULT: &str = "true";
pub const PROP_WRITE_ALL_FIELDS: &str = "writeallfields";
pub const PROP_WRITE_ALL_FIELDS_DEFAULT: &str = "false";
pub const PROP_DATA_INTEGRITY: &str = "dataintegrity";
pub const PROP_DATA_INTEGRITY_DEFAULT: &str = "false";

pub const PROP_READ_PROPORTION: &str = "readproportion";
pub const PROP_READ_PROPORTION_DEFAULT: &str = "0.95";
pub const PROP_UPDATE_PROPORTION: &str = "updateproportion";
pub const PROP_UPDATE_PROPORTION_DEFAULT: &str = "0.05";
pub const PROP_INSERT_PROPORTION: &str = "insertproportion";
pub const PROP_INSERT_PROPORTION_DEFAULT: &str = "0.0";
pub const PROP_SCAN_PROPORTION: &str = "scanproportion";
pub const PROP_SCAN_PROPORTION_DEFAULT: &str = "0.0";
pub const PROP_READ_MODIFY_WRITE_PROPORTION: &str = "readmodifywriteproportion";
pub const PROP_READ_MODIFY_WRITE_PROPORTION_DEFAULT: &str = "0.0";

pub const PROP_REQUEST_DISTRIBUTION: &str = "requestdistribution";
pub const PROP_REQUEST_DISTRIBUTION_DEFAULT: &str = "uniform";
pub const PROP_MAX_SCAN_LENGTH: &str = "maxscanlength";
pub const PROP_MAX_SCAN_LENGTH_DEFAULT: &str = "1000";
pub const PROP_SCAN_LENGTH_DISTRIBUTION: &str = "scanlengthdistribution";
pub const PROP_SCAN_LENGTH_DISTRIBUTION_DEFAULT: &str = "uniform";
pub const PROP_INSERT_ORDER: &str = "insertorder";
pub const PROP_INSERT_ORDER_DEFAULT: &str = "hashed";

pub const PROP_HOTSPOT_DATA_FRACTION: &str = "hotspotdatafraction";
pub const PROP_HOTSPOT_DATA_FRACTION_DEFAULT: &str = "0.2";
pub const PROP_HOTSPOT_OPN_FRACTION: &str = "hotspotopnfraction";
pub const PROP_HOTSPOT_OPN_FRACTION_DEFAULT: &str = "0.8";

pub const PROP_EXPONENTIAL_PERCENTILE: &str = "exponential.percentile";
pub const PROP_EXPONENTIAL_PERCENTILE_DEFAULT: &str = "95";
pub const PROP_EXPONENTIAL_FRACTION: &str = "exponential.frac";
pub const PROP_EXPONENTIAL_FRACTION_DEFAULT: &str = "0.8571428571"; // 1/7

pub const PROP_INSERTION_RETRY_LIMIT: &str = "core_workload_insertion_retry_limit";
pub const PROP_INSERTION_RETRY_LIMIT_DEFAULT: &str = "0";
pub const PROP_INSERTION_RETRY_INTERVAL: &str = "core_workload_insertion_retry_interval";
pub const PROP_INSERTION_RETRY_INTERVAL_DEFAULT: &str = "3";

pub const PROP_MEASUREMENT_TYPE: &str = "measurementtype";
pub const PROP_MEASUREMENT_TYPE_DEFAULT: &str = "hdrhistogram";
pub const PROP_MEASUREMENT_INTERVAL: &str = "measurement.interval";
pub const PROP_MEASUREMENT_INTERVAL_DEFAULT: &str = "op";

pub const PROP_GRANULARITY: &str = "timeseries.granularity";
pub const PROP_GRANULARITY_DEFAULT: &str = "1000";

pub const PROP_HISTOGRAM_BUCKETS: &str = "histogram.buckets";
pub const PROP_HISTOGRAM_BUCKETS_DEFAULT: &str = "1000";

pub const PROP_HDR_PERCENTILES: &str = "hdrhistogram.percentiles";
pub const PROP_HDR_PERCENTILES_DEFAULT: &str = "95,99";
pub const PROP_HDR_FILE_OUTPUT: &str = "hdrhistogram.fileoutput";
pub const PROP_HDR_FILE_OUTPUT_DEFAULT: &str = "false";
pub const PROP_HDR_OUTPUT_PATH: &str = "hdrhistogram.output.path";
pub const PROP_HDR_OUTPUT_PATH_DEFAULT: &str = "";

pub const PROP_RAW_OUTPUT_FILE: &str = "measurement.raw.output_file";
pub const PROP_RAW_OUTPUT_FILE_DEFAULT: &str = "";
pub const PROP_RAW_NO_SUMMARY: &str = "measurement.raw.no_summary";
pub const PROP_RAW_NO_SUMMARY_DEFAULT: &str = "false";

pub const PROP_BASICDB_VERBOSE: &str = "basicdb.verbose";
pub const PROP_BASICDB_VERBOSE_DEFAULT: &str = "true";
pub const PROP_BASICDB_SIMULATE_DELAY: &str = "basicdb.simulatedelay";
pub const PROP_BASICDB_SIMULATE_DELAY_DEFAULT: &str = "0";
pub const PROP_BASICDB_RANDOMIZE_DELAY: &str = "basicdb.randomizedelay";
pub const PROP_BASICDB_RANDOMIZE_DELAY_DEFAULT: &str = "true";

pub const PROP_REPORT_LATENCY_FOR_EACH_ERROR: &str = "reportlatencyforeacherror";
pub const PROP_REPORT_LATENCY_FOR_EACH_ERROR_DEFAULT: &str = "false";
pub const PROP_LATENCY_TRACKED_ERRORS: &str = "latencytrackederrors";

// ── the bag itself ──

/// Ordered-insensitive string-to-string property map.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    map: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Value of `key`, or `default` when absent.
    pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.map.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: &str) -> Result<i64> {
        let raw = self.get_default(key, default);
        raw.trim()
            .parse()
            .map_err(|_| invalid(key, raw, "an integer"))
    }

    pub fn get_u64(&self, key: &str, default: &str) -> Result<u64> {
        let raw = self.get_default(key, default);
        raw.trim()
            .parse()
            .map_err(|_| invalid(key, raw, "a non-negative integer"))
    }

    pub fn get_f64(&self, key: &str, default: &str) -> Result<f64> {
        let raw = self.get_default(key, default);
        raw.trim()
            .parse()
            .map_err(|_| invalid(key, raw, "a number"))
    }

    pub fn get_bool(&self, key: &str, default: &str) -> Result<bool> {
        let raw = self.get_default(key, default);
        raw.trim()
            .parse()
            .map_err(|_| invalid(key, raw, "true or false"))
    }

    /// Merge `other` into `self`; values from `other` win.
    pub fn merge(&mut self, other: Properties) {
        self.map.extend(other.map);
    }

    /// Iterate in sorted key order (stable output for the property echo).
    pub fn iter_sorted(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut entries: Vec<_> = self
            .map
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort_unstable();
        entries.into_iter()
    }

    /// Load a workload property file.
    ///
    /// Lines are `key = value` with optional surrounding whitespace; empty
    /// lines and lines whose first non-blank character is `#` are ignored.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Properties> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read property file {}: {}", path.display(), e))
        })?;
        let mut props = Properties::new();
        for (lineno, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(Error::Config(format!(
                    "invalid property file {} line {}: {:?}",
                    path.display(),
                    lineno + 1,
                    line
                )));
            };
            props.set(key.trim(), value.trim());
        }
        Ok(props)
    }
}

fn invalid(key: &str, value: &str, expected: &str) -> Error {
    Error::Config(format!(
        "invalid property {}={:?}, expected {}",
        key, value, expected
    ))
}
