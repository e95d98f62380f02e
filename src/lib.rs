//! kvbench — a YCSB-lineage benchmark harness for key-value and record
//! stores.
//!
//! The crate drives a configurable synthetic workload of
//! create/read/update/delete/scan operations against a pluggable storage
//! adapter, measures per-operation latency and throughput, and exports
//! summary reports. The interesting machinery lives in three places: the
//! request distribution generators ([`generator`]), the concurrent latency
//! aggregation registry ([`measurement`]), and the worker/throttling
//! pipeline ([`client`]).

pub mod adapters;
pub mod client;
pub mod db;
pub mod generator;
pub mod measurement;
pub mod properties;
pub mod random;
pub mod shell;
pub mod workload;

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Adapter operation outcomes are *not* errors — they travel as
/// [`db::Status`] values and are tallied, never raised. `Error` covers the
/// genuinely fatal paths: bad configuration, sink I/O, and adapter
/// construction.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Database(String),
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Database(s) => write!(f, "Database error: {}", s),
            Error::Config(s) => write!(f, "Config error: {}", s),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
