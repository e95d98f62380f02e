//! The storage-adapter contract and the measuring wrapper.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::measurement::Measurements;
use crate::properties::{self, Properties};
use crate::Result;

/// Outcome of one adapter operation.
///
/// The harness never converts a status into an error: statuses are counted
/// and attached to latency metrics, and the run keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Ok,
    Error,
    NotFound,
    NotImplemented,
    UnexpectedState,
    BadRequest,
    Forbidden,
    ServiceUnavailable,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::NotFound => "NOT_FOUND",
            Status::NotImplemented => "NOT_IMPLEMENTED",
            Status::UnexpectedState => "UNEXPECTED_STATE",
            Status::BadRequest => "BAD_REQUEST",
            Status::Forbidden => "FORBIDDEN",
            Status::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        };
        f.write_str(s)
    }
}

/// A record: field name to binary value.
pub type Row = HashMap<String, Vec<u8>>;

/// A layer for accessing the store being benchmarked. Each worker gets its
/// own instance of the chosen adapter.
///
/// The harness treats the returned [`Status`] as authoritative and makes no
/// assumption about durability; whether an insert of an existing key
/// overwrites or fails is the adapter's business, as long as the status
/// says which.
pub trait Db: Send {
    /// Initialise per-worker state. Called once, before the worker loop.
    fn init(&mut self) -> Result<()>;

    /// Tear down per-worker state. Called once, after the worker loop.
    fn cleanup(&mut self) -> Result<()>;

    /// Read one record. An empty `fields` slice means all fields.
    fn read(&mut self, table: &str, key: &str, fields: &[String]) -> (Row, Status);

    /// Range-scan `record_count` records starting at `start_key`.
    fn scan(&mut self, table: &str, start_key: &str, record_count: i64, fields: &[String]) -> (Vec<Row>, Status);

    /// Overwrite the given fields of an existing record.
    fn update(&mut self, table: &str, key: &str, values: &Row) -> Status;

    /// Insert a record.
    fn insert(&mut self, table: &str, key: &str, values: &Row) -> Status;

    /// Delete a record.
    fn delete(&mut self, table: &str, key: &str) -> Status;
}

/// Wraps an adapter, measuring the latency of every call and tallying the
/// returned statuses in the measurement registry.
pub struct DbWrapper {
    inner: Box<dyn Db>,
    measurements: Arc<Measurements>,
    report_latency_for_each_error: bool,
    latency_tracked_errors: Vec<String>,
}

impl DbWrapper {
    pub fn new(inner: Box<dyn Db>, measurements: Arc<Measurements>, props: &Properties) -> Result<Self> {
        let report_latency_for_each_error = props.get_bool(
            properties::PROP_REPORT_LATENCY_FOR_EACH_ERROR,
            properties::PROP_REPORT_LATENCY_FOR_EACH_ERROR_DEFAULT,
        )?;
        let latency_tracked_errors = if report_latency_for_each_error {
            Vec::new()
        } else {
            props
                .get(properties::PROP_LATENCY_TRACKED_ERRORS)
                .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
                .unwrap_or_default()
        };
        Ok(Self {
            inner,
            measurements,
            report_latency_for_each_error,
            latency_tracked_errors,
        })
    }

    pub fn measurements(&self) -> &Arc<Measurements> {
        &self.measurements
    }

    /// Metric name for an operation outcome: `<OP>` when it succeeded,
    /// `<OP>-<STATUS>` when that status is individually tracked, and
    /// `<OP>-FAILED` otherwise.
    fn measurement_name(&self, op: &str, status: Status) -> String {
        if status.is_ok() {
            return op.to_string();
        }
        let status_str = status.to_string();
        if self.report_latency_for_each_error || self.latency_tracked_errors.iter().any(|e| *e == status_str) {
            format!("{}-{}", op, status_str)
        } else {
            format!("{}-FAILED", op)
        }
    }

    fn measure(&self, op: &str, status: Status, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        let name = self.measurement_name(op, status);
        self.measurements.measure(&name, latency_us);
    }

    pub fn init(&mut self) -> Result<()> {
        self.inner.init()
    }

    pub fn cleanup(&mut self) -> Result<()> {
        let start = Instant::now();
        self.inner.cleanup()?;
        self.measure("CLEANUP", Status::Ok, start);
        Ok(())
    }

    pub fn read(&mut self, table: &str, key: &str, fields: &[String]) -> (Row, Status) {
        let start = Instant::now();
        let (row, status) = self.inner.read(table, key, fields);
        self.measure("READ", status, start);
        self.measurements.report_status("READ", status);
        (row, status)
    }

    pub fn scan(&mut self, table: &str, start_key: &str, record_count: i64, fields: &[String]) -> (Vec<Row>, Status) {
        let start = Instant::now();
        let (rows, status) = self.inner.scan(table, start_key, record_count, fields);
        self.measure("SCAN", status, start);
        self.measurements.report_status("SCAN", status);
        (rows, status)
    }

    pub fn update(&mut self, table: &str, key: &str, values: &Row) -> Status {
        let start = Instant::now();
        let status = self.inner.update(table, key, values);
        self.measure("UPDATE", status, start);
        self.measurements.report_status("UPDATE", status);
        status
    }

    pub fn insert(&mut self, table: &str, key: &str, values: &Row) -> Status {
        let start = Instant::now();
        let status = self.inner.insert(table, key, values);
        self.measure("INSERT", status, start);
        self.measurements.report_status("INSERT", status);
        status
    }

    pub fn delete(&mut self, table: &str, key: &str) -> Status {
        let start = Instant::now();
        let status = self.inner.delete(table, key);
        self.measure("DELETE", status, start);
        self.measurements.report_status("DELETE", status);
        status
    }
}

/// Build the adapter registered under `name` and wrap it for measurement.
pub fn create_db(name: &str, props: &Properties, measurements: Arc<Measurements>) -> Result<DbWrapper> {
    let inner = crate::adapters::create_adapter(name, props)?;
    DbWrapper::new(inner, measurements, props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::exporter::test_support::SharedBuf;
    use crate::measurement::exporter::MeasurementExporter;
    use crate::measurement::exporter::TextExporter;

    struct StubDb {
        read_status: Status,
    }

    impl Db for StubDb {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn cleanup(&mut self) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, _table: &str, _key: &str, _fields: &[String]) -> (Row, Status) {
            (Row::new(), self.read_status)
        }

        fn scan(&mut self, _table: &str, _start_key: &str, _n: i64, _fields: &[String]) -> (Vec<Row>, Status) {
            (Vec::new(), Status::Ok)
        }

        fn update(&mut self, _table: &str, _key: &str, _values: &Row) -> Status {
            Status::Ok
        }

        fn insert(&mut self, _table: &str, _key: &str, _values: &Row) -> Status {
            Status::Ok
        }

        fn delete(&mut self, _table: &str, _key: &str) -> Status {
            Status::Ok
        }
    }

    fn measurements() -> Arc<Measurements> {
        let mut p = Properties::new();
        p.set(properties::PROP_MEASUREMENT_TYPE, "histogram");
        Measurements::new(&p).unwrap()
    }

    fn export_to_string(m: &Arc<Measurements>) -> String {
        let buf = SharedBuf::default();
        let mut e = TextExporter::new(Box::new(buf.clone()));
        m.export(&mut e).unwrap();
        Box::new(e).close().unwrap();
        buf.contents()
    }

    #[test]
    fn ok_operations_measure_under_the_op_name() {
        let m = measurements();
        let mut db = DbWrapper::new(
            Box::new(StubDb { read_status: Status::Ok }),
            Arc::clone(&m),
            &Properties::new(),
        )
        .unwrap();
        db.read("t", "user1", &[]);
        let out = export_to_string(&m);
        assert!(out.contains("[READ], Operations, 1"));
        assert!(out.contains("[READ], Return=OK, 1"));
    }

    #[test]
    fn failures_measure_under_op_failed_by_default() {
        let m = measurements();
        let mut db = DbWrapper::new(
            Box::new(StubDb { read_status: Status::NotFound }),
            Arc::clone(&m),
            &Properties::new(),
        )
        .unwrap();
        db.read("t", "user1", &[]);
        let out = export_to_string(&m);
        assert!(out.contains("[READ-FAILED], Operations, 1"));
        assert!(out.contains("[READ], Return=NOT_FOUND, 1"));
    }

    #[test]
    fn tracked_errors_get_their_own_metric() {
        let m = measurements();
        let mut p = Properties::new();
        p.set(properties::PROP_LATENCY_TRACKED_ERRORS, "NOT_FOUND");
        let mut db = DbWrapper::new(
            Box::new(StubDb { read_status: Status::NotFound }),
            Arc::clone(&m),
            &p,
        )
        .unwrap();
        db.read("t", "user1", &[]);
        let out = export_to_string(&m);
        assert!(out.contains("[READ-NOT_FOUND], Operations, 1"));
    }

    #[test]
    fn per_error_latency_reporting() {
        let m = measurements();
        let mut p = Properties::new();
        p.set(properties::PROP_REPORT_LATENCY_FOR_EACH_ERROR, "true");
        let mut db = DbWrapper::new(
            Box::new(StubDb { read_status: Status::ServiceUnavailable }),
            Arc::clone(&m),
            &p,
        )
        .unwrap();
        db.read("t", "user1", &[]);
        let out = export_to_string(&m);
        assert!(out.contains("[READ-SERVICE_UNAVAILABLE], Operations, 1"));
    }

    #[test]
    fn cleanup_is_timed() {
        let m = measurements();
        let mut db = DbWrapper::new(
            Box::new(StubDb { read_status: Status::Ok }),
            Arc::clone(&m),
            &Properties::new(),
        )
        .unwrap();
        db.cleanup().unwrap();
        let out = export_to_string(&m);
        assert!(out.contains("[CLEANUP], Operations, 1"));
    }
}
