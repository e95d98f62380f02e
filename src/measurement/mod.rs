//! Latency measurement: the per-operation aggregator registry and the
//! aggregator implementations.
//!
//! The registry owns exactly one aggregator per operation name, created
//! lazily on first use. Lookups take a shared lock (the hot path once all
//! operation names have been seen); a miss upgrades to the write lock and
//! re-checks before inserting, so concurrent first use never creates two
//! aggregators for one name.

pub mod exporter;
mod hdr;
mod histogram;
mod raw;
mod timeseries;

pub use exporter::{create_exporter, ExportValue, MeasurementExporter};
pub use hdr::{HdrHistogramMeasurement, HistogramLogReader, HistogramLogWriter};
pub use histogram::BucketHistogram;
pub use raw::RawMeasurement;
pub use timeseries::TimeSeriesMeasurement;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::db::Status;
use crate::properties::{self, Properties};
use crate::{Error, Result};

/// Which aggregator backs each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementType {
    Histogram,
    HdrHistogram,
    HdrHistogramAndHistogram,
    HdrHistogramAndRaw,
    TimeSeries,
    Raw,
}

impl FromStr for MeasurementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "histogram" => Ok(Self::Histogram),
            "hdrhistogram" => Ok(Self::HdrHistogram),
            "hdrhistogram+histogram" => Ok(Self::HdrHistogramAndHistogram),
            "hdrhistogram+raw" => Ok(Self::HdrHistogramAndRaw),
            "timeseries" => Ok(Self::TimeSeries),
            "raw" => Ok(Self::Raw),
            other => Err(Error::Config(format!("unknown measurementtype: {}", other))),
        }
    }
}

/// Shared bookkeeping embedded in every aggregator: the metric name and the
/// per-status return-code tally.
pub struct MeasurementBase {
    name: String,
    status_counts: Mutex<BTreeMap<Status, u64>>,
}

impl MeasurementBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status_counts: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn report_status(&self, status: Status) {
        *self.status_counts.lock().entry(status).or_insert(0) += 1;
    }

    pub fn export_status_counts(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        for (status, count) in self.status_counts.lock().iter() {
            exporter.write(&self.name, &format!("Return={}", status), (*count).into())?;
        }
        Ok(())
    }
}

/// A single measured metric, e.g. `READ` latency.
///
/// `measure` is called concurrently from all workers; implementations
/// serialise their state internally.
pub trait OneMeasurement: Send + Sync {
    fn name(&self) -> &str;

    /// Record one latency observation, in microseconds.
    fn measure(&self, latency_us: u64);

    /// One-line summary of the window since the previous summary call.
    /// Empty when nothing happened in the window.
    fn summary(&self) -> String;

    /// Serialise the final state of the metric.
    fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()>;

    fn base(&self) -> &MeasurementBase;

    fn report_status(&self, status: Status) {
        self.base().report_status(status);
    }
}

/// Forwards to two aggregators; backs the `hdrhistogram+histogram` and
/// `hdrhistogram+raw` measurement types.
pub struct TwoInOneMeasurement {
    base: MeasurementBase,
    thing1: Box<dyn OneMeasurement>,
    thing2: Box<dyn OneMeasurement>,
}

impl TwoInOneMeasurement {
    pub fn new(name: impl Into<String>, thing1: Box<dyn OneMeasurement>, thing2: Box<dyn OneMeasurement>) -> Self {
        Self {
            base: MeasurementBase::new(name),
            thing1,
            thing2,
        }
    }
}

impl OneMeasurement for TwoInOneMeasurement {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn measure(&self, latency_us: u64) {
        self.thing1.measure(latency_us);
        self.thing2.measure(latency_us);
    }

    fn summary(&self) -> String {
        format!("{}\n{}", self.thing1.summary(), self.thing2.summary())
    }

    fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        self.thing1.export(exporter)?;
        self.thing2.export(exporter)?;
        Ok(())
    }

    fn base(&self) -> &MeasurementBase {
        &self.base
    }
}

/// The per-operation aggregator registry.
pub struct Measurements {
    kind: MeasurementType,
    props: Properties,
    ops: RwLock<BTreeMap<String, Arc<dyn OneMeasurement>>>,
}

impl Measurements {
    pub fn new(props: &Properties) -> Result<Arc<Self>> {
        let kind: MeasurementType = props
            .get_default(
                properties::PROP_MEASUREMENT_TYPE,
                properties::PROP_MEASUREMENT_TYPE_DEFAULT,
            )
            .parse()?;
        let interval = props.get_default(
            properties::PROP_MEASUREMENT_INTERVAL,
            properties::PROP_MEASUREMENT_INTERVAL_DEFAULT,
        );
        match interval {
            "op" => {}
            "intended" | "both" => {
                tracing::warn!(
                    interval,
                    "intended-latency measurement is not wired; recording per-op latency"
                );
            }
            other => {
                return Err(Error::Config(format!(
                    "invalid property {}={:?}, expected op, intended or both",
                    properties::PROP_MEASUREMENT_INTERVAL,
                    other
                )))
            }
        }
        Ok(Arc::new(Self {
            kind,
            props: props.clone(),
            ops: RwLock::new(BTreeMap::new()),
        }))
    }

    /// Record one latency observation for `operation`.
    pub fn measure(&self, operation: &str, latency_us: u64) {
        self.op_measurement(operation).measure(latency_us);
    }

    /// Tally the status of one call of `operation`.
    pub fn report_status(&self, operation: &str, status: Status) {
        self.op_measurement(operation).report_status(status);
    }

    /// One-line snapshot across all operations, for the status reporter.
    pub fn summary(&self) -> String {
        let ops = self.ops.read();
        let mut parts = Vec::with_capacity(ops.len());
        for m in ops.values() {
            let s = m.summary();
            if !s.is_empty() {
                parts.push(s);
            }
        }
        parts.join(" ")
    }

    /// Serialise every aggregator and its status tallies.
    pub fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        let ops = self.ops.read();
        for m in ops.values() {
            m.export(exporter)?;
            m.base().export_status_counts(exporter)?;
        }
        Ok(())
    }

    /// Names of every operation that has been measured so far.
    pub fn op_names(&self) -> Vec<String> {
        self.ops.read().keys().cloned().collect()
    }

    fn op_measurement(&self, operation: &str) -> Arc<dyn OneMeasurement> {
        if let Some(m) = self.ops.read().get(operation) {
            return Arc::clone(m);
        }
        let mut ops = self.ops.write();
        if let Some(m) = ops.get(operation) {
            return Arc::clone(m);
        }
        // Aggregator construction can touch the filesystem (raw output,
        // hdr log); a failure here is a misconfiguration and fatal.
        match self.construct(operation) {
            Ok(m) => {
                ops.insert(operation.to_string(), Arc::clone(&m));
                m
            }
            Err(e) => {
                eprintln!("fatal: cannot create measurement for {}: {}", operation, e);
                std::process::exit(1);
            }
        }
    }

    fn construct(&self, name: &str) -> Result<Arc<dyn OneMeasurement>> {
        let m: Arc<dyn OneMeasurement> = match self.kind {
            MeasurementType::Histogram => Arc::new(BucketHistogram::new(name, &self.props)?),
            MeasurementType::HdrHistogram => Arc::new(HdrHistogramMeasurement::new(name, &self.props)?),
            MeasurementType::HdrHistogramAndHistogram => Arc::new(TwoInOneMeasurement::new(
                name,
                Box::new(HdrHistogramMeasurement::new(name, &self.props)?),
                Box::new(BucketHistogram::new(name, &self.props)?),
            )),
            MeasurementType::HdrHistogramAndRaw => Arc::new(TwoInOneMeasurement::new(
                name,
                Box::new(HdrHistogramMeasurement::new(name, &self.props)?),
                Box::new(RawMeasurement::new(name, &self.props)?),
            )),
            MeasurementType::TimeSeries => Arc::new(TimeSeriesMeasurement::new(name, &self.props)?),
            MeasurementType::Raw => Arc::new(RawMeasurement::new(name, &self.props)?),
        };
        Ok(m)
    }
}
