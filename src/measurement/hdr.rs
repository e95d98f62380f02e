//! HDR-histogram measurement with optional snapshot logging.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use hdrhistogram::serialization::{Deserializer, Serializer, V2Serializer};
use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::properties::{self, Properties};
use crate::{Error, Result};

use super::{MeasurementBase, MeasurementExporter, OneMeasurement};

// Histogram bounds: one-microsecond resolution up to 60 000 s, three
// significant figures.
const HDR_MAX_VALUE: u64 = 60_000_000_000;
const HDR_SIGFIGS: u8 = 3;

/// Appends histogram snapshots to a writer in the crate's V2 format. The
/// stream is a simple concatenation; [`HistogramLogReader`] walks it back.
pub struct HistogramLogWriter<W: Write> {
    out: W,
    serializer: V2Serializer,
}

impl<W: Write> HistogramLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            serializer: V2Serializer::new(),
        }
    }

    pub fn output(&mut self, histogram: &Histogram<u64>) -> Result<()> {
        self.serializer
            .serialize(histogram, &mut self.out)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, format!("{:?}", e))))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads back the snapshot stream written by [`HistogramLogWriter`].
pub struct HistogramLogReader<R: Read> {
    input: R,
    deserializer: Deserializer,
}

impl<R: Read> HistogramLogReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            deserializer: Deserializer::new(),
        }
    }

    /// The next histogram in the stream, or `None` at end of input.
    pub fn next_histogram(&mut self) -> Option<Histogram<u64>> {
        self.deserializer.deserialize(&mut self.input).ok()
    }
}

struct HdrState {
    histogram: Histogram<u64>,
    writer: Option<HistogramLogWriter<BufWriter<File>>>,
}

/// Logarithmic-precision latency histogram backed by the `hdrhistogram`
/// crate. Exports the configured percentiles (`hdrhistogram.percentiles`);
/// with `hdrhistogram.fileoutput=true` every summary tick also appends a
/// snapshot to `hdrhistogram.output.path`.
pub struct HdrHistogramMeasurement {
    base: MeasurementBase,
    percentiles: Vec<i64>,
    state: Mutex<HdrState>,
}

fn parse_percentile_values(prop: &str, default: &str) -> Vec<i64> {
    let parsed: std::result::Result<Vec<i64>, _> =
        prop.split(',').map(|p| p.trim().parse::<i64>()).collect();
    match parsed {
        Ok(values) if !values.is_empty() => values,
        // A malformed list falls back to the default rather than aborting
        // the run.
        _ => default
            .split(',')
            .map(|p| p.parse().expect("default percentiles parse"))
            .collect(),
    }
}

fn ordinal(p: i64) -> String {
    let suffix = match p % 100 {
        11..=13 => "th",
        _ => match p % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{}{}", p, suffix)
}

impl HdrHistogramMeasurement {
    pub fn new(name: &str, props: &Properties) -> Result<Self> {
        let percentiles = parse_percentile_values(
            props.get_default(
                properties::PROP_HDR_PERCENTILES,
                properties::PROP_HDR_PERCENTILES_DEFAULT,
            ),
            properties::PROP_HDR_PERCENTILES_DEFAULT,
        );
        let file_output = props.get_bool(
            properties::PROP_HDR_FILE_OUTPUT,
            properties::PROP_HDR_FILE_OUTPUT_DEFAULT,
        )?;
        let writer = if file_output {
            let path = props.get_default(
                properties::PROP_HDR_OUTPUT_PATH,
                properties::PROP_HDR_OUTPUT_PATH_DEFAULT,
            );
            if path.is_empty() {
                return Err(Error::Config(format!(
                    "{}=true requires {}",
                    properties::PROP_HDR_FILE_OUTPUT,
                    properties::PROP_HDR_OUTPUT_PATH
                )));
            }
            let file = open_log_file(Path::new(path), name)?;
            Some(HistogramLogWriter::new(BufWriter::new(file)))
        } else {
            None
        };
        let histogram = Histogram::new_with_bounds(1, HDR_MAX_VALUE, HDR_SIGFIGS)
            .map_err(|e| Error::Config(format!("cannot build hdr histogram: {:?}", e)))?;
        Ok(Self {
            base: MeasurementBase::new(name),
            percentiles,
            state: Mutex::new(HdrState { histogram, writer }),
        })
    }
}

/// One log file per metric: the metric name is appended to the configured
/// path so concurrent aggregators never interleave snapshots.
fn open_log_file(path: &Path, name: &str) -> Result<File> {
    let file_name = match path.file_name() {
        Some(base) => format!("{}.{}", base.to_string_lossy(), name),
        None => name.to_string(),
    };
    let full = path.with_file_name(file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&full)
        .map_err(|e| Error::Config(format!("cannot open hdr log {}: {}", full.display(), e)))
}

impl OneMeasurement for HdrHistogramMeasurement {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn measure(&self, latency_us: u64) {
        let mut s = self.state.lock();
        let clamped = latency_us.clamp(1, HDR_MAX_VALUE);
        let _ = s.histogram.record(clamped);
    }

    // Called periodically from the status reporter; the snapshot log, when
    // enabled, is written on this cadence.
    fn summary(&self) -> String {
        let mut s = self.state.lock();
        if let Some(writer) = s.writer.take() {
            let mut writer = writer;
            if let Err(e) = writer.output(&s.histogram) {
                tracing::error!(error = %e, "failed to append hdr snapshot");
            }
            s.writer = Some(writer);
        }
        if s.histogram.is_empty() {
            return String::new();
        }
        format!(
            "[{}: Count={}, Max={}, Min={}, Avg={:.2}, 90={}, 99={}, 99.9={}, 99.99={}]",
            self.base.name(),
            s.histogram.len(),
            s.histogram.max(),
            s.histogram.min(),
            s.histogram.mean(),
            s.histogram.value_at_quantile(0.90),
            s.histogram.value_at_quantile(0.99),
            s.histogram.value_at_quantile(0.999),
            s.histogram.value_at_quantile(0.9999),
        )
    }

    fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        let mut s = self.state.lock();
        if let Some(writer) = s.writer.take() {
            let mut writer = writer;
            writer.output(&s.histogram)?;
            writer.flush()?;
            // Dropped here: the log is complete once the run exports.
        }
        let name = self.base.name();
        exporter.write(name, "Operations", s.histogram.len().into())?;
        exporter.write(name, "AverageLatency(us)", s.histogram.mean().into())?;
        exporter.write(name, "MinLatency(us)", s.histogram.min().into())?;
        exporter.write(name, "MaxLatency(us)", s.histogram.max().into())?;
        for &p in &self.percentiles {
            exporter.write(
                name,
                &format!("{}PercentileLatency(us)", ordinal(p)),
                s.histogram.value_at_quantile(p as f64 / 100.0).into(),
            )?;
        }
        Ok(())
    }

    fn base(&self) -> &MeasurementBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::super::exporter::test_support::SharedBuf;
    use super::super::exporter::TextExporter;
    use super::*;

    #[test]
    fn ordinals() {
        assert_eq!(ordinal(95), "95th");
        assert_eq!(ordinal(99), "99th");
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
    }

    #[test]
    fn percentile_list_falls_back_on_garbage() {
        assert_eq!(parse_percentile_values("95,99", "95,99"), vec![95, 99]);
        assert_eq!(parse_percentile_values("50, 90, 99", "95,99"), vec![50, 90, 99]);
        assert_eq!(parse_percentile_values("ninety", "95,99"), vec![95, 99]);
    }

    #[test]
    fn export_contains_percentiles() {
        let p = Properties::new();
        let m = HdrHistogramMeasurement::new("READ", &p).unwrap();
        for i in 1..=1000u64 {
            m.measure(i);
        }
        let buf = SharedBuf::default();
        let mut e = TextExporter::new(Box::new(buf.clone()));
        m.export(&mut e).unwrap();
        Box::new(e).close().unwrap();
        let out = buf.contents();
        assert!(out.contains("[READ], Operations, 1000"));
        assert!(out.contains("95thPercentileLatency(us)"));
        assert!(out.contains("99thPercentileLatency(us)"));
        let p95_line = out.lines().find(|l| l.contains("95th")).unwrap();
        let p95: f64 = p95_line.rsplit(", ").next().unwrap().parse().unwrap();
        assert!((900.0..=1000.0).contains(&p95), "p95 = {}", p95);
    }

    #[test]
    fn snapshot_log_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hdr.log");
        let mut p = Properties::new();
        p.set(properties::PROP_HDR_FILE_OUTPUT, "true");
        p.set(properties::PROP_HDR_OUTPUT_PATH, path.to_str().unwrap());
        let m = HdrHistogramMeasurement::new("READ", &p).unwrap();
        for i in 1..=100u64 {
            m.measure(i * 10);
        }
        let _ = m.summary();
        let buf = SharedBuf::default();
        let mut e = TextExporter::new(Box::new(buf.clone()));
        m.export(&mut e).unwrap();
        Box::new(e).close().unwrap();

        let log = path.with_file_name("hdr.log.READ");
        let file = File::open(log).unwrap();
        let mut reader = HistogramLogReader::new(file);
        let first = reader.next_histogram().expect("snapshot from summary");
        assert_eq!(first.len(), 100);
        let second = reader.next_histogram().expect("snapshot from export");
        assert_eq!(second.len(), 100);
        assert!(reader.next_histogram().is_none());
    }

    #[test]
    fn file_output_without_path_is_a_config_error() {
        let mut p = Properties::new();
        p.set(properties::PROP_HDR_FILE_OUTPUT, "true");
        assert!(HdrHistogramMeasurement::new("READ", &p).is_err());
    }
}
