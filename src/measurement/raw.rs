//! Raw measurement: every data point, exact percentiles.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::properties::{self, Properties};
use crate::{Error, Result};

use super::{MeasurementBase, MeasurementExporter, OneMeasurement};

struct RawDataPoint {
    timestamp_ms: u64,
    value_us: u64,
}

struct RawState {
    measurements: Vec<RawDataPoint>,
    total_latency: u64,
    window_operations: u64,
    window_total_latency: u64,
}

/// Records every single `(timestamp, latency)` observation without
/// down-sampling. Percentiles come from a sort at export time, so they are
/// exact rather than bucketed approximations. Memory grows with the
/// operation count; intended for modest runs or chained behind an HDR
/// histogram via `hdrhistogram+raw`.
pub struct RawMeasurement {
    base: MeasurementBase,
    file_path: String,
    no_summary: bool,
    state: Mutex<RawState>,
}

impl RawMeasurement {
    pub fn new(name: &str, props: &Properties) -> Result<Self> {
        let file_path = props
            .get_default(
                properties::PROP_RAW_OUTPUT_FILE,
                properties::PROP_RAW_OUTPUT_FILE_DEFAULT,
            )
            .to_string();
        if !file_path.is_empty() {
            // Open (and truncate) up front so a bad path fails at
            // configuration time, not at export.
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&file_path)
                .map_err(|e| Error::Config(format!("cannot open raw output file {}: {}", file_path, e)))?;
        }
        let no_summary = props.get_bool(
            properties::PROP_RAW_NO_SUMMARY,
            properties::PROP_RAW_NO_SUMMARY_DEFAULT,
        )?;
        Ok(Self {
            base: MeasurementBase::new(name),
            file_path,
            no_summary,
            state: Mutex::new(RawState {
                measurements: Vec::new(),
                total_latency: 0,
                window_operations: 0,
                window_total_latency: 0,
            }),
        })
    }

    fn write_points(&self, points: &[RawDataPoint]) -> Result<()> {
        let out: Box<dyn Write> = if self.file_path.is_empty() {
            Box::new(std::io::stdout())
        } else {
            Box::new(OpenOptions::new().append(true).open(&self.file_path)?)
        };
        let mut out = BufWriter::new(out);
        writeln!(out, "{} latency raw data: op, timestamp(ms), latency(us)", self.base.name())?;
        for p in points {
            writeln!(out, "{},{},{}", self.base.name(), p.timestamp_ms, p.value_us)?;
        }
        out.flush()?;
        Ok(())
    }
}

impl OneMeasurement for RawMeasurement {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn measure(&self, latency_us: u64) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut s = self.state.lock();
        s.total_latency += latency_us;
        s.window_total_latency += latency_us;
        s.window_operations += 1;
        s.measurements.push(RawDataPoint {
            timestamp_ms,
            value_us: latency_us,
        });
    }

    fn summary(&self) -> String {
        let mut s = self.state.lock();
        if s.window_operations == 0 {
            return String::new();
        }
        let avg = s.window_total_latency as f64 / s.window_operations as f64;
        s.window_operations = 0;
        s.window_total_latency = 0;
        format!("{} count: {}, average latency(us): {:.2}", self.base.name(), s.measurements.len(), avg)
    }

    fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        let s = self.state.lock();
        self.write_points(&s.measurements)?;

        let name = self.base.name();
        let total = s.measurements.len();
        exporter.write(name, "Total Operations", (total as i64).into())?;
        if total > 0 && !self.no_summary {
            exporter.write(name, "Average", (s.total_latency as f64 / total as f64).into())?;
            let mut sorted: Vec<u64> = s.measurements.iter().map(|p| p.value_us).collect();
            sorted.sort_unstable();
            let at = |q: f64| sorted[((total as f64 * q) as usize).min(total - 1)];
            exporter.write(name, "Min", sorted[0].into())?;
            exporter.write(name, "Max", sorted[total - 1].into())?;
            exporter.write(name, "p1", at(0.01).into())?;
            exporter.write(name, "p5", at(0.05).into())?;
            exporter.write(name, "p50", at(0.5).into())?;
            exporter.write(name, "p90", at(0.9).into())?;
            exporter.write(name, "p95", at(0.95).into())?;
            exporter.write(name, "p99", at(0.99).into())?;
            exporter.write(name, "p99.9", at(0.999).into())?;
            exporter.write(name, "p99.99", at(0.9999).into())?;
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

    fn raw_with_file(dir: &tempfile::TempDir) -> (RawMeasurement, std::path::PathBuf) {
        let path = dir.path().join("raw.csv");
        let mut p = Properties::new();
        p.set(properties::PROP_RAW_OUTPUT_FILE, path.to_str().unwrap());
        (RawMeasurement::new("READ", &p).unwrap(), path)
    }

    #[test]
    fn exact_percentiles_from_sorted_points() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _path) = raw_with_file(&dir);
        // 1000 points with values 1..=1000 us.
        for v in 1..=1000u64 {
            m.measure(v);
        }
        let buf = SharedBuf::default();
        let mut e = TextExporter::new(Box::new(buf.clone()));
        m.export(&mut e).unwrap();
        Box::new(e).close().unwrap();
        let out = buf.contents();
        assert!(out.contains("[READ], Total Operations, 1000"));
        assert!(out.contains("[READ], Min, 1\n"));
        assert!(out.contains("[READ], Max, 1000\n"));
        assert!(out.contains("[READ], p50, 501\n"));
        assert!(out.contains("[READ], p99, 991\n"));
    }

    #[test]
    fn raw_points_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let (m, path) = raw_with_file(&dir);
        m.measure(42);
        m.measure(43);
        let buf = SharedBuf::default();
        let mut e = TextExporter::new(Box::new(buf.clone()));
        m.export(&mut e).unwrap();
        Box::new(e).close().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("READ latency raw data: op, timestamp(ms), latency(us)"));
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().nth(1).unwrap().starts_with("READ,"));
        assert!(contents.lines().nth(1).unwrap().ends_with(",42"));
    }

    #[test]
    fn no_summary_suppresses_percentiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut p = Properties::new();
        p.set(properties::PROP_RAW_OUTPUT_FILE, path.to_str().unwrap());
        p.set(properties::PROP_RAW_NO_SUMMARY, "true");
        let m = RawMeasurement::new("READ", &p).unwrap();
        m.measure(10);
        let buf = SharedBuf::default();
        let mut e = TextExporter::new(Box::new(buf.clone()));
        m.export(&mut e).unwrap();
        Box::new(e).close().unwrap();
        let out = buf.contents();
        assert!(out.contains("Total Operations"));
        assert!(!out.contains("p99"));
    }

    #[test]
    fn bad_output_path_fails_at_construction() {
        let mut p = Properties::new();
        p.set(properties::PROP_RAW_OUTPUT_FILE, "/definitely/not/a/dir/raw.csv");
        assert!(RawMeasurement::new("READ", &p).is_err());
    }

    #[test]
    fn summary_reports_count_and_window_average() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _path) = raw_with_file(&dir);
        m.measure(100);
        m.measure(300);
        assert_eq!(m.summary(), "READ count: 2, average latency(us): 200.00");
        assert_eq!(m.summary(), "");
    }
}
