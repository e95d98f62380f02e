//! Time-series measurement: mean latency per wall-clock window.

use std::time::Instant;

use parking_lot::Mutex;

use crate::properties::{self, Properties};
use crate::Result;

use super::{MeasurementBase, MeasurementExporter, OneMeasurement};

struct TimeSeriesState {
    /// Closed windows: (window start in ms since measurement start, mean us).
    series: Vec<(u64, f64)>,
    current_start_ms: u64,
    window_sum: u64,
    window_count: u64,
    operations: u64,
    total_latency: u64,
    min: Option<u64>,
    max: Option<u64>,
    report_sum: u64,
    report_count: u64,
}

/// Slices the clock into `timeseries.granularity`-ms windows and emits the
/// mean latency of each window on export.
pub struct TimeSeriesMeasurement {
    base: MeasurementBase,
    granularity_ms: u64,
    start: Instant,
    state: Mutex<TimeSeriesState>,
}

impl TimeSeriesMeasurement {
    pub fn new(name: &str, props: &Properties) -> Result<Self> {
        let granularity_ms = props.get_u64(
            properties::PROP_GRANULARITY,
            properties::PROP_GRANULARITY_DEFAULT,
        )?;
        Ok(Self {
            base: MeasurementBase::new(name),
            granularity_ms: granularity_ms.max(1),
            start: Instant::now(),
            state: Mutex::new(TimeSeriesState {
                series: Vec::new(),
                current_start_ms: 0,
                window_sum: 0,
                window_count: 0,
                operations: 0,
                total_latency: 0,
                min: None,
                max: None,
                report_sum: 0,
                report_count: 0,
            }),
        })
    }

    fn close_window(state: &mut TimeSeriesState, now_ms: u64, granularity_ms: u64) {
        if state.window_count > 0 {
            let mean = state.window_sum as f64 / state.window_count as f64;
            state.series.push((state.current_start_ms, mean));
        }
        state.window_sum = 0;
        state.window_count = 0;
        state.current_start_ms = now_ms / granularity_ms * granularity_ms;
    }
}

impl OneMeasurement for TimeSeriesMeasurement {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn measure(&self, latency_us: u64) {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let mut s = self.state.lock();
        if now_ms >= s.current_start_ms + self.granularity_ms {
            Self::close_window(&mut s, now_ms, self.granularity_ms);
        }
        s.window_sum += latency_us;
        s.window_count += 1;
        s.operations += 1;
        s.total_latency += latency_us;
        s.report_sum += latency_us;
        s.report_count += 1;
        s.min = Some(s.min.map_or(latency_us, |m| m.min(latency_us)));
        s.max = Some(s.max.map_or(latency_us, |m| m.max(latency_us)));
    }

    fn summary(&self) -> String {
        let mut s = self.state.lock();
        if s.report_count == 0 {
            return String::new();
        }
        let avg = s.report_sum as f64 / s.report_count as f64;
        s.report_sum = 0;
        s.report_count = 0;
        format!("[{} AverageLatency(us)={:.2}]", self.base.name(), avg)
    }

    fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let mut s = self.state.lock();
        // The open window still holds data; close it so the tail shows up.
        Self::close_window(&mut s, now_ms, self.granularity_ms);

        let name = self.base.name();
        exporter.write(name, "Operations", s.operations.into())?;
        if s.operations > 0 {
            let mean = s.total_latency as f64 / s.operations as f64;
            exporter.write(name, "AverageLatency(us)", mean.into())?;
        }
        exporter.write(name, "MinLatency(us)", s.min.unwrap_or(0).into())?;
        exporter.write(name, "MaxLatency(us)", s.max.unwrap_or(0).into())?;
        for &(start_ms, mean) in &s.series {
            exporter.write(name, &start_ms.to_string(), mean.into())?;
        }
        Ok(())
    }

    fn base(&self) -> &MeasurementBase {
        &self.base
    }
}
