//! Fixed-bucket latency histogram.

use parking_lot::Mutex;

use crate::properties::{self, Properties};
use crate::Result;

use super::{ExportValue, MeasurementBase, MeasurementExporter, OneMeasurement};

struct HistogramState {
    /// One bucket per millisecond of latency.
    histogram: Vec<u64>,
    /// Operations beyond the histogram range.
    overflow: u64,
    operations: u64,
    /// Sum of latencies, microseconds.
    total_latency: u64,
    /// Sum of squared latencies, for the variance.
    total_squared_latency: f64,
    min: Option<u64>,
    max: Option<u64>,
    window_operations: u64,
    window_total_latency: u64,
}

/// Groups operations into 1-ms latency buckets plus an overflow counter.
/// Cheap and fixed-size, at the cost of percentile resolution above the
/// bucket width.
pub struct BucketHistogram {
    base: MeasurementBase,
    buckets: usize,
    state: Mutex<HistogramState>,
}

impl BucketHistogram {
    pub fn new(name: &str, props: &Properties) -> Result<Self> {
        let buckets = props.get_u64(
            properties::PROP_HISTOGRAM_BUCKETS,
            properties::PROP_HISTOGRAM_BUCKETS_DEFAULT,
        )? as usize;
        Ok(Self {
            base: MeasurementBase::new(name),
            buckets,
            state: Mutex::new(HistogramState {
                histogram: vec![0; buckets],
                overflow: 0,
                operations: 0,
                total_latency: 0,
                total_squared_latency: 0.0,
                min: None,
                max: None,
                window_operations: 0,
                window_total_latency: 0,
            }),
        })
    }
}

impl OneMeasurement for BucketHistogram {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn measure(&self, latency_us: u64) {
        let mut s = self.state.lock();
        let bucket = (latency_us / 1000) as usize;
        if bucket >= self.buckets {
            s.overflow += 1;
        } else {
            s.histogram[bucket] += 1;
        }
        s.operations += 1;
        s.total_latency += latency_us;
        s.total_squared_latency += (latency_us as f64) * (latency_us as f64);
        s.window_operations += 1;
        s.window_total_latency += latency_us;
        s.min = Some(s.min.map_or(latency_us, |m| m.min(latency_us)));
        s.max = Some(s.max.map_or(latency_us, |m| m.max(latency_us)));
    }

    fn summary(&self) -> String {
        let mut s = self.state.lock();
        if s.window_operations == 0 {
            return String::new();
        }
        let avg = s.window_total_latency as f64 / s.window_operations as f64;
        s.window_operations = 0;
        s.window_total_latency = 0;
        format!("[{} AverageLatency(us)={:.2}]", self.base.name(), avg)
    }

    fn export(&self, exporter: &mut dyn MeasurementExporter) -> Result<()> {
        let s = self.state.lock();
        let name = self.base.name();
        let mean = s.total_latency as f64 / s.operations as f64;
        let variance = s.total_squared_latency / s.operations as f64 - mean * mean;
        exporter.write(name, "Operations", s.operations.into())?;
        exporter.write(name, "AverageLatency(us)", mean.into())?;
        exporter.write(name, "LatencyVariance(us)", variance.into())?;
        exporter.write(name, "MinLatency(us)", s.min.unwrap_or(0).into())?;
        exporter.write(name, "MaxLatency(us)", s.max.unwrap_or(0).into())?;

        // Percentile bounds come from the cumulative bucket walk; the
        // reported value is the upper bound of the bucket that crosses the
        // threshold.
        let mut op_counter = 0u64;
        let mut done_95th = false;
        for (i, &count) in s.histogram.iter().enumerate() {
            op_counter += count;
            let percentage = op_counter as f64 / s.operations as f64;
            if !done_95th && percentage >= 0.95 {
                exporter.write(name, "95thPercentileLatency(us)", ((i as i64) * 1000).into())?;
                done_95th = true;
            }
            if percentage >= 0.99 {
                exporter.write(name, "99thPercentileLatency(us)", ((i as i64) * 1000).into())?;
                break;
            }
        }

        for (i, &count) in s.histogram.iter().enumerate() {
            exporter.write(name, &i.to_string(), ExportValue::Int(count as i64))?;
        }
        exporter.write(name, &format!(">{}", self.buckets), s.overflow.into())?;
        Ok(())
    }

    fn base(&self) -> &MeasurementBase {
        &self.base
    }
}
