//! The client driver: spawns workers, paces them against the target rate,
//! reports progress, and collates results into the exporter.

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, select, Receiver, Sender};

use crate::db::{create_db, DbWrapper};
use crate::measurement::{create_exporter, Measurements};
use crate::properties::{self, Properties};
use crate::random;
use crate::workload::{create_workload, Workload};
use crate::{Error, Result};

/// Outcome of a benchmark run, for the caller that prints the overall
/// metrics.
pub struct RunSummary {
    pub total_ops: u64,
    pub runtime: Duration,
}

/// Per-worker counters shared with the status reporter. Reads are atomic
/// but the sum across workers is not a consistent snapshot, which is fine
/// for progress reporting.
struct WorkerStats {
    op_done: AtomicU64,
    op_count: u64,
}

impl WorkerStats {
    fn ops_done(&self) -> u64 {
        self.op_done.load(Ordering::Relaxed)
    }

    fn ops_todo(&self) -> u64 {
        self.op_count.saturating_sub(self.ops_done())
    }
}

/// A single benchmark thread: drives the shared workload against its own
/// adapter instance until its share of operations is done, the stop signal
/// arrives, or the workload gives up.
struct Worker {
    db: DbWrapper,
    workload: Arc<dyn Workload>,
    do_transactions: bool,
    op_count: u64,
    target_ops_per_ms: f64,
    target_ops_tick_ns: u64,
    stats: Arc<WorkerStats>,
    stop_rx: Receiver<()>,
    result_tx: Sender<u64>,
}

impl Worker {
    fn run(mut self) {
        if let Err(e) = self.db.init() {
            tracing::error!(error = %e, "worker failed to init db");
            let _ = self.result_tx.send(0);
            return;
        }

        // At very low rates, spread the workers over the tick so they do
        // not all hit the store in lockstep.
        if self.target_ops_per_ms > 0.0 && self.target_ops_per_ms <= 1.0 {
            let delay = random::next_i64_below(self.target_ops_tick_ns as i64);
            thread::sleep(Duration::from_nanos(delay as u64));
        }

        let start = Instant::now();
        let mut done: u64 = 0;
        while self.op_count == 0 || done < self.op_count {
            if self.stop_rx.try_recv().is_ok() || self.workload.stop_requested() {
                break;
            }
            let keep_going = if self.do_transactions {
                self.workload.do_transaction(&mut self.db)
            } else {
                self.workload.do_insert(&mut self.db)
            };
            if !keep_going {
                break;
            }
            done += 1;
            self.stats.op_done.store(done, Ordering::Relaxed);
            self.throttle(start, done);
        }

        if let Err(e) = self.db.cleanup() {
            tracing::error!(error = %e, "worker failed to clean up db");
        }
        let _ = self.result_tx.send(done);
    }

    /// Sleep until the deadline of the `done`-th operation. Anchoring the
    /// deadline at the loop start self-corrects drift: a slow operation
    /// shortens the following waits until the worker is back on schedule.
    fn throttle(&self, start: Instant, done: u64) {
        if self.target_ops_per_ms > 0.0 {
            let deadline = start + Duration::from_nanos(done * self.target_ops_tick_ns);
            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            }
        }
    }
}

/// Periodically prints elapsed time, completed operations, throughput, an
/// ETA, and the registry's one-line latency summary. Writes to stderr so
/// exporter output on stdout stays parseable.
struct StatusReporter {
    stats: Vec<Arc<WorkerStats>>,
    measurements: Arc<Measurements>,
    interval: Duration,
    label: String,
    stop_rx: Receiver<()>,
}

impl StatusReporter {
    fn run(self) {
        let start = Instant::now();
        let mut last_total: u64 = 0;
        let mut last_tick = start;
        loop {
            let stopped = select! {
                recv(self.stop_rx) -> _ => true,
                recv(after(self.interval)) -> _ => false,
            };
            let now = Instant::now();
            last_total = self.report(start, last_tick, now, last_total);
            last_tick = now;
            if stopped {
                return;
            }
        }
    }

    fn report(&self, start: Instant, last_tick: Instant, now: Instant, last_total: u64) -> u64 {
        let total: u64 = self.stats.iter().map(|s| s.ops_done()).sum();
        let todo: u64 = self.stats.iter().map(|s| s.ops_todo()).sum();
        let elapsed = now.duration_since(start);
        if elapsed.is_zero() {
            return total;
        }
        let throughput = total as f64 / elapsed.as_secs_f64();
        let interval_s = now.duration_since(last_tick).as_secs_f64();

        let mut line = format!(
            "{}{} sec: {} operations; ",
            self.label,
            elapsed.as_secs(),
            total
        );
        if total > 0 {
            line.push_str(&format!("{:.2} ops/sec; ", throughput));
            if interval_s > 0.0 {
                let current = (total - last_total) as f64 / interval_s;
                line.push_str(&format!("{:.2} current ops/sec; ", current));
            }
        }
        if todo > 0 && throughput > 0.0 {
            let remaining = (todo as f64 / throughput).ceil() as u64;
            line.push_str(&format!("est completion in {}; ", format_remaining(remaining)));
        }
        line.push_str(&self.measurements.summary());
        eprintln!("{}", line.trim_end());
        total
    }
}

/// Render a second count in the largest useful units.
fn format_remaining(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{} days ", days));
    }
    if hours > 0 {
        out.push_str(&format!("{} hours ", hours));
    }
    if days == 0 && minutes > 0 {
        out.push_str(&format!("{} minutes ", minutes));
    }
    if seconds < 60 {
        out.push_str(&format!("{} seconds ", seconds));
    }
    out.trim_end().to_string()
}

/// This worker's share of the total operation count.
fn ops_for_worker(total: u64, index: u64, workers: u64) -> u64 {
    total / workers + u64::from(index < total % workers)
}

/// Run the benchmark described by `props`.
///
/// `do_transactions` selects the transaction phase (`run`) over the load
/// phase (`load`); `status` enables the periodic reporter.
pub fn run_benchmark(
    props: &Properties,
    do_transactions: bool,
    status: bool,
    label: &str,
) -> Result<RunSummary> {
    let thread_count = props.get_u64(
        properties::PROP_THREAD_COUNT,
        properties::PROP_THREAD_COUNT_DEFAULT,
    )?;
    if thread_count == 0 {
        return Err(Error::Config("threadcount must be at least 1".into()));
    }
    let target = props.get_u64(properties::PROP_TARGET, properties::PROP_TARGET_DEFAULT)?;
    let max_execution_time = props.get_u64(
        properties::PROP_MAX_EXECUTION_TIME,
        properties::PROP_MAX_EXECUTION_TIME_DEFAULT,
    )?;
    let db_name = props.get_default(properties::PROP_DB, properties::PROP_DB_DEFAULT);

    let op_count = if do_transactions {
        props.get_u64(
            properties::PROP_OPERATION_COUNT,
            properties::PROP_OPERATION_COUNT_DEFAULT,
        )?
    } else if props.contains(properties::PROP_INSERT_COUNT) {
        props.get_u64(properties::PROP_INSERT_COUNT, "0")?
    } else {
        props.get_u64(
            properties::PROP_RECORD_COUNT,
            properties::PROP_RECORD_COUNT_DEFAULT,
        )?
    };

    // Per-worker pacing: overall ops/s spread over the workers, in ops/ms.
    let target_ops_per_ms = if target > 0 {
        target as f64 / thread_count as f64 / 1000.0
    } else {
        -1.0
    };
    let target_ops_tick_ns = if target > 0 {
        (1_000_000.0 / target_ops_per_ms) as u64
    } else {
        0
    };

    let measurements = Measurements::new(props)?;
    let workload_name = props
        .get(properties::PROP_WORKLOAD)
        .ok_or_else(|| Error::Config("missing property: workload".into()))?;
    let workload = create_workload(workload_name, props)?;

    let (result_tx, result_rx) = bounded::<u64>(thread_count as usize);
    let (stop_tx, stop_rx) = bounded::<()>(thread_count as usize);

    let start = Instant::now();
    let mut stats: Vec<Arc<WorkerStats>> = Vec::with_capacity(thread_count as usize);
    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(thread_count as usize);
    for i in 0..thread_count {
        let db = create_db(db_name, props, Arc::clone(&measurements))?;
        let worker_stats = Arc::new(WorkerStats {
            op_done: AtomicU64::new(0),
            op_count: ops_for_worker(op_count, i, thread_count),
        });
        stats.push(Arc::clone(&worker_stats));
        let worker = Worker {
            db,
            workload: Arc::clone(&workload),
            do_transactions,
            op_count: worker_stats.op_count,
            target_ops_per_ms,
            target_ops_tick_ns,
            stats: worker_stats,
            stop_rx: stop_rx.clone(),
            result_tx: result_tx.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("worker-{}", i))
            .spawn(move || worker.run())
            .map_err(|e| Error::Database(format!("cannot spawn worker: {}", e)))?;
        handles.push(handle);
    }
    drop(result_tx);

    let reporter = if status {
        let interval = props.get_u64(
            properties::PROP_STATUS_INTERVAL,
            properties::PROP_STATUS_INTERVAL_DEFAULT,
        )?;
        let (reporter_stop_tx, reporter_stop_rx) = bounded::<()>(1);
        let reporter = StatusReporter {
            stats: stats.clone(),
            measurements: Arc::clone(&measurements),
            interval: Duration::from_secs(interval.max(1)),
            label: label.to_string(),
            stop_rx: reporter_stop_rx,
        };
        let handle = thread::Builder::new()
            .name("status-reporter".into())
            .spawn(move || reporter.run())
            .map_err(|e| Error::Database(format!("cannot spawn reporter: {}", e)))?;
        Some((reporter_stop_tx, handle))
    } else {
        None
    };

    // Wait for every worker to post its result, or for the wall-clock cap.
    let mut total_ops: u64 = 0;
    let mut done_workers: u64 = 0;
    if max_execution_time > 0 {
        let deadline = start + Duration::from_secs(max_execution_time);
        while done_workers < thread_count {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            select! {
                recv(result_rx) -> r => match r {
                    Ok(t) => {
                        total_ops += t;
                        done_workers += 1;
                    }
                    Err(_) => break,
                },
                recv(after(deadline - now)) -> _ => break,
            }
        }
    } else {
        while done_workers < thread_count {
            match result_rx.recv() {
                Ok(t) => {
                    total_ops += t;
                    done_workers += 1;
                }
                Err(_) => break,
            }
        }
    }

    // Broadcast stop: one token per worker plus the shared flag. Workers
    // that already finished simply never consume their token.
    workload.request_stop();
    for _ in 0..thread_count {
        let _ = stop_tx.try_send(());
    }

    // Drain the stragglers; they post their partial counts on loop exit.
    while done_workers < thread_count {
        match result_rx.recv() {
            Ok(t) => {
                total_ops += t;
                done_workers += 1;
            }
            Err(_) => break,
        }
    }
    for handle in handles {
        let _ = handle.join();
    }

    if let Some((reporter_stop_tx, handle)) = reporter {
        let _ = reporter_stop_tx.send(());
        let _ = handle.join();
    }

    let runtime = start.elapsed();
    workload.cleanup()?;

    export_measurements(props, total_ops, runtime, &measurements)?;

    Ok(RunSummary { total_ops, runtime })
}

/// Write the overall metrics and every per-op aggregator through the
/// configured exporter.
fn export_measurements(
    props: &Properties,
    total_ops: u64,
    runtime: Duration,
    measurements: &Arc<Measurements>,
) -> Result<()> {
    let out: Box<dyn Write + Send> = match props.get(properties::PROP_EXPORT_FILE) {
        Some(path) if !path.is_empty() => Box::new(File::create(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("cannot create export file {}: {}", path, e),
            ))
        })?),
        _ => Box::new(std::io::stdout()),
    };
    let exporter_name = props.get_default(
        properties::PROP_EXPORTER,
        properties::PROP_EXPORTER_DEFAULT,
    );
    let mut exporter = create_exporter(exporter_name, out)?;

    let runtime_ms = runtime.as_millis().max(1) as i64;
    exporter.write("OVERALL", "RunTime(ms)", runtime_ms.into())?;
    let throughput = total_ops as f64 * 1000.0 / runtime_ms as f64;
    exporter.write("OVERALL", "Throughput(ops/sec)", throughput.into())?;
    measurements.export(exporter.as_mut())?;
    exporter.close()
}
