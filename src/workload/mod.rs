//! Workloads: one experiment scenario, shared by every worker of a run.

mod core;

pub use self::core::CoreWorkload;

use std::sync::Arc;

use crate::db::DbWrapper;
use crate::properties::Properties;
use crate::{Error, Result};

/// One experiment scenario. A single instance is built by the driver and
/// shared among all workers, so `do_insert`/`do_transaction` must be safe
/// to call from any number of threads at once.
pub trait Workload: Send + Sync {
    /// Perform one insert of the load phase. Returns `false` when the
    /// worker should stop (insertion failed past the retry budget).
    fn do_insert(&self, db: &mut DbWrapper) -> bool;

    /// Perform one operation of the transaction phase. Returns `false`
    /// when the worker should stop.
    fn do_transaction(&self, db: &mut DbWrapper) -> bool;

    /// Called once by the driver after all workers have finished.
    fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    /// Ask all workers to wind down at the next operation boundary.
    fn request_stop(&self);

    fn stop_requested(&self) -> bool;
}

/// Build the workload registered under `name`.
pub fn create_workload(name: &str, props: &Properties) -> Result<Arc<dyn Workload>> {
    match name.to_ascii_lowercase().as_str() {
        "core" | "coreworkload" => Ok(Arc::new(CoreWorkload::new(props)?)),
        other => Err(Error::Config(format!("unknown workload: {}", other))),
    }
}
