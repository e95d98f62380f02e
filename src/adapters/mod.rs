//! Storage adapters.
//!
//! Each adapter implements [`Db`](crate::db::Db) for one backend. The
//! harness ships with two: `basic`, which echoes operations and optionally
//! simulates latency, and `memory`, a process-shared ordered store that
//! makes load-then-run and data-integrity checks work end to end without an
//! external database. Real backends plug in by adding an arm to
//! [`create_adapter`].

mod basic;
mod memory;

pub use basic::BasicDb;
pub use memory::MemoryDb;

use crate::db::Db;
use crate::properties::Properties;
use crate::{Error, Result};

pub const ADAPTER_NAMES: &[&str] = &["basic", "memory"];

/// Instantiate the adapter registered under `name`.
pub fn create_adapter(name: &str, props: &Properties) -> Result<Box<dyn Db>> {
    match name {
        "basic" => Ok(Box::new(BasicDb::new(props.clone()))),
        "memory" => Ok(Box::new(MemoryDb::new())),
        other => Err(Error::Config(format!("unsupported database: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_adapters_construct() {
        for name in ADAPTER_NAMES {
            assert!(create_adapter(name, &Properties::new()).is_ok(), "{}", name);
        }
    }

    #[test]
    fn unknown_adapter_is_a_config_error() {
        assert!(create_adapter("oracle", &Properties::new()).is_err());
    }
}
