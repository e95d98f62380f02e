//! An adapter that prints what it would do instead of doing it.
//!
//! Useful for smoke-testing a workload configuration and as the default
//! backend. `basicdb.simulatedelay` injects an artificial per-operation
//! delay (randomised over `[0, delay)` ms unless
//! `basicdb.randomizedelay=false`), which gives the measurement pipeline
//! something nonzero to aggregate.

use std::time::Duration;

use crate::db::{Db, Row, Status};
use crate::properties::{self, Properties};
use crate::random;
use crate::Result;

pub struct BasicDb {
    props: Properties,
    verbose: bool,
    randomize_delay: bool,
    delay_ms: i64,
}

impl BasicDb {
    pub fn new(props: Properties) -> Self {
        Self {
            props,
            verbose: true,
            randomize_delay: true,
            delay_ms: 0,
        }
    }

    fn delay(&self) {
        if self.delay_ms > 0 {
            let ms = if self.randomize_delay {
                let d = random::next_i64_below(self.delay_ms);
                if d == 0 {
                    return;
                }
                d
            } else {
                self.delay_ms
            };
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }

    fn fields_str(fields: &[String]) -> String {
        if fields.is_empty() {
            "<all fields>".to_string()
        } else {
            fields.join(", ")
        }
    }

    fn values_str(values: &Row) -> String {
        let mut keys: Vec<_> = values.keys().collect();
        keys.sort();
        keys.iter()
            .map(|k| format!("{}={}", k, String::from_utf8_lossy(&values[*k])))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Db for BasicDb {
    fn init(&mut self) -> Result<()> {
        self.verbose = self.props.get_bool(
            properties::PROP_BASICDB_VERBOSE,
            properties::PROP_BASICDB_VERBOSE_DEFAULT,
        )?;
        self.delay_ms = self.props.get_i64(
            properties::PROP_BASICDB_SIMULATE_DELAY,
            properties::PROP_BASICDB_SIMULATE_DELAY_DEFAULT,
        )?;
        self.randomize_delay = self.props.get_bool(
            properties::PROP_BASICDB_RANDOMIZE_DELAY,
            properties::PROP_BASICDB_RANDOMIZE_DELAY_DEFAULT,
        )?;
        if self.verbose {
            println!("***************** properties *****************");
            for (k, v) in self.props.iter_sorted() {
                println!("\"{}\"=\"{}\"", k, v);
            }
            println!("**********************************************");
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, table: &str, key: &str, fields: &[String]) -> (Row, Status) {
        self.delay();
        if self.verbose {
            println!("READ {} {} [{}]", table, key, Self::fields_str(fields));
        }
        (Row::new(), Status::Ok)
    }

    fn scan(&mut self, table: &str, start_key: &str, record_count: i64, fields: &[String]) -> (Vec<Row>, Status) {
        self.delay();
        if self.verbose {
            println!(
                "SCAN {} {} {} [{}]",
                table,
                start_key,
                record_count,
                Self::fields_str(fields)
            );
        }
        (Vec::new(), Status::Ok)
    }

    fn update(&mut self, table: &str, key: &str, values: &Row) -> Status {
        self.delay();
        if self.verbose {
            println!("UPDATE {} {} [{}]", table, key, Self::values_str(values));
        }
        Status::Ok
    }

    fn insert(&mut self, table: &str, key: &str, values: &Row) -> Status {
        self.delay();
        if self.verbose {
            println!("INSERT {} {} [{}]", table, key, Self::values_str(values));
        }
        Status::Ok
    }

    fn delete(&mut self, table: &str, key: &str) -> Status {
        self.delay();
        if self.verbose {
            println!("DELETE {} {}", table, key);
        }
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_basic() -> BasicDb {
        let mut p = Properties::new();
        p.set(properties::PROP_BASICDB_VERBOSE, "false");
        let mut db = BasicDb::new(p);
        db.init().unwrap();
        db
    }

    #[test]
    fn every_operation_reports_ok() {
        let mut db = quiet_basic();
        let values = Row::new();
        assert_eq!(db.read("t", "k", &[]).1, Status::Ok);
        assert_eq!(db.scan("t", "k", 10, &[]).1, Status::Ok);
        assert_eq!(db.update("t", "k", &values), Status::Ok);
        assert_eq!(db.insert("t", "k", &values), Status::Ok);
        assert_eq!(db.delete("t", "k"), Status::Ok);
    }

    #[test]
    fn invalid_delay_is_a_config_error() {
        let mut p = Properties::new();
        p.set(properties::PROP_BASICDB_SIMULATE_DELAY, "soon");
        let mut db = BasicDb::new(p);
        assert!(db.init().is_err());
    }
}
