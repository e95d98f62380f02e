//! A process-shared in-memory store.
//!
//! All `MemoryDb` instances in the process see the same data, so N workers
//! loading and reading behave like clients of one database. Tables are
//! ordered maps, which makes `scan` a genuine range scan from the start
//! key. Primarily here so integration tests and data-integrity runs can
//! observe real read-back semantics.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::db::{Db, Row, Status};
use crate::Result;

type Table = BTreeMap<String, Row>;
type Store = HashMap<String, Table>;

fn store() -> &'static RwLock<Store> {
    static STORE: OnceLock<RwLock<Store>> = OnceLock::new();
    STORE.get_or_init(|| RwLock::new(Store::new()))
}

#[derive(Default)]
pub struct MemoryDb;

impl MemoryDb {
    pub fn new() -> Self {
        Self
    }

    /// Drop every table. Tests use this to isolate scenarios.
    pub fn reset() {
        store().write().clear();
    }

    fn project(row: &Row, fields: &[String]) -> Row {
        if fields.is_empty() {
            return row.clone();
        }
        fields
            .iter()
            .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }
}

impl Db for MemoryDb {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, table: &str, key: &str, fields: &[String]) -> (Row, Status) {
        let store = store().read();
        match store.get(table).and_then(|t| t.get(key)) {
            Some(row) => (Self::project(row, fields), Status::Ok),
            None => (Row::new(), Status::NotFound),
        }
    }

    fn scan(&mut self, table: &str, start_key: &str, record_count: i64, fields: &[String]) -> (Vec<Row>, Status) {
        if record_count <= 0 {
            return (Vec::new(), Status::BadRequest);
        }
        let store = store().read();
        let Some(t) = store.get(table) else {
            return (Vec::new(), Status::NotFound);
        };
        let rows: Vec<Row> = t
            .range(start_key.to_string()..)
            .take(record_count as usize)
            .map(|(_, row)| Self::project(row, fields))
            .collect();
        (rows, Status::Ok)
    }

    fn update(&mut self, table: &str, key: &str, values: &Row) -> Status {
        let mut store = store().write();
        match store.get_mut(table).and_then(|t| t.get_mut(key)) {
            Some(row) => {
                for (f, v) in values {
                    row.insert(f.clone(), v.clone());
                }
                Status::Ok
            }
            None => Status::NotFound,
        }
    }

    fn insert(&mut self, table: &str, key: &str, values: &Row) -> Status {
        let mut store = store().write();
        store
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), values.clone());
        Status::Ok
    }

    fn delete(&mut self, table: &str, key: &str) -> Status {
        let mut store = store().write();
        match store.get_mut(table).map(|t| t.remove(key)) {
            Some(Some(_)) => Status::Ok,
            _ => Status::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    // The store is process-global; use a dedicated table per test to keep
    // them independent.

    #[test]
    fn insert_then_read_round_trips() {
        let mut db = MemoryDb::new();
        db.insert("t_rw", "user1", &row(&[("field0", "abc")]));
        let (r, status) = db.read("t_rw", "user1", &[]);
        assert_eq!(status, Status::Ok);
        assert_eq!(r["field0"], b"abc");
    }

    #[test]
    fn read_missing_key_is_not_found() {
        let mut db = MemoryDb::new();
        let (_, status) = db.read("t_missing", "nobody", &[]);
        assert_eq!(status, Status::NotFound);
    }

    #[test]
    fn update_requires_existing_record() {
        let mut db = MemoryDb::new();
        assert_eq!(db.update("t_up", "user1", &row(&[("f", "v")])), Status::NotFound);
        db.insert("t_up", "user1", &row(&[("f", "v"), ("g", "w")]));
        assert_eq!(db.update("t_up", "user1", &row(&[("f", "v2")])), Status::Ok);
        let (r, _) = db.read("t_up", "user1", &[]);
        assert_eq!(r["f"], b"v2");
        assert_eq!(r["g"], b"w");
    }

    #[test]
    fn field_projection() {
        let mut db = MemoryDb::new();
        db.insert("t_proj", "user1", &row(&[("a", "1"), ("b", "2")]));
        let (r, _) = db.read("t_proj", "user1", &["a".to_string()]);
        assert_eq!(r.len(), 1);
        assert!(r.contains_key("a"));
    }

    #[test]
    fn scan_is_ordered_from_start_key() {
        let mut db = MemoryDb::new();
        for i in 0..10 {
            db.insert("t_scan", &format!("user{:02}", i), &row(&[("f", "v")]));
        }
        let (rows, status) = db.scan("t_scan", "user03", 4, &[]);
        assert_eq!(status, Status::Ok);
        assert_eq!(rows.len(), 4);
        let (rows, _) = db.scan("t_scan", "user08", 10, &[]);
        assert_eq!(rows.len(), 2, "scan truncates at the end of the table");
    }

    #[test]
    fn delete_removes_the_record() {
        let mut db = MemoryDb::new();
        db.insert("t_del", "user1", &row(&[("f", "v")]));
        assert_eq!(db.delete("t_del", "user1"), Status::Ok);
        assert_eq!(db.delete("t_del", "user1"), Status::NotFound);
        let (_, status) = db.read("t_del", "user1", &[]);
        assert_eq!(status, Status::NotFound);
    }
}
