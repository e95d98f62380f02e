//! The core workload: a mix of CRUD and scan operations over a synthetic
//! record space.
//!
//! Which records are touched, how many fields they carry, how long values
//! are and how long scans run are all driven by the generator algebra,
//! configured from the property bag. See the property constants in
//! [`crate::properties`] for the available knobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::{DbWrapper, Row, Status};
use crate::generator::{
    AcknowledgedCounterGenerator, ConstantGenerator, CounterGenerator, DiscreteGenerator,
    ExponentialGenerator, Generator, HistogramGenerator, HotspotGenerator, NumberGenerator,
    ScrambledZipfianGenerator, SkewedLatestGenerator, UniformGenerator, ZipfianGenerator,
};
use crate::properties::{self, Properties};
use crate::random;
use crate::{Error, Result};

use super::Workload;

const OP_READ: &str = "READ";
const OP_UPDATE: &str = "UPDATE";
const OP_INSERT: &str = "INSERT";
const OP_SCAN: &str = "SCAN";
const OP_READ_MODIFY_WRITE: &str = "READMODIFYWRITE";

const KEY_PREFIX: &str = "user";

pub struct CoreWorkload {
    table: String,
    field_names: Vec<String>,
    field_length_generator: Box<dyn NumberGenerator>,
    read_all_fields: bool,
    write_all_fields: bool,
    data_integrity: bool,
    /// Key numbers for the load phase; strictly monotone across workers.
    key_sequence: CounterGenerator,
    operation_chooser: DiscreteGenerator,
    key_chooser: Box<dyn NumberGenerator>,
    /// The exponential chooser selects an offset *behind* the newest
    /// insert rather than an absolute key number.
    exponential_key_chooser: bool,
    field_chooser: UniformGenerator,
    /// Key numbers for transactional inserts, with acknowledgement so
    /// readers never select a key that has not finished inserting.
    transaction_insert_key_sequence: Arc<AcknowledgedCounterGenerator>,
    scan_length: Box<dyn NumberGenerator>,
    ordered_inserts: bool,
    insertion_retry_limit: u64,
    insertion_retry_interval_s: f64,
    stop_requested: AtomicBool,
}

impl CoreWorkload {
    pub fn new(props: &Properties) -> Result<Self> {
        let table = props
            .get_default(properties::PROP_TABLE_NAME, properties::PROP_TABLE_NAME_DEFAULT)
            .to_string();

        let field_count = props.get_u64(
            properties::PROP_FIELD_COUNT,
            properties::PROP_FIELD_COUNT_DEFAULT,
        )? as usize;
        if field_count == 0 {
            return Err(Error::Config("fieldcount must be at least 1".into()));
        }
        let field_names: Vec<String> = (0..field_count).map(|i| format!("field{}", i)).collect();

        let field_length_distribution = props.get_default(
            properties::PROP_FIELD_LENGTH_DISTRIBUTION,
            properties::PROP_FIELD_LENGTH_DISTRIBUTION_DEFAULT,
        );
        let field_length = props.get_i64(
            properties::PROP_FIELD_LENGTH,
            properties::PROP_FIELD_LENGTH_DEFAULT,
        )?;
        let field_length_generator: Box<dyn NumberGenerator> = match field_length_distribution {
            "constant" => Box::new(ConstantGenerator::new(field_length)),
            "uniform" => Box::new(UniformGenerator::new(1, field_length)),
            "zipfian" => Box::new(ZipfianGenerator::new(1, field_length)),
            "histogram" => {
                let path = props.get_default(
                    properties::PROP_FIELD_LENGTH_HISTOGRAM,
                    properties::PROP_FIELD_LENGTH_HISTOGRAM_DEFAULT,
                );
                Box::new(HistogramGenerator::from_file(path)?)
            }
            other => {
                return Err(Error::Config(format!(
                    "unknown fieldlengthdistribution: {}",
                    other
                )))
            }
        };

        let data_integrity = props.get_bool(
            properties::PROP_DATA_INTEGRITY,
            properties::PROP_DATA_INTEGRITY_DEFAULT,
        )?;
        if data_integrity && field_length_distribution != "constant" {
            return Err(Error::Config(
                "dataintegrity=true requires fieldlengthdistribution=constant".into(),
            ));
        }

        let mut record_count = props.get_i64(
            properties::PROP_RECORD_COUNT,
            properties::PROP_RECORD_COUNT_DEFAULT,
        )?;
        if record_count == 0 {
            record_count = i64::from(i32::MAX);
        }

        let insert_start = props.get_i64(
            properties::PROP_INSERT_START,
            properties::PROP_INSERT_START_DEFAULT,
        )?;
        let insert_count = match props.get(properties::PROP_INSERT_COUNT) {
            Some(_) => props.get_i64(properties::PROP_INSERT_COUNT, "0")?,
            None => record_count - insert_start,
        };
        if insert_count <= 0 {
            return Err(Error::Config(format!(
                "no records to work on: recordcount={}, insertstart={}",
                record_count, insert_start
            )));
        }

        let operation_count = props.get_i64(
            properties::PROP_OPERATION_COUNT,
            properties::PROP_OPERATION_COUNT_DEFAULT,
        )?;

        let mut operation_chooser = DiscreteGenerator::new();
        for (prop, default, op) in [
            (
                properties::PROP_READ_PROPORTION,
                properties::PROP_READ_PROPORTION_DEFAULT,
                OP_READ,
            ),
            (
                properties::PROP_UPDATE_PROPORTION,
                properties::PROP_UPDATE_PROPORTION_DEFAULT,
                OP_UPDATE,
            ),
            (
                properties::PROP_INSERT_PROPORTION,
                properties::PROP_INSERT_PROPORTION_DEFAULT,
                OP_INSERT,
            ),
            (
                properties::PROP_SCAN_PROPORTION,
                properties::PROP_SCAN_PROPORTION_DEFAULT,
                OP_SCAN,
            ),
            (
                properties::PROP_READ_MODIFY_WRITE_PROPORTION,
                properties::PROP_READ_MODIFY_WRITE_PROPORTION_DEFAULT,
                OP_READ_MODIFY_WRITE,
            ),
        ] {
            let weight = props.get_f64(prop, default)?;
            if weight > 0.0 {
                operation_chooser.add_value(weight, op);
            }
        }
        if operation_chooser.is_empty() {
            return Err(Error::Config("all operation proportions are zero".into()));
        }

        let transaction_insert_key_sequence = Arc::new(AcknowledgedCounterGenerator::new(record_count));

        let request_distribution = props.get_default(
            properties::PROP_REQUEST_DISTRIBUTION,
            properties::PROP_REQUEST_DISTRIBUTION_DEFAULT,
        );
        let mut exponential_key_chooser = false;
        let key_chooser: Box<dyn NumberGenerator> = match request_distribution {
            "uniform" => Box::new(UniformGenerator::new(insert_start, insert_start + insert_count - 1)),
            "zipfian" => {
                // Inflate the keyspace by the expected number of new keys
                // so that concurrent transactional inserts do not shift
                // which ranks are popular mid-run.
                let insert_proportion = props.get_f64(
                    properties::PROP_INSERT_PROPORTION,
                    properties::PROP_INSERT_PROPORTION_DEFAULT,
                )?;
                let expected_new_keys = (operation_count as f64 * insert_proportion * 2.0) as i64;
                Box::new(ScrambledZipfianGenerator::new(
                    insert_start,
                    insert_start + insert_count + expected_new_keys - 1,
                ))
            }
            "latest" => Box::new(SkewedLatestGenerator::new(
                Arc::clone(&transaction_insert_key_sequence) as Arc<dyn NumberGenerator>,
            )),
            "hotspot" => {
                let data_fraction = props.get_f64(
                    properties::PROP_HOTSPOT_DATA_FRACTION,
                    properties::PROP_HOTSPOT_DATA_FRACTION_DEFAULT,
                )?;
                let opn_fraction = props.get_f64(
                    properties::PROP_HOTSPOT_OPN_FRACTION,
                    properties::PROP_HOTSPOT_OPN_FRACTION_DEFAULT,
                )?;
                Box::new(HotspotGenerator::new(
                    insert_start,
                    insert_start + insert_count - 1,
                    data_fraction,
                    opn_fraction,
                ))
            }
            "exponential" => {
                exponential_key_chooser = true;
                let percentile = props.get_f64(
                    properties::PROP_EXPONENTIAL_PERCENTILE,
                    properties::PROP_EXPONENTIAL_PERCENTILE_DEFAULT,
                )?;
                let frac = props.get_f64(
                    properties::PROP_EXPONENTIAL_FRACTION,
                    properties::PROP_EXPONENTIAL_FRACTION_DEFAULT,
                )?;
                Box::new(ExponentialGenerator::new(percentile, record_count as f64 * frac))
            }
            other => {
                return Err(Error::Config(format!(
                    "unknown requestdistribution: {}",
                    other
                )))
            }
        };

        let max_scan_length = props.get_i64(
            properties::PROP_MAX_SCAN_LENGTH,
            properties::PROP_MAX_SCAN_LENGTH_DEFAULT,
        )?;
        let scan_length: Box<dyn NumberGenerator> = match props.get_default(
            properties::PROP_SCAN_LENGTH_DISTRIBUTION,
            properties::PROP_SCAN_LENGTH_DISTRIBUTION_DEFAULT,
        ) {
            "uniform" => Box::new(UniformGenerator::new(1, max_scan_length)),
            "zipfian" => Box::new(ZipfianGenerator::new(1, max_scan_length)),
            other => {
                return Err(Error::Config(format!(
                    "unknown scanlengthdistribution: {}",
                    other
                )))
            }
        };

        let ordered_inserts = match props.get_default(
            properties::PROP_INSERT_ORDER,
            properties::PROP_INSERT_ORDER_DEFAULT,
        ) {
            "ordered" => true,
            "hashed" => false,
            other => return Err(Error::Config(format!("unknown insertorder: {}", other))),
        };

        Ok(Self {
            table,
            field_names,
            field_length_generator,
            read_all_fields: props.get_bool(
                properties::PROP_READ_ALL_FIELDS,
                properties::PROP_READ_ALL_FIELDS_DEFAULT,
            )?,
            write_all_fields: props.get_bool(
                properties::PROP_WRITE_ALL_FIELDS,
                properties::PROP_WRITE_ALL_FIELDS_DEFAULT,
            )?,
            data_integrity,
            key_sequence: CounterGenerator::new(insert_start),
            operation_chooser,
            key_chooser,
            exponential_key_chooser,
            field_chooser: UniformGenerator::new(0, field_count as i64 - 1),
            transaction_insert_key_sequence,
            scan_length,
            ordered_inserts,
            insertion_retry_limit: props.get_u64(
                properties::PROP_INSERTION_RETRY_LIMIT,
                properties::PROP_INSERTION_RETRY_LIMIT_DEFAULT,
            )?,
            insertion_retry_interval_s: props.get_f64(
                properties::PROP_INSERTION_RETRY_INTERVAL,
                properties::PROP_INSERTION_RETRY_INTERVAL_DEFAULT,
            )?,
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Render a key number as a record key. Stable: the same number always
    /// maps to the same key.
    fn build_key_name(&self, key_number: i64) -> String {
        if self.ordered_inserts {
            format!("{}{}", KEY_PREFIX, key_number)
        } else {
            format!("{}{}", KEY_PREFIX, random::fnv64(key_number as u64))
        }
    }

    /// Deterministic value for `(key, field)`: the seed string followed by
    /// chained hashes until the target length is reached.
    fn build_deterministic_value(&self, key: &str, field: &str, size: usize) -> Vec<u8> {
        let mut data = format!("{}:{}", key, field).into_bytes();
        while data.len() < size {
            let hash = random::fnv1a_64(&data);
            data.push(b':');
            data.extend_from_slice(hash.to_string().as_bytes());
        }
        data.truncate(size);
        data
    }

    fn build_field_value(&self, key: &str, field: &str) -> Vec<u8> {
        let size = self.field_length_generator.next_value().max(1) as usize;
        if self.data_integrity {
            self.build_deterministic_value(key, field, size)
        } else {
            random::printable_bytes(size)
        }
    }

    /// Values for every field of a record.
    fn build_values(&self, key: &str) -> Row {
        self.field_names
            .iter()
            .map(|f| (f.clone(), self.build_field_value(key, f)))
            .collect()
    }

    /// A single randomly chosen field with a fresh value.
    fn build_single_value(&self, key: &str) -> Row {
        let field = &self.field_names[self.field_chooser.next_value() as usize];
        let mut row = Row::new();
        row.insert(field.clone(), self.build_field_value(key, field));
        row
    }

    /// Pick the key number for a transactional operation. Never returns a
    /// number above the last acknowledged insert, so reads do not race
    /// ahead of committed data.
    fn next_key_number(&self) -> i64 {
        let last_ack = self.transaction_insert_key_sequence.last_value();
        if self.exponential_key_chooser {
            loop {
                let candidate = last_ack - self.key_chooser.next_value();
                if candidate >= 0 {
                    return candidate;
                }
            }
        }
        loop {
            let candidate = self.key_chooser.next_value();
            if candidate <= last_ack {
                return candidate;
            }
        }
    }

    fn read_fields(&self) -> Vec<String> {
        if self.read_all_fields {
            Vec::new()
        } else {
            vec![self.field_names[self.field_chooser.next_value() as usize].clone()]
        }
    }

    fn verify_row(&self, db: &DbWrapper, key: &str, row: &Row) {
        let start = Instant::now();
        let mut status = Status::Ok;
        if row.is_empty() {
            status = Status::Error;
        } else {
            for (field, value) in row {
                let expected = self.build_deterministic_value(key, field, value.len());
                if *value != expected {
                    status = Status::UnexpectedState;
                    break;
                }
            }
        }
        let latency_us = start.elapsed().as_micros() as u64;
        db.measurements().measure("VERIFY", latency_us);
        db.measurements().report_status("VERIFY", status);
    }

    fn do_transaction_read(&self, db: &mut DbWrapper) {
        let key_number = self.next_key_number();
        let key = self.build_key_name(key_number);
        // Verification needs every field back regardless of readallfields.
        let fields = if self.data_integrity {
            Vec::new()
        } else {
            self.read_fields()
        };
        let (row, _status) = db.read(&self.table, &key, &fields);
        if self.data_integrity {
            self.verify_row(db, &key, &row);
        }
    }

    fn do_transaction_update(&self, db: &mut DbWrapper) {
        let key_number = self.next_key_number();
        let key = self.build_key_name(key_number);
        let values = if self.write_all_fields {
            self.build_values(&key)
        } else {
            self.build_single_value(&key)
        };
        db.update(&self.table, &key, &values);
    }

    fn do_transaction_insert(&self, db: &mut DbWrapper) {
        let key_number = self.transaction_insert_key_sequence.next_value();
        let key = self.build_key_name(key_number);
        let values = self.build_values(&key);
        db.insert(&self.table, &key, &values);
        // Acknowledge even on failure, otherwise the window stalls and
        // next_key_number spins on a limit that can never advance.
        self.transaction_insert_key_sequence.acknowledge(key_number);
    }

    fn do_transaction_scan(&self, db: &mut DbWrapper) {
        let key_number = self.next_key_number();
        let start_key = self.build_key_name(key_number);
        let len = self.scan_length.next_value();
        let fields = self.read_fields();
        db.scan(&self.table, &start_key, len, &fields);
    }

    fn do_transaction_read_modify_write(&self, db: &mut DbWrapper) {
        let key_number = self.next_key_number();
        let key = self.build_key_name(key_number);
        let fields = self.read_fields();
        let values = if self.write_all_fields {
            self.build_values(&key)
        } else {
            self.build_single_value(&key)
        };
        let start = Instant::now();
        db.read(&self.table, &key, &fields);
        db.update(&self.table, &key, &values);
        let latency_us = start.elapsed().as_micros() as u64;
        db.measurements().measure("READ-MODIFY-WRITE", latency_us);
    }
}

impl Workload for CoreWorkload {
    fn do_insert(&self, db: &mut DbWrapper) -> bool {
        let key_number = self.key_sequence.next_value();
        let key = self.build_key_name(key_number);
        let values = self.build_values(&key);

        let mut attempts = 0;
        loop {
            if db.insert(&self.table, &key, &values).is_ok() {
                return true;
            }
            attempts += 1;
            if attempts > self.insertion_retry_limit {
                tracing::error!(key = %key, attempts, "insert failed past the retry limit");
                return false;
            }
            // Jittered backoff in [0.8, 1.2) of the configured interval.
            let sleep_s = self.insertion_retry_interval_s * (0.8 + 0.4 * random::next_f64());
            std::thread::sleep(Duration::from_secs_f64(sleep_s));
        }
    }

    fn do_transaction(&self, db: &mut DbWrapper) -> bool {
        match self.operation_chooser.next_string().as_str() {
            OP_READ => self.do_transaction_read(db),
            OP_UPDATE => self.do_transaction_update(db),
            OP_INSERT => self.do_transaction_insert(db),
            OP_SCAN => self.do_transaction_scan(db),
            OP_READ_MODIFY_WRITE => self.do_transaction_read_modify_write(db),
            other => unreachable!("operation chooser produced {}", other),
        }
        true
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Relaxed)
    }
}
