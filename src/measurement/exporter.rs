//! Export sinks for `(metric, measurement, value)` triples.

use std::io::{self, BufWriter, Write};

use serde::Serialize;

use crate::{Error, Result};

/// A value being exported; integers and floats render differently in JSON.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for ExportValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportValue::Int(v) => write!(f, "{}", v),
            ExportValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ExportValue {
    fn from(v: i64) -> Self {
        ExportValue::Int(v)
    }
}

impl From<u64> for ExportValue {
    fn from(v: u64) -> Self {
        ExportValue::Int(v as i64)
    }
}

impl From<f64> for ExportValue {
    fn from(v: f64) -> Self {
        ExportValue::Float(v)
    }
}

/// Serialises measurements into a useful format: human-readable text or
/// machine-readable JSON. Output is buffered; `close` flushes and must be
/// called exactly once.
pub trait MeasurementExporter: Send {
    fn write(&mut self, metric: &str, measurement: &str, value: ExportValue) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

#[derive(Serialize)]
struct JsonMeasurement<'a> {
    metric: &'a str,
    measurement: &'a str,
    value: ExportValue,
}

/// `[<metric>], <measurement>, <value>` per line.
pub struct TextExporter {
    out: BufWriter<Box<dyn Write + Send>>,
}

impl TextExporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }
}

impl MeasurementExporter for TextExporter {
    fn write(&mut self, metric: &str, measurement: &str, value: ExportValue) -> Result<()> {
        writeln!(self.out, "[{}], {}, {}", metric, measurement, value)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonExporter {
    out: BufWriter<Box<dyn Write + Send>>,
}

impl JsonExporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }
}

impl MeasurementExporter for JsonExporter {
    fn write(&mut self, metric: &str, measurement: &str, value: ExportValue) -> Result<()> {
        let entry = JsonMeasurement {
            metric,
            measurement,
            value,
        };
        serde_json::to_writer(&mut self.out, &entry)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        writeln!(self.out)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// All objects wrapped in a single JSON array.
pub struct JsonArrayExporter {
    out: BufWriter<Box<dyn Write + Send>>,
    after_first: bool,
}

impl JsonArrayExporter {
    pub fn new(out: Box<dyn Write + Send>) -> Result<Self> {
        let mut out = BufWriter::new(out);
        out.write_all(b"[")?;
        Ok(Self {
            out,
            after_first: false,
        })
    }
}

impl MeasurementExporter for JsonArrayExporter {
    fn write(&mut self, metric: &str, measurement: &str, value: ExportValue) -> Result<()> {
        if self.after_first {
            self.out.write_all(b",")?;
        } else {
            self.after_first = true;
        }
        let entry = JsonMeasurement {
            metric,
            measurement,
            value,
        };
        serde_json::to_writer(&mut self.out, &entry)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.out.write_all(b"]")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Build an exporter by name. Accepts the short names `text`, `json` and
/// `jsonarray`; the long class-style names used in older property files
/// are honoured as aliases.
pub fn create_exporter(name: &str, out: Box<dyn Write + Send>) -> Result<Box<dyn MeasurementExporter>> {
    match name.to_ascii_lowercase().as_str() {
        "text" | "textmeasurementexporter" => Ok(Box::new(TextExporter::new(out))),
        "json" | "jsonmeasurementexporter" => Ok(Box::new(JsonExporter::new(out))),
        "jsonarray" | "jsonarraymeasurementexporter" => Ok(Box::new(JsonArrayExporter::new(out)?)),
        other => Err(Error::Config(format!("unknown exporter: {}", other))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;

    /// A `Write` handle whose contents stay observable after the exporter
    /// consumes itself on close.
    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
