//! Integers drawn from a histogram loaded from a file.
//!
//! Buckets have uniform width `block_size`; drawing bucket `i` yields
//! `(i + 1) * block_size`, so the smallest value this distribution returns
//! is `block_size`, not zero. Used for `fieldlengthdistribution=histogram`.

use std::fs;
use std::path::Path;

use crate::random;
use crate::{Error, Result};

use super::{LastValue, NumberGenerator};

#[derive(Debug)]
pub struct HistogramGenerator {
    block_size: i64,
    buckets: Vec<i64>,
    area: i64,
    weighted_area: i64,
    last: LastValue,
}

impl HistogramGenerator {
    /// Parse a histogram file: first line `BlockSize\t<int>`, then
    /// `bucket_index\tweight` lines.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read histogram file {}: {}", path.display(), e))
        })?;
        let mut block_size = None;
        let mut entries: Vec<(usize, i64)> = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let mut parts = line.split('\t');
            let (Some(left), Some(right), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(Error::Config(format!(
                    "invalid histogram file {} line {}: {:?}",
                    path.display(),
                    lineno + 1,
                    line
                )));
            };
            if lineno == 0 {
                if left != "BlockSize" {
                    return Err(Error::Config(format!(
                        "first line of histogram file {} is not the BlockSize",
                        path.display()
                    )));
                }
                block_size = Some(right.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("invalid BlockSize {:?} in {}", right, path.display()))
                })?);
            } else {
                let idx = left.trim().parse::<usize>().map_err(|_| {
                    Error::Config(format!("invalid bucket index {:?} in {}", left, path.display()))
                })?;
                let weight = right.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("invalid bucket weight {:?} in {}", right, path.display()))
                })?;
                entries.push((idx, weight));
            }
        }
        let Some(block_size) = block_size else {
            return Err(Error::Config(format!("empty histogram file {}", path.display())));
        };
        let len = entries.iter().map(|&(i, _)| i + 1).max().unwrap_or(0);
        let mut buckets = vec![0i64; len];
        for (idx, weight) in entries {
            buckets[idx] = weight;
        }
        Self::new(buckets, block_size)
    }

    pub fn new(buckets: Vec<i64>, block_size: i64) -> Result<Self> {
        if block_size <= 0 {
            return Err(Error::Config(format!("histogram BlockSize must be positive, got {}", block_size)));
        }
        let area: i64 = buckets.iter().sum();
        if area <= 0 {
            return Err(Error::Config("histogram has no weight".into()));
        }
        let weighted_area: i64 = buckets.iter().enumerate().map(|(i, &w)| i as i64 * w).sum();
        Ok(Self {
            block_size,
            buckets,
            area,
            weighted_area,
            last: LastValue::new(0),
        })
    }
}

impl NumberGenerator for HistogramGenerator {
    fn next_value(&self) -> i64 {
        let mut number = random::next_i64_below(self.area);
        let mut chosen = self.buckets.len() - 1;
        for (i, &w) in self.buckets.iter().enumerate() {
            number -= w;
            if number < 0 {
                chosen = i;
                break;
            }
        }
        let next = (chosen as i64 + 1) * self.block_size;
        self.last.set(next);
        next
    }

    fn last_value(&self) -> i64 {
        self.last.get()
    }

    fn mean(&self) -> f64 {
        self.block_size as f64 * self.weighted_area as f64 / self.area as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_histogram(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        f
    }

    #[test]
    fn parses_block_size_and_weights() {
        let f = write_histogram(&["BlockSize\t10", "0\t1", "1\t3"]);
        let g = HistogramGenerator::from_file(f.path()).unwrap();
        for _ in 0..1000 {
            let v = g.next_value();
            assert!(v == 10 || v == 20, "unexpected value {}", v);
        }
        // weighted_area = 0*1 + 1*3 = 3, area = 4
        assert!((g.mean() - 10.0 * 3.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn weights_shape_the_draw() {
        let g = HistogramGenerator::new(vec![1, 9], 5).unwrap();
        let n = 50_000;
        let tens = (0..n).filter(|_| g.next_value() == 10).count();
        let frac = tens as f64 / n as f64;
        assert!((frac - 0.9).abs() < 0.02, "bucket 1 fraction {}", frac);
    }

    #[test]
    fn rejects_missing_block_size_header() {
        let f = write_histogram(&["0\t1", "1\t3"]);
        assert!(HistogramGenerator::from_file(f.path()).is_err());
    }

    #[test]
    fn rejects_zero_area() {
        assert!(HistogramGenerator::new(vec![0, 0], 10).is_err());
    }
}
