//! A generator whose sequence is the lines of a file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::{Error, Result};

use super::Generator;

struct FileState {
    reader: BufReader<File>,
    current: String,
}

/// Emits successive lines of a file; returns the empty string once the
/// file is exhausted. [`FileGenerator::reload`] reopens the file so the
/// sequence can be replayed.
pub struct FileGenerator {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileGenerator {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            Error::Config(format!("cannot open file generator source {}: {}", path.display(), e))
        })?;
        Ok(Self {
            path,
            state: Mutex::new(FileState {
                reader: BufReader::new(file),
                current: String::new(),
            }),
        })
    }

    /// Reopen the file to reuse its values from the beginning.
    pub fn reload(&self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| {
            Error::Config(format!("cannot reopen {}: {}", self.path.display(), e))
        })?;
        let mut state = self.state.lock();
        state.reader = BufReader::new(file);
        state.current.clear();
        Ok(())
    }
}

impl Generator for FileGenerator {
    fn next_string(&self) -> String {
        let mut state = self.state.lock();
        let mut line = String::new();
        match state.reader.read_line(&mut line) {
            Ok(0) | Err(_) => String::new(),
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
                state.current = trimmed.clone();
                trimmed
            }
        }
    }

    fn last_string(&self) -> String {
        self.state.lock().current.clone()
    }
}
