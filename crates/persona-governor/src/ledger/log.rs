//! Durable backing for the karma ledger.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only line store. `append` must not return until the line is durable.
pub trait LedgerLog {
    fn append(&mut self, line: &str) -> io::Result<()>;

    /// Every stored line, oldest first.
    fn read_lines(&self) -> io::Result<Vec<String>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Text file, one record per line, fsync'd after every append.
#[derive(Debug, Clone)]
pub struct FileLedgerLog {
    path: PathBuf,
}

impl FileLedgerLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerLog for FileLedgerLog {
    fn append(&mut self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        file.write_all(record.as_bytes())?;
        file.sync_data()
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        BufReader::new(file).lines().collect()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
