//! Local result history for cross-run averaging.
//!
//! # Storage Format
//!
//! One plain-text file per (product, build, reporting unit, schema), named
//! `<product>_<build>_<ru>_<schema>.txt`, one line per run:
//!
//! ```text
//! 1771030200000 12.34
//! 1771030500000 12.41
//! ```
//!
//! Malformed lines and non-finite values are ignored on read.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{HistoryConfig, HistoryMode};
use crate::error::Result;

/// One stored result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Result files for one device build.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    config: HistoryConfig,
}

impl HistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Path of the file holding results for one RU/schema pair.
    pub fn path_for(&self, reporting_unit: &str, schema: &str) -> PathBuf {
        let name = format!(
            "{}_{}_{}_{}.txt",
            self.config.product, self.config.build, reporting_unit, schema
        );
        self.config.dir.join(sanitize_file_name(&name))
    }

    /// Store a result stamped with the current time.
    pub fn record(&self, reporting_unit: &str, schema: &str, value: f64) -> Result<PathBuf> {
        self.record_at(reporting_unit, schema, value, now_ms())
    }

    /// Store a result with an explicit timestamp, appending or overwriting per config.
    pub fn record_at(
        &self,
        reporting_unit: &str,
        schema: &str,
        value: f64,
        timestamp_ms: i64,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.dir)?;
        let path = self.path_for(reporting_unit, schema);
        let mut file = match self.config.mode {
            HistoryMode::Append => OpenOptions::new().create(true).append(true).open(&path)?,
            HistoryMode::Overwrite => fs::File::create(&path)?,
        };
        writeln!(file, "{timestamp_ms} {value}")?;
        file.flush()?;
        Ok(path)
    }

    /// Stored results in file order. A missing file is an empty history.
    pub fn load(&self, reporting_unit: &str, schema: &str) -> Result<Vec<HistoryEntry>> {
        read_entries(&self.path_for(reporting_unit, schema))
    }

    /// Average over stored results, if any.
    pub fn average(&self, reporting_unit: &str, schema: &str) -> Result<Option<f64>> {
        let entries = self.load(reporting_unit, schema)?;
        if entries.is_empty() {
            return Ok(None);
        }
        let sum: f64 = entries.iter().map(|e| e.value).sum();
        Ok(Some(sum / entries.len() as f64))
    }
}

/// Parse a history file, skipping lines that are not `<ms> <finite float>`.
pub fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(contents.lines().filter_map(parse_line).collect())
}

fn parse_line(line: &str) -> Option<HistoryEntry> {
    let mut parts = line.split_whitespace();
    let timestamp_ms = parts.next()?.parse::<i64>().ok()?;
    let value = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || !value.is_finite() {
        log::debug!("ignoring history line '{line}'");
        return None;
    }
    Some(HistoryEntry {
        timestamp_ms,
        value,
    })
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
