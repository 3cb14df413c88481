//! # powertrace-core
//!
//! **Turns a power monitor capture and a device log into pass/fail numbers.**
//!
//! A test run on the device writes begin/end markers for each measured case to
//! its log. A power monitor records current (Monsoon) or per-rail power
//! (Sweetberry) for the whole run. `powertrace-core` lines the two up, measures
//! each case, averages repeated iterations and posts the results.
//!
//! ## Quick Start
//!
//! ```no_run
//! use powertrace_core::{HarnessConfig, LogSink, MonsoonParser, PowerRun};
//! use std::fs::File;
//! use std::io::BufReader;
//! use std::path::Path;
//!
//! let config = HarnessConfig::from_path(Path::new("harness.json")).unwrap();
//! let log = BufReader::new(File::open("logcat.txt").unwrap());
//! let parser = MonsoonParser::from_path(Path::new("monsoon.txt")).unwrap();
//!
//! let run = PowerRun::new(&config, log, Box::new(parser)).unwrap();
//! let report = run.run(config.report.decimal_places, &mut LogSink).unwrap();
//! println!("{} result(s), {} failing", report.results.len(), report.failures().count());
//! ```
//!
//! ## Architecture
//!
//! Boundary log → [`TimeInterval`]s → validation → [`RawPowerDataParser`] →
//! [`Measurement`]s → [`Metric`]s → [`ResultPoster`] → [`ResultSink`]
//!
//! Interval tags are `<schema>` or `<schema>__<iteration>`. Iterations of one
//! schema are averaged only when their durations agree within ten seconds.
//! A schema with no usable data is always posted, as a failing `-1`.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod history;
pub mod interval;
pub mod lines;
pub mod pipeline;
pub mod report;
pub mod samples;
pub mod timestamps;

pub use aggregate::{Measurement, Metric, combine, schema_of};
pub use config::{
    DouConfig, DouTerm, HarnessConfig, HistoryConfig, HistoryMode, Limits, MarkerConfig,
    ReportConfig, SweetberryConfig,
};
pub use error::{PowerError, Result};
pub use history::{HistoryEntry, HistoryStore};
pub use interval::{IntervalStatus, TimeInterval, validate};
pub use pipeline::{MetricSummary, PowerRun, RunReport, extract_timestamps};
pub use report::{
    DouCalculator, LogSink, MemorySink, PostedResult, ResultPoster, ResultSink, SENTINEL, Verdict,
};
pub use samples::{MonsoonParser, RawPowerDataParser, SweetberryParser};
pub use timestamps::TimestampExtractor;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
