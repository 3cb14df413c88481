pub mod history;
pub mod intervals;
pub mod measure;
pub mod run;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use powertrace_core::{HarnessConfig, MonsoonParser, RawPowerDataParser, SweetberryParser};

/// Power monitors the CLI can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Monitor {
    Monsoon,
    Sweetberry,
}

/// Load the harness config, or defaults when no path is given. Exits on error.
pub fn load_config(path: Option<&str>) -> HarnessConfig {
    let Some(path) = path else {
        return HarnessConfig::default();
    };
    match HarnessConfig::from_path(Path::new(path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid config {path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Open a text file for line reading. Exits on error.
pub fn open_reader(path: &str) -> BufReader<File> {
    match File::open(path) {
        Ok(f) => BufReader::new(f),
        Err(e) => {
            eprintln!("Failed to open {path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Build the raw-sample parser for `monitor`. Exits on error.
pub fn make_parser(
    monitor: Monitor,
    raw_path: &str,
    config: &HarnessConfig,
    epoch_ms: Option<i64>,
) -> Box<dyn RawPowerDataParser> {
    let path = Path::new(raw_path);
    let parser: powertrace_core::Result<Box<dyn RawPowerDataParser>> = match monitor {
        Monitor::Monsoon => {
            MonsoonParser::from_path(path).map(|p| Box::new(p) as Box<dyn RawPowerDataParser>)
        }
        Monitor::Sweetberry => {
            let mut sweetberry = config.sweetberry;
            if let Some(ms) = epoch_ms {
                sweetberry.start_epoch_ms = ms;
            }
            SweetberryParser::from_path(path, sweetberry)
                .map(|p| Box::new(p) as Box<dyn RawPowerDataParser>)
        }
    };
    match parser {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open capture {raw_path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Write `value` as pretty JSON to `path`.
pub fn write_json<T: serde::Serialize>(value: &T, path: &str, label: &str) {
    let json = match serde_json::to_string_pretty(value) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Failed to serialize {label}: {e}");
            return;
        }
    };
    match std::fs::write(path, json) {
        Ok(()) => println!("\n{label} written to {path}"),
        Err(e) => eprintln!("Failed to write {path}: {e}"),
    }
}

/// Format an optional millisecond timestamp for tables.
pub fn fmt_ms(ms: Option<i64>) -> String {
    ms.map_or_else(|| "-".to_string(), |v| v.to_string())
}
