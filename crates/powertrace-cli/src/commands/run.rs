//! `powertrace run`: the whole pipeline, ending in posted results.

use powertrace_core::{LogSink, MemorySink, PostedResult, PowerRun, ResultSink};

use super::Monitor;

pub struct RunCommandConfig<'a> {
    pub log_path: &'a str,
    pub raw_path: &'a str,
    pub monitor: Monitor,
    pub config_path: Option<&'a str>,
    pub decimal_places: Option<u32>,
    pub epoch_ms: Option<i64>,
    pub output_path: Option<&'a str>,
    pub strict: bool,
}

/// Logs each result and keeps it for the summary table.
#[derive(Default)]
struct ConsoleSink {
    log: LogSink,
    memory: MemorySink,
}

impl ResultSink for ConsoleSink {
    fn post(&mut self, result: PostedResult) {
        self.log.post(result.clone());
        self.memory.post(result);
    }
}

/// Run the full pipeline.
pub fn run(cmd: RunCommandConfig<'_>) {
    let config = super::load_config(cmd.config_path);
    let decimal_places = cmd.decimal_places.unwrap_or(config.report.decimal_places);
    let parser = super::make_parser(cmd.monitor, cmd.raw_path, &config, cmd.epoch_ms);

    let run = match PowerRun::new(&config, super::open_reader(cmd.log_path), parser) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to start run: {e}");
            std::process::exit(1);
        }
    };
    let mut sink = ConsoleSink::default();
    let report = match run.run(decimal_places, &mut sink) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    };

    if let Some(err) = &report.parse_error {
        eprintln!("Capture {} could not be parsed: {err}", cmd.raw_path);
    }

    println!(
        "\n{:<20} {:<36} {:>12} {:>10} {:>10}  Verdict",
        "Reporting unit", "Schema", "Value", "Lower", "Upper"
    );
    println!("{}", "-".repeat(100));
    for r in &sink.memory.results {
        let verdict = match &r.verdict {
            powertrace_core::Verdict::Pass => "PASS".to_string(),
            powertrace_core::Verdict::Fail(msg) => format!("FAIL ({msg})"),
        };
        println!(
            "{:<20} {:<36} {:>12} {:>10} {:>10}  {verdict}",
            r.reporting_unit,
            r.schema,
            r.value,
            fmt_limit(r.lower_limit),
            fmt_limit(r.upper_limit),
        );
    }

    let failures = report.failures().count();
    println!(
        "\nRun {}: {} interval(s), {} result(s), {failures} failing",
        report.id,
        report.intervals.len(),
        report.results.len()
    );

    if let Some(path) = cmd.output_path {
        super::write_json(&report, path, "Run report");
    }
    if cmd.strict && failures > 0 {
        std::process::exit(2);
    }
}

/// Unset limits are stored as `f64::MIN`/`f64::MAX`.
fn fmt_limit(v: f64) -> String {
    if v == f64::MIN || v == f64::MAX || !v.is_finite() {
        "-".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_limit_hides_unbounded() {
        assert_eq!(fmt_limit(f64::MAX), "-");
        assert_eq!(fmt_limit(f64::MIN), "-");
        assert_eq!(fmt_limit(40.0), "40");
    }
}
