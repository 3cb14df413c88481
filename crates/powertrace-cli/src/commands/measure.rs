//! `powertrace measure`: per-interval statistics, before aggregation.

use powertrace_core::extract_timestamps;

use super::Monitor;

/// Run the measure command.
pub fn run(
    log_path: &str,
    raw_path: &str,
    monitor: Monitor,
    config_path: Option<&str>,
    epoch_ms: Option<i64>,
    output: Option<&str>,
) {
    let config = super::load_config(config_path);
    let intervals = match extract_timestamps(&config, super::open_reader(log_path)) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Failed to read {log_path}: {e}");
            std::process::exit(1);
        }
    };

    let mut parser = super::make_parser(monitor, raw_path, &config, epoch_ms);
    let pass = parser.power_measurements(&intervals);
    let measurements = pass.measurements;

    if measurements.is_empty() {
        println!("No valid intervals to measure.");
    }
    for m in &measurements {
        println!(
            "\n{} [{} .. {}] {}",
            m.interval.tag,
            super::fmt_ms(m.interval.start_ms),
            super::fmt_ms(m.interval.end_ms),
            m.interval.status
        );
        if !m.is_valid() {
            println!("  {}", m.interval.reason);
            continue;
        }
        for (name, value) in &m.statistics {
            println!("  {name:<28} {value:>14.4}");
        }
    }

    if let Some(path) = output {
        super::write_json(&measurements, path, "Measurements");
    }

    // Intervals closed before a fatal line are still printed above.
    if let Some(e) = pass.error {
        eprintln!("Failed to parse {} capture {raw_path}: {e}", parser.monitor());
        std::process::exit(1);
    }
}
