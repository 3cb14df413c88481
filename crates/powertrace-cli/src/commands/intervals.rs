//! `powertrace intervals`: list the test windows found in a boundary log.

use powertrace_core::extract_timestamps;

pub struct IntervalsCommandConfig<'a> {
    pub log_path: &'a str,
    pub config_path: Option<&'a str>,
    pub start_marker: Option<&'a str>,
    pub end_marker: Option<&'a str>,
    pub output_path: Option<&'a str>,
}

/// Run the intervals command.
pub fn run(cmd: IntervalsCommandConfig<'_>) {
    let mut config = super::load_config(cmd.config_path);
    if let Some(m) = cmd.start_marker {
        config.markers.start = m.to_string();
    }
    if let Some(m) = cmd.end_marker {
        config.markers.end = m.to_string();
    }
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let intervals = match extract_timestamps(&config, super::open_reader(cmd.log_path)) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", cmd.log_path);
            std::process::exit(1);
        }
    };

    if intervals.is_empty() {
        println!(
            "No '{}' / '{}' markers found in {}",
            config.markers.start, config.markers.end, cmd.log_path
        );
    } else {
        println!(
            "{:<28} {:>15} {:>15} {:>10}  {:<8} Reason",
            "Tag", "Start (ms)", "End (ms)", "Duration", "Status"
        );
        println!("{}", "-".repeat(100));
        for i in &intervals {
            println!(
                "{:<28} {:>15} {:>15} {:>10}  {:<8} {}",
                i.tag,
                super::fmt_ms(i.start_ms),
                super::fmt_ms(i.end_ms),
                super::fmt_ms(i.duration_ms()),
                i.status,
                i.reason
            );
        }
        let valid = intervals.iter().filter(|i| i.is_valid()).count();
        println!("\n{valid}/{} interval(s) valid", intervals.len());
    }

    if let Some(path) = cmd.output_path {
        super::write_json(&intervals, path, "Intervals");
    }
}
