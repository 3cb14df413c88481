//! CLI for powertrace: per-test power numbers from a monitor capture and a device log.

mod commands;

use clap::{Parser, Subcommand};

use commands::Monitor;

#[derive(Parser)]
#[command(name = "powertrace")]
#[command(about = "powertrace: per-test power numbers from a monitor capture and a device log")]
#[command(version = powertrace_core::VERSION)]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and validate test intervals from a boundary log
    Intervals {
        /// Device log containing begin/end markers
        #[arg(long)]
        log: String,

        /// Harness config (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<String>,

        /// Override the begin marker
        #[arg(long)]
        start_marker: Option<String>,

        /// Override the end marker
        #[arg(long)]
        end_marker: Option<String>,

        /// Write intervals as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Measure every valid interval against a raw capture (no posting)
    Measure {
        #[arg(long)]
        log: String,

        /// Raw power-monitor capture
        #[arg(long)]
        raw: String,

        /// Power monitor that produced the capture
        #[arg(long, value_enum, default_value_t = Monitor::Monsoon)]
        monitor: Monitor,

        #[arg(long)]
        config: Option<String>,

        /// Host epoch (ms) at which a Sweetberry capture started
        #[arg(long)]
        epoch_ms: Option<i64>,

        /// Write measurements as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Full run: intervals, measurements, metrics and posted results
    Run {
        #[arg(long)]
        log: String,

        #[arg(long)]
        raw: String,

        #[arg(long, value_enum, default_value_t = Monitor::Monsoon)]
        monitor: Monitor,

        #[arg(long)]
        config: Option<String>,

        /// Override the configured rounding precision
        #[arg(long)]
        decimal_places: Option<u32>,

        #[arg(long)]
        epoch_ms: Option<i64>,

        /// Write the run report as JSON
        #[arg(long)]
        output: Option<String>,

        /// Exit non-zero when any posted result failed
        #[arg(long)]
        strict: bool,
    },

    /// Show stored results for one reporting unit and schema
    History {
        /// Harness config with a `history` section
        #[arg(long)]
        config: String,

        /// Reporting unit
        #[arg(long)]
        ru: String,

        #[arg(long)]
        schema: String,
    },
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::Intervals {
            log,
            config,
            start_marker,
            end_marker,
            output,
        } => commands::intervals::run(commands::intervals::IntervalsCommandConfig {
            log_path: &log,
            config_path: config.as_deref(),
            start_marker: start_marker.as_deref(),
            end_marker: end_marker.as_deref(),
            output_path: output.as_deref(),
        }),
        Commands::Measure {
            log,
            raw,
            monitor,
            config,
            epoch_ms,
            output,
        } => commands::measure::run(
            &log,
            &raw,
            monitor,
            config.as_deref(),
            epoch_ms,
            output.as_deref(),
        ),
        Commands::Run {
            log,
            raw,
            monitor,
            config,
            decimal_places,
            epoch_ms,
            output,
            strict,
        } => commands::run::run(commands::run::RunCommandConfig {
            log_path: &log,
            raw_path: &raw,
            monitor,
            config_path: config.as_deref(),
            decimal_places,
            epoch_ms,
            output_path: output.as_deref(),
            strict,
        }),
        Commands::History { config, ru, schema } => commands::history::run(&config, &ru, &schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_defaults_to_monsoon() {
        let cli =
            Cli::try_parse_from(["powertrace", "measure", "--log", "l", "--raw", "r"]).unwrap();
        match cli.command {
            Commands::Measure { monitor, .. } => assert_eq!(monitor, Monitor::Monsoon),
            _ => panic!("expected measure"),
        }
    }

    #[test]
    fn unknown_monitor_is_rejected() {
        let res = Cli::try_parse_from([
            "powertrace", "run", "--log", "l", "--raw", "r", "--monitor", "keysight",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn sweetberry_monitor_parses() {
        let cli = Cli::try_parse_from([
            "powertrace", "run", "--log", "l", "--raw", "r", "--monitor", "sweetberry",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { monitor, .. } => assert_eq!(monitor, Monitor::Sweetberry),
            _ => panic!("expected run"),
        }
    }
}
