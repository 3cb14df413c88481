//! `powertrace history`: stored results for one reporting unit and schema.

use powertrace_core::HistoryStore;

/// Run the history command.
pub fn run(config_path: &str, reporting_unit: &str, schema: &str) {
    let config = super::load_config(Some(config_path));
    let Some(history) = config.history else {
        eprintln!("{config_path} has no 'history' section");
        std::process::exit(1);
    };
    let store = HistoryStore::new(history);
    let path = store.path_for(reporting_unit, schema);

    let entries = match store.load(reporting_unit, schema) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", path.display());
            std::process::exit(1);
        }
    };
    if entries.is_empty() {
        println!("No stored results in {}", path.display());
        return;
    }

    println!("{}\n", path.display());
    println!("{:>15} {:>14}", "Timestamp (ms)", "Value");
    for e in &entries {
        println!("{:>15} {:>14}", e.timestamp_ms, e.value);
    }
    let mean = entries.iter().map(|e| e.value).sum::<f64>() / entries.len() as f64;
    println!("\n{} run(s), average {mean:.4}", entries.len());
}
