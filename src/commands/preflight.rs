//! Preflight command - runs preflight checks.

use anyhow::Result;

use crate::config::Config;
use crate::preflight;
use crate::process::SystemRunner;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    let runner = SystemRunner;
    if strict {
        preflight::run_preflight_or_fail(config, &runner)?;
    } else {
        let report = preflight::run_preflight(config, &runner);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to exit non-zero.");
        }
    }
    Ok(())
}
