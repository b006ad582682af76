//! Preflight checks for a migration.
//!
//! Validates host tools and the personalization environment before any
//! conversion starts. Run with `vmigrate preflight` to check everything.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::process::CommandRunner;

pub use environment::ensure_bases;
pub use host_tools::REQUIRED_TOOLS;
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config, runner: &dyn CommandRunner) -> PreflightReport {
    let mut checks = Vec::new();

    tracing::info!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(config, runner));

    tracing::info!("Checking migration environment...");
    checks.extend(environment::check_environment(config));

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    let report = run_preflight(config, runner);

    if !report.all_passed() {
        report.print();
        bail!(
            "Preflight failed: {} check(s) failed ({}). Fix the issues above before migrating.",
            report.fail_count(),
            report.failures().join(", ")
        );
    }

    Ok(())
}
