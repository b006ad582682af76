//! Migration environment checks: personalization script, bases, backend.

use anyhow::{bail, Context, Result};

use crate::config::{Config, BACKEND_VAR};
use crate::process::{Cmd, CommandRunner};

use super::types::CheckResult;

/// Check the personalization script, bases directory and backend.
pub fn check_environment(config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if config.script.is_file() {
        results.push(CheckResult::pass("personalization script"));
    } else {
        results.push(CheckResult::fail(
            "personalization script",
            &format!("{} not found (set VMIGRATE_SCRIPT)", config.script.display()),
        ));
    }

    if config.bases_dir.is_dir() {
        results.push(CheckResult::pass("bases/"));
    } else if config.bootstrap.is_file() {
        results.push(CheckResult::warn(
            "bases/",
            &format!(
                "{} missing, will be created by {}",
                config.bases_dir.display(),
                config.bootstrap.display()
            ),
        ));
    } else {
        results.push(CheckResult::fail(
            "bases/",
            &format!(
                "{} missing and no bootstrap script at {}",
                config.bases_dir.display(),
                config.bootstrap.display()
            ),
        ));
    }

    if std::fs::create_dir_all(&config.work_dir).is_ok() {
        results.push(CheckResult::pass("work directory"));
    } else {
        results.push(CheckResult::fail(
            "work directory",
            &format!("Cannot create {}", config.work_dir.display()),
        ));
    }

    results.push(CheckResult::pass_with(BACKEND_VAR, &config.backend));

    results
}

/// Make sure the bases directory exists, running the bootstrap script if needed.
pub fn ensure_bases(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    if config.bases_dir.is_dir() {
        return Ok(());
    }

    if !config.bootstrap.is_file() {
        bail!(
            "Bases directory {} is missing and bootstrap script {} was not found",
            config.bases_dir.display(),
            config.bootstrap.display()
        );
    }

    tracing::info!(
        "Creating {} with {}",
        config.bases_dir.display(),
        config.bootstrap.display()
    );

    let mut cmd = Cmd::new("sh")
        .arg_path(&config.bootstrap)
        .error_msg("Bootstrap script failed");
    if let Some(dir) = config.bootstrap.parent() {
        cmd = cmd.dir(dir);
    }
    runner
        .run(cmd)
        .with_context(|| format!("Running {}", config.bootstrap.display()))?;

    if !config.bases_dir.is_dir() {
        bail!(
            "Bootstrap script {} did not create {}",
            config.bootstrap.display(),
            config.bases_dir.display()
        );
    }
    Ok(())
}
