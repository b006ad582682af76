//! Migrate and convert commands.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::converter::{ConversionOutcome, Converter};
use crate::logging::{self, MigrationLog};
use crate::migrate::{self, MigrateOptions};
use crate::preflight;
use crate::process::SystemRunner;

/// Open the migration log in the work directory and route tracing into it.
fn open_log(config: &Config, verbose: bool) -> Result<MigrationLog> {
    let path = config
        .work_dir
        .join(format!("vmigrate-{}.log", migrate::timestamp()));
    let log = MigrationLog::create(&path)?;
    logging::init(verbose, Some(&log));
    tracing::info!("Logging to {}", log.path().display());
    Ok(log)
}

/// The running executable, archived as the post-boot fixer.
fn fixer_executable() -> Option<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => Some(exe),
        Err(e) => {
            tracing::warn!("Cannot locate own executable, fixer not archived: {}", e);
            None
        }
    }
}

/// Execute the migrate command: full pipeline with sanity checks and archive.
pub fn cmd_migrate(config: &Config, source: &Path, dest: &Path, verbose: bool) -> Result<()> {
    let log = open_log(config, verbose)?;
    let fixer = fixer_executable();
    let opts = MigrateOptions {
        source,
        dest,
        fixer: fixer.as_deref(),
    };
    migrate::run_migration(config, &SystemRunner, &log, &opts)?;
    Ok(())
}

/// Execute the convert command: conversion and classification only.
pub fn cmd_convert(config: &Config, source: &Path, dest: &Path, verbose: bool) -> Result<()> {
    let log = open_log(config, verbose)?;
    let runner = SystemRunner;

    let mode = migrate::validate_paths(source, dest)?;
    preflight::run_preflight_or_fail(config, &runner)?;
    migrate::report_disk_count(source, mode)?;

    let outcome = Converter::new(config, &runner, &log)
        .convert(source, dest)
        .with_context(|| format!("Converting {}", source.display()))?;

    match outcome {
        ConversionOutcome::Success(converted) => {
            println!("Converted {} ({})", converted.dest.display(), converted.boot_mode);
        }
        ConversionOutcome::DegradedSuccess { converted, exit_code } => {
            println!(
                "Converted {} ({}), virt-v2v exit code {}",
                converted.dest.display(),
                converted.boot_mode,
                exit_code
            );
            for w in &converted.warnings {
                println!("  warning: {}", w);
            }
        }
        ConversionOutcome::Failure { exit_code, reason } => {
            migrate::print_failure(exit_code, &reason, &log);
            bail!("Conversion failed: no converted image was produced");
        }
    }
    Ok(())
}
