//! Inspect command - sanity checks of an already converted image.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::migrate;
use crate::process::SystemRunner;

/// Execute the inspect command.
pub fn cmd_inspect(config: &Config, image: &Path) -> Result<()> {
    if !image.is_file() {
        bail!("Image not found: {}", image.display());
    }
    let report = migrate::sanity_check(image, config, &SystemRunner)?;
    report.print();
    Ok(())
}
