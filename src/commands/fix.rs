//! Fix command - post-boot repairs on the migrated guest.

use anyhow::{bail, Result};
use std::path::Path;

use crate::fixer::Fixer;
use crate::process::SystemRunner;

/// Execute the fix command against `root`.
pub fn cmd_fix(root: &Path) -> Result<()> {
    if !root.is_dir() {
        bail!("Root directory not found: {}", root.display());
    }
    println!("=== Post-boot fix ({}) ===\n", root.display());

    let report = Fixer::new(root, &SystemRunner).run_all()?;
    report.print();
    Ok(())
}
