//! Summary printed at the end of a fixer run.

use serde::Serialize;

use crate::guest::{BootMode, Distro};

#[derive(Debug, Clone, Serialize)]
pub struct FixReport {
    pub boot_mode: BootMode,
    pub distro: Distro,
    /// Guest paths created, rewritten, regenerated or removed.
    pub modified: Vec<String>,
    /// Original fstab lines commented out because their disk is gone.
    pub disabled_fstab: Vec<String>,
    pub warnings: Vec<String>,
    pub relabel_scheduled: bool,
}

impl FixReport {
    pub fn new(boot_mode: BootMode, distro: Distro) -> Self {
        Self {
            boot_mode,
            distro,
            modified: Vec::new(),
            disabled_fstab: Vec::new(),
            warnings: Vec::new(),
            relabel_scheduled: false,
        }
    }

    pub(crate) fn touched(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.modified.contains(&path) {
            self.modified.push(path);
        }
    }

    pub(crate) fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::warn!("{}", msg);
        self.warnings.push(msg);
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Post-boot Fix Report ===\n");
        println!("  Boot mode: {}", self.boot_mode);
        println!("  Distro:    {}", self.distro);

        if self.modified.is_empty() {
            println!("  Nothing to change, system already fixed.");
        } else {
            println!("  Modified:");
            for path in &self.modified {
                println!("    {}", path);
            }
        }

        if !self.disabled_fstab.is_empty() {
            println!("  Disabled fstab entries (disk not present):");
            for line in &self.disabled_fstab {
                println!("    {}", line);
            }
        }

        for w in &self.warnings {
            println!("  ⚠ {}", w);
        }

        println!();
        if self.relabel_scheduled {
            println!("SELinux relabel scheduled: the next boot will take longer.");
        }
        println!("Reboot to apply: sudo reboot");
    }
}
