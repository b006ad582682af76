//! GRUB configuration regeneration.
//!
//! The same candidate list drives both the offline fix (rendered into one
//! shell chain for virt-customize) and the post-boot fixer (tried one by one
//! on the live guest).

use crate::guest::{BootMode, Distro};
use crate::process::Cmd;

/// Config generators, preferred first.
pub const GRUB_TOOLS: &[&str] = &["grub2-mkconfig", "grub-mkconfig"];

/// BIOS-mode grub.cfg locations.
pub const LEGACY_TARGETS: &[&str] = &["/boot/grub2/grub.cfg", "/boot/grub/grub.cfg"];

/// One `<tool> -o <output>` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrubMkconfig {
    pub tool: String,
    pub output: String,
}

impl GrubMkconfig {
    pub fn new(tool: &str, output: &str) -> Self {
        Self {
            tool: tool.to_string(),
            output: output.to_string(),
        }
    }

    /// Every tool/target pair worth trying for this guest, in order.
    pub fn candidates(mode: BootMode, distro: Distro) -> Vec<Self> {
        let targets = output_paths(mode, distro);
        GRUB_TOOLS
            .iter()
            .flat_map(|tool| targets.iter().map(move |target| Self::new(tool, target)))
            .collect()
    }

    /// Directory that must exist for the output to make sense.
    pub fn output_dir(&self) -> &str {
        self.output
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .filter(|dir| !dir.is_empty())
            .unwrap_or("/")
    }

    pub fn to_cmd(&self) -> Cmd {
        Cmd::new(&self.tool)
            .args(["-o", &self.output])
            .allow_fail()
    }

    /// Guarded shell form: skipped when the tool or target directory is missing.
    pub fn to_shell(&self) -> String {
        format!(
            "{{ command -v {tool} >/dev/null 2>&1 && [ -d {dir} ] && {tool} -o {out}; }}",
            tool = self.tool,
            dir = self.output_dir(),
            out = self.output
        )
    }
}

/// grub.cfg locations for a boot mode.
pub fn output_paths(mode: BootMode, distro: Distro) -> Vec<String> {
    match mode {
        BootMode::Uefi => distro
            .efi_vendor_dirs()
            .iter()
            .map(|vendor| format!("/boot/efi/EFI/{}/grub.cfg", vendor))
            .collect(),
        BootMode::Legacy => LEGACY_TARGETS.iter().map(|s| s.to_string()).collect(),
    }
}

/// A single shell command that tries every candidate and never fails.
pub fn regeneration_chain(mode: BootMode, distro: Distro) -> String {
    let mut parts: Vec<String> = GrubMkconfig::candidates(mode, distro)
        .iter()
        .map(GrubMkconfig::to_shell)
        .collect();
    parts.push("true".to_string());
    parts.join(" || ")
}
