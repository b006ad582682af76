//! virt-v2v invocation.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::config::BACKEND_VAR;
use crate::process::Cmd;

pub const PROGRAM: &str = "virt-v2v";

/// How virt-v2v should read the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// OVA archive (`-i ova`)
    Ova,
    /// Single disk image (`-i disk`)
    Disk,
}

impl InputMode {
    /// Pick the mode from the source extension (`.ova` or `.qcow2`).
    pub fn from_path(source: &Path) -> Result<Self> {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ova" => Ok(InputMode::Ova),
            "qcow2" => Ok(InputMode::Disk),
            _ => bail!(
                "Unsupported source format: {} (expected .ova or .qcow2)",
                source.display()
            ),
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            InputMode::Ova => "ova",
            InputMode::Disk => "disk",
        }
    }
}

/// A virt-v2v conversion to a local qcow2.
#[derive(Debug, Clone)]
pub struct V2v {
    pub mode: InputMode,
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub output_name: String,
    pub backend: String,
}

impl V2v {
    pub fn to_cmd(&self) -> Cmd {
        Cmd::new(PROGRAM)
            .args(["-i", self.mode.flag()])
            .arg_path(&self.source)
            .args(["-o", "local", "-os"])
            .arg_path(&self.output_dir)
            .args(["-of", "qcow2", "-on", &self.output_name])
            .env(BACKEND_VAR, &self.backend)
            .allow_fail()
    }

    /// File names virt-v2v is known to produce for `output_name`, most likely first.
    pub fn artifact_candidates(&self) -> Vec<String> {
        let name = &self.output_name;
        vec![
            format!("{name}-sda"),
            format!("{name}-sda.qcow2"),
            format!("{name}.qcow2"),
            name.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_extension() {
        assert_eq!(InputMode::from_path(Path::new("vm.ova")).unwrap(), InputMode::Ova);
        assert_eq!(InputMode::from_path(Path::new("/x/VM.OVA")).unwrap(), InputMode::Ova);
        assert_eq!(InputMode::from_path(Path::new("vm.qcow2")).unwrap(), InputMode::Disk);
        assert!(InputMode::from_path(Path::new("vm.vmdk")).is_err());
        assert!(InputMode::from_path(Path::new("vm")).is_err());
    }

    #[test]
    fn test_cmd_line() {
        let v2v = V2v {
            mode: InputMode::Ova,
            source: PathBuf::from("/in/vm.ova"),
            output_dir: PathBuf::from("/tmp/build"),
            output_name: "vm-converted".to_string(),
            backend: "direct".to_string(),
        };
        let cmd = v2v.to_cmd();
        assert_eq!(cmd.program(), "virt-v2v");
        assert_eq!(
            cmd.get_args(),
            [
                "-i", "ova", "/in/vm.ova", "-o", "local", "-os", "/tmp/build", "-of", "qcow2",
                "-on", "vm-converted"
            ]
        );
        assert_eq!(cmd.get_env("LIBGUESTFS_BACKEND"), Some("direct"));
    }

    #[test]
    fn test_artifact_candidates_order() {
        let v2v = V2v {
            mode: InputMode::Disk,
            source: PathBuf::from("vm.qcow2"),
            output_dir: PathBuf::from("/b"),
            output_name: "vm".to_string(),
            backend: "direct".to_string(),
        };
        assert_eq!(
            v2v.artifact_candidates(),
            vec!["vm-sda", "vm-sda.qcow2", "vm.qcow2", "vm"]
        );
    }
}
