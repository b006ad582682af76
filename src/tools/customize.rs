//! virt-customize invocation.

use std::path::{Path, PathBuf};

use crate::config::BACKEND_VAR;
use crate::process::Cmd;

pub const PROGRAM: &str = "virt-customize";

/// One customization step, rendered to virt-customize flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomizeOp {
    /// `--mkdir DIR` (like `mkdir -p`)
    Mkdir(String),
    /// `--write FILE:CONTENT`
    Write { path: String, content: String },
    /// `--run-command CMD` through the guest shell
    RunCommand(String),
    /// `--selinux-relabel`, scheduled for the next boot when not possible offline
    SelinuxRelabel,
}

impl CustomizeOp {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            CustomizeOp::Mkdir(dir) => vec!["--mkdir".to_string(), dir.clone()],
            CustomizeOp::Write { path, content } => {
                vec!["--write".to_string(), format!("{}:{}", path, content)]
            }
            CustomizeOp::RunCommand(cmd) => vec!["--run-command".to_string(), cmd.clone()],
            CustomizeOp::SelinuxRelabel => vec!["--selinux-relabel".to_string()],
        }
    }
}

/// All customization steps for one image, executed in a single appliance boot.
#[derive(Debug, Clone)]
pub struct Customize {
    image: PathBuf,
    backend: String,
    ops: Vec<CustomizeOp>,
}

impl Customize {
    pub fn new(image: &Path, backend: &str) -> Self {
        Self {
            image: image.to_path_buf(),
            backend: backend.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn op(mut self, op: CustomizeOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(mut self, ops: impl IntoIterator<Item = CustomizeOp>) -> Self {
        self.ops.extend(ops);
        self
    }

    pub fn get_ops(&self) -> &[CustomizeOp] {
        &self.ops
    }

    pub fn to_cmd(&self) -> Cmd {
        let mut cmd = Cmd::new(PROGRAM)
            .arg("-a")
            .arg_path(&self.image)
            .args(["--format", "qcow2"]);
        for op in &self.ops {
            cmd = cmd.args(op.to_args());
        }
        cmd.env(BACKEND_VAR, &self.backend).allow_fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_render_in_order() {
        let cmd = Customize::new(Path::new("/b/vm-sda"), "direct")
            .op(CustomizeOp::Mkdir("/etc/ssh/sshd_config.d".into()))
            .op(CustomizeOp::Write {
                path: "/etc/motd".into(),
                content: "hello\n".into(),
            })
            .op(CustomizeOp::RunCommand("true".into()))
            .op(CustomizeOp::SelinuxRelabel)
            .to_cmd();

        assert_eq!(
            cmd.get_args(),
            [
                "-a",
                "/b/vm-sda",
                "--format",
                "qcow2",
                "--mkdir",
                "/etc/ssh/sshd_config.d",
                "--write",
                "/etc/motd:hello\n",
                "--run-command",
                "true",
                "--selinux-relabel",
            ]
        );
        assert_eq!(cmd.get_env("LIBGUESTFS_BACKEND"), Some("direct"));
    }
}
