//! Offline image inspection and file transfer through libguestfs tools.
//!
//! Everything that only reads the image goes through `guestfish --ro -i`,
//! which inspects the guest and mounts its filesystems read-only.

use std::path::{Path, PathBuf};

use crate::config::BACKEND_VAR;
use crate::process::Cmd;

pub const GUESTFISH: &str = "guestfish";
pub const COPY_OUT: &str = "virt-copy-out";
pub const COPY_IN: &str = "virt-copy-in";

/// Builder for commands against a single qcow2 image.
#[derive(Debug, Clone)]
pub struct Guestfs {
    image: PathBuf,
    backend: String,
}

impl Guestfs {
    pub fn new(image: &Path, backend: &str) -> Self {
        Self {
            image: image.to_path_buf(),
            backend: backend.to_string(),
        }
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    fn guestfish(&self, action: &[&str]) -> Cmd {
        Cmd::new(GUESTFISH)
            .args(["--ro", "--format=qcow2", "-a"])
            .arg_path(&self.image)
            .arg("-i")
            .args(action)
            .env(BACKEND_VAR, &self.backend)
            .allow_fail()
    }

    /// `ls` a guest directory; empty output or failure means nothing there.
    pub fn ls(&self, guest_dir: &str) -> Cmd {
        self.guestfish(&["ls", guest_dir])
    }

    /// `cat` a guest file.
    pub fn cat(&self, guest_path: &str) -> Cmd {
        self.guestfish(&["cat", guest_path])
    }

    /// Copy one guest file into a host directory.
    pub fn copy_out(&self, guest_path: &str, host_dir: &Path) -> Cmd {
        Cmd::new(COPY_OUT)
            .arg("-a")
            .arg_path(&self.image)
            .arg(guest_path)
            .arg_path(host_dir)
            .env(BACKEND_VAR, &self.backend)
            .allow_fail()
    }

    /// Copy one host file into a guest directory.
    pub fn copy_in(&self, host_path: &Path, guest_dir: &str) -> Cmd {
        Cmd::new(COPY_IN)
            .arg("-a")
            .arg_path(&self.image)
            .arg_path(host_path)
            .arg(guest_dir)
            .env(BACKEND_VAR, &self.backend)
            .allow_fail()
    }
}
