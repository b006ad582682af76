//! Facts about a guest operating system: boot mode and distro family.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// EFI system partition directory inside the guest.
pub const EFI_DIR: &str = "boot/efi/EFI";

/// Firmware interface the guest bootloader expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    Legacy,
    Uefi,
}

impl BootMode {
    /// Classify from the output of listing the EFI directory.
    ///
    /// Any non-blank listing means UEFI.
    pub fn from_efi_listing(listing: &str) -> Self {
        if listing.trim().is_empty() {
            BootMode::Legacy
        } else {
            BootMode::Uefi
        }
    }

    /// Classify a mounted guest tree rooted at `root`.
    pub fn detect(root: &Path) -> Self {
        let populated = fs::read_dir(root.join(EFI_DIR))
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if populated {
            BootMode::Uefi
        } else {
            BootMode::Legacy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BootMode::Legacy => "legacy",
            BootMode::Uefi => "uefi",
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Red Hat family flavour, used to locate the vendor EFI directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    CentOs,
    Rhel,
    Unknown,
}

impl Distro {
    /// CentOS ships both release files, so it is checked first.
    pub fn detect(root: &Path) -> Self {
        if root.join("etc/centos-release").exists() {
            Distro::CentOs
        } else if root.join("etc/redhat-release").exists() {
            Distro::Rhel
        } else {
            Distro::Unknown
        }
    }

    /// Vendor subdirectories under `/boot/efi/EFI` worth trying, in order.
    pub fn efi_vendor_dirs(&self) -> &'static [&'static str] {
        match self {
            Distro::CentOs => &["centos"],
            Distro::Rhel => &["redhat"],
            Distro::Unknown => &["centos", "redhat"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Distro::CentOs => "centos",
            Distro::Rhel => "redhat",
            Distro::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
