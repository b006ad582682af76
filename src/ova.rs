//! OVA archive inspection.
//!
//! An OVA is a plain tar holding an OVF descriptor, an optional manifest and
//! one `.vmdk` per virtual disk. Only the entry names are read; disk payloads
//! are skipped over by the tar reader.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Names of all `.vmdk` entries, in archive order.
pub fn list_disks_from<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(reader);
    let mut disks = Vec::new();
    for entry in archive.entries().context("Failed to read OVA entries")? {
        let entry = entry.context("Corrupt OVA entry")?;
        let path = entry.path().context("Invalid OVA entry name")?;
        let name = path.to_string_lossy().into_owned();
        if name.to_lowercase().ends_with(".vmdk") {
            disks.push(name);
        }
    }
    Ok(disks)
}

/// Names of all `.vmdk` entries in the OVA at `path`.
pub fn list_disks(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    list_disks_from(BufReader::new(file))
        .with_context(|| format!("Failed to inspect OVA {}", path.display()))
}

/// Number of virtual disks in the OVA at `path`.
pub fn count_disks(path: &Path) -> Result<usize> {
    Ok(list_disks(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ova(names: &[&str]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for name in names {
            let data = b"payload";
            let mut header = tar::Header::new_ustar();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, &data[..]).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_counts_only_vmdk_entries() {
        let ova = build_ova(&["vm.ovf", "vm.mf", "vm-disk1.vmdk", "vm-disk2.VMDK"]);
        let disks = list_disks_from(&ova[..]).unwrap();
        assert_eq!(disks, vec!["vm-disk1.vmdk", "vm-disk2.VMDK"]);
    }

    #[test]
    fn test_no_disks() {
        let ova = build_ova(&["vm.ovf"]);
        assert!(list_disks_from(&ova[..]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(count_disks(Path::new("/nonexistent/vm.ova")).is_err());
    }
}
