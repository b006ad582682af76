//! Pure text patching for guest configuration files.
//!
//! Nothing in here touches the filesystem. Callers read a file, hand the
//! content to these functions and decide whether to write the result back.

pub mod fstab;
pub mod grub;

/// Device prefix used by virtio disks on the source hypervisor.
pub const VIRTIO_DISK: &str = "/dev/vda";

/// Device prefix the target hypervisor exposes the boot disk as.
pub const SCSI_DISK: &str = "/dev/sda";

/// Replace every `/dev/vda` occurrence with `/dev/sda`.
///
/// Case-sensitive; partition suffixes ride along (`/dev/vda1` -> `/dev/sda1`).
pub fn rewrite_vda(content: &str) -> String {
    content.replace(VIRTIO_DISK, SCSI_DISK)
}
