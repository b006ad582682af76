//! fstab parsing and repair.

/// Appended to every fstab line disabled because its device is missing.
pub const DISABLED_SUFFIX: &str = "# Commented by migration - disk not available";

/// Mount point substrings that usually live on a secondary disk.
const DATA_MOUNT_WORDS: &[&str] = &["backup", "data", "storage"];

/// Filesystem types that never reference a block device.
const PSEUDO_FS: &[&str] = &["proc", "sysfs", "devpts", "tmpfs", "devtmpfs", "swap", "none"];

/// A parsed, non-comment fstab line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: Option<String>,
    /// The line exactly as it appeared in the file.
    pub line: String,
}

/// Outcome of [`disable_missing_devices`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FstabRepair {
    /// Full rewritten content.
    pub content: String,
    /// Original lines that were commented out, in file order.
    pub disabled: Vec<String>,
}

impl FstabRepair {
    pub fn changed(&self) -> bool {
        !self.disabled.is_empty()
    }
}

/// Strip trailing partition digits: `/dev/sdb1` -> `/dev/sdb`.
pub fn base_device(device: &str) -> &str {
    device.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// The line with the marker that disables it.
pub fn disabled_line(line: &str) -> String {
    format!("# {} {}", line, DISABLED_SUFFIX)
}

fn is_comment_or_blank(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse a single line; comments, blanks and one-field lines yield `None`.
pub fn parse_line(line: &str) -> Option<FstabEntry> {
    if is_comment_or_blank(line) {
        return None;
    }
    let mut fields = line.split_whitespace();
    let device = fields.next()?;
    let mount_point = fields.next()?;
    Some(FstabEntry {
        device: device.to_string(),
        mount_point: mount_point.to_string(),
        fs_type: fields.next().map(str::to_string),
        line: line.to_string(),
    })
}

/// Parse every active entry.
pub fn parse(content: &str) -> Vec<FstabEntry> {
    content.lines().filter_map(parse_line).collect()
}

/// Comment out `/dev/...` lines whose device is not present.
///
/// `is_present` is asked about the exact device node first and then about
/// the base device with partition digits stripped; a line is disabled only
/// when both are absent. Every other line, including the line terminators,
/// is passed through byte for byte.
pub fn disable_missing_devices<F>(content: &str, is_present: F) -> FstabRepair
where
    F: Fn(&str) -> bool,
{
    let mut disabled = Vec::new();
    let lines: Vec<String> = content
        .split('\n')
        .map(|line| {
            if is_comment_or_blank(line) {
                return line.to_string();
            }
            let device = match line.split_whitespace().next() {
                Some(dev) if dev.starts_with("/dev/") => dev,
                _ => return line.to_string(),
            };
            if is_present(device) || is_present(base_device(device)) {
                line.to_string()
            } else {
                disabled.push(line.to_string());
                disabled_line(line)
            }
        })
        .collect();

    FstabRepair {
        content: lines.join("\n"),
        disabled,
    }
}

/// Lines previously disabled by [`disable_missing_devices`].
pub fn previously_disabled(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| line.trim_start().starts_with('#') && line.ends_with(DISABLED_SUFFIX))
        .map(str::to_string)
        .collect()
}

/// True for `/dev/sdb`, `/dev/vdc2`, `/dev/xvdb1`, ... (any disk past the first).
fn is_secondary_disk(device: &str) -> bool {
    let Some(name) = device.strip_prefix("/dev/") else {
        return false;
    };
    let letters = ["xvd", "sd", "vd", "hd"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .map(|rest| rest.trim_end_matches(|c: char| c.is_ascii_digit()));

    match letters {
        Some(l) if !l.is_empty() && l.chars().all(|c| c.is_ascii_lowercase()) => l != "a",
        _ => false,
    }
}

/// Entries that look like they belong to a disk that was not migrated.
///
/// Flags mounts on a secondary disk node and mounts whose path names a
/// backup/data/storage area. Pseudo filesystems are never flagged.
pub fn suspicious_mounts(content: &str) -> Vec<FstabEntry> {
    parse(content)
        .into_iter()
        .filter(|entry| {
            if entry
                .fs_type
                .as_deref()
                .is_some_and(|fs| PSEUDO_FS.contains(&fs))
            {
                return false;
            }
            let mount = entry.mount_point.to_lowercase();
            is_secondary_disk(&entry.device)
                || DATA_MOUNT_WORDS.iter().any(|word| mount.contains(word))
        })
        .collect()
}
