//! Kernel block-device naming rules.
//!
//! SCSI-style disks (`sda`, `vdb`) number their partitions directly (`sda1`). Disks whose
//! own name already ends in a digit (`nvme0n1`, `mmcblk0`, `loop3`) put a `p` in between
//! (`nvme0n1p1`).

use std::path::{Path, PathBuf};

/// Families whose whole-disk names end in a unit number.
const DIGIT_TERMINATED: &[&str] = &["nvme", "mmcblk", "loop", "nbd", "md", "zram", "dm-"];

/// Whether `name` (without `/dev/`) lives in one of the namespaces the enumerator scans:
/// `sd*`, `nvme*n*` and `mmcblk*`, partitions included.
pub fn is_disk_name(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix("sd") {
        let letters = rest.trim_start_matches(|c: char| c.is_ascii_lowercase());
        return letters.len() < rest.len() && letters.chars().all(|c| c.is_ascii_digit());
    }
    if let Some(rest) = name.strip_prefix("nvme") {
        let Some(rest) = strip_number(rest).and_then(|r| r.strip_prefix('n')) else {
            return false;
        };
        return strip_number(rest).is_some_and(optional_partition);
    }
    if let Some(rest) = name.strip_prefix("mmcblk") {
        return strip_number(rest).is_some_and(optional_partition);
    }
    false
}

fn strip_number(s: &str) -> Option<&str> {
    let rest = s.trim_start_matches(|c: char| c.is_ascii_digit());
    (rest.len() < s.len()).then_some(rest)
}

fn optional_partition(rest: &str) -> bool {
    rest.is_empty()
        || rest
            .strip_prefix('p')
            .and_then(strip_number)
            .is_some_and(str::is_empty)
}

/// Strips a partition suffix from a device name: `sdb1` → `sdb`, `nvme0n1p2` → `nvme0n1`.
/// Whole-disk names are returned unchanged.
pub fn base_name(name: &str) -> &str {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.len() == name.len() || stem.is_empty() {
        return name;
    }
    if let Some(disk) = stem.strip_suffix('p')
        && disk.ends_with(|c: char| c.is_ascii_digit())
    {
        return disk;
    }
    if DIGIT_TERMINATED.iter().any(|family| name.starts_with(family)) {
        name
    } else {
        stem
    }
}

/// [`base_name`] applied to the last component of a device path.
pub fn base_device(path: &Path) -> PathBuf {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => path.with_file_name(base_name(name)),
        None => path.to_path_buf(),
    }
}

/// The device node the kernel creates for partition `number` of `parent`.
pub fn partition_path(parent: &Path, number: u32) -> PathBuf {
    let name = parent.as_os_str().to_string_lossy();
    if name.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{name}p{number}"))
    } else {
        PathBuf::from(format!("{name}{number}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_scanned_namespaces() {
        for name in ["sda", "sdb1", "sdaa", "sdab12", "nvme0n1", "nvme1n2p3", "mmcblk0", "mmcblk1p2"] {
            assert!(is_disk_name(name), "{name}");
        }
        for name in ["sd", "sr0", "loop0", "nvme0", "nvme0n", "mmcblk0boot0", "mmcblk0rpmb", "dm-0", "sda1b"] {
            assert!(!is_disk_name(name), "{name}");
        }
    }

    #[test]
    fn strips_partition_suffixes() {
        assert_eq!(base_name("sdb1"), "sdb");
        assert_eq!(base_name("sdb"), "sdb");
        assert_eq!(base_name("sdc15"), "sdc");
        assert_eq!(base_name("nvme0n1p2"), "nvme0n1");
        assert_eq!(base_name("nvme0n1"), "nvme0n1");
        assert_eq!(base_name("mmcblk0p1"), "mmcblk0");
        assert_eq!(base_name("mmcblk0"), "mmcblk0");
        assert_eq!(base_name("loop3"), "loop3");
        assert_eq!(base_name("root"), "root");
    }

    #[test]
    fn base_device_keeps_directory() {
        assert_eq!(base_device(Path::new("/dev/sda2")), Path::new("/dev/sda"));
        assert_eq!(
            base_device(Path::new("/dev/nvme0n1p3")),
            Path::new("/dev/nvme0n1")
        );
    }

    #[test]
    fn derives_first_partition_node() {
        assert_eq!(partition_path(Path::new("/dev/sdb"), 1), Path::new("/dev/sdb1"));
        assert_eq!(
            partition_path(Path::new("/dev/nvme0n1"), 1),
            Path::new("/dev/nvme0n1p1")
        );
        assert_eq!(
            partition_path(Path::new("/dev/mmcblk0"), 1),
            Path::new("/dev/mmcblk0p1")
        );
    }
}
