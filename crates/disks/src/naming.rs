// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Partition naming schemes
//!
//! The kernel names partitions differently depending on the disk family. NVMe
//! namespaces (`nvme0n1`) end in a digit, so their partitions get a `p` infix
//! (`nvme0n1p1`). SCSI disks, which per modern conventions includes every libata
//! device (`sda`), and virtio disks (`vda`) simply append the number (`sda1`).

use std::{fmt, path::PathBuf, sync::LazyLock};

use regex::Regex;

use crate::{device_path, disk_name};

// nvmeXnY where X and Y are digits. Partitions (nvmeXnYpZ) are excluded.
static NVME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^nvme\d+n\d+$").expect("static nvme pattern"));

/// How partitions of a disk are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// NVMe namespace (e.g. nvme0n1 -> nvme0n1p1)
    Nvme,
    /// SCSI/SATA disk (e.g. sda -> sda1)
    Scsi,
    /// Virtual disk (e.g. vda -> vda1)
    Virtio,
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvme => f.write_str("nvme"),
            Self::Scsi => f.write_str("scsi"),
            Self::Virtio => f.write_str("virtio"),
        }
    }
}

/// Whether `name` is `prefix` followed only by lowercase letters
fn is_lettered(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_lowercase()))
}

impl NamingScheme {
    /// Detects the naming scheme for a disk, given bare or as a `/dev` path.
    ///
    /// Returns `None` for any name outside the supported families, including
    /// partitions themselves.
    pub fn detect(disk: &str) -> Option<Self> {
        let name = disk_name(disk);
        if NVME_PATTERN.is_match(name) {
            Some(Self::Nvme)
        } else if is_lettered(name, "sd") {
            Some(Self::Scsi)
        } else if is_lettered(name, "vd") {
            Some(Self::Virtio)
        } else {
            None
        }
    }

    /// Kernel name of partition `number` on `disk`
    pub fn partition_name(&self, disk: &str, number: u32) -> String {
        let name = disk_name(disk);
        match self {
            Self::Nvme => format!("{name}p{number}"),
            Self::Scsi | Self::Virtio => format!("{name}{number}"),
        }
    }

    /// Path in `/dev` of partition `number` on `disk`
    pub fn partition_path(&self, disk: &str, number: u32) -> PathBuf {
        device_path(&self.partition_name(disk, number))
    }
}

/// Number of `partition` when it is a partition of `disk`, both bare or as `/dev` paths.
///
/// Follows the kernel rule for any disk family: a disk name ending in a digit
/// separates the partition number with `p`.
pub fn partition_number(disk: &str, partition: &str) -> Option<u32> {
    let disk = disk_name(disk);
    if disk.is_empty() {
        return None;
    }
    let rest = disk_name(partition).strip_prefix(disk)?;
    let digits = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        rest.strip_prefix('p')?
    } else {
        rest
    };
    if digits.is_empty() || digits.starts_with('0') || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_nvme_uses_p_infix() {
        for disk in ["nvme0n1", "nvme1n2", "nvme10n1", "/dev/nvme0n1"] {
            let scheme = NamingScheme::detect(disk).unwrap();
            assert_eq!(scheme, NamingScheme::Nvme);
            for n in 1..=3 {
                let path = scheme.partition_path(disk, n);
                assert_eq!(path, PathBuf::from(format!("/dev/{}p{n}", disk_name(disk))));
            }
        }
    }

    #[test]
    fn test_scsi_appends_number() {
        for disk in ["sda", "sdb", "sdaa", "/dev/sdc"] {
            let scheme = NamingScheme::detect(disk).unwrap();
            assert_eq!(scheme, NamingScheme::Scsi);
            let path = scheme.partition_path(disk, 2);
            assert_eq!(path, PathBuf::from(format!("/dev/{}2", disk_name(disk))));
            assert!(!path.to_string_lossy().contains("p2"));
        }
    }

    #[test]
    fn test_virtio() {
        let scheme = NamingScheme::detect("vda").unwrap();
        assert_eq!(scheme, NamingScheme::Virtio);
        assert_eq!(scheme.partition_name("vda", 3), "vda3");
    }

    #[test]
    fn test_unsupported_names() {
        for disk in ["", "mmcblk0", "loop0", "sr0", "sda1", "nvme0n1p1", "nvme0", "hda", "sd", "xvda", "dm-0"] {
            assert_eq!(NamingScheme::detect(disk), None, "{disk} should be unsupported");
        }
    }

    #[test]
    fn test_partition_number() {
        assert_eq!(partition_number("sda", "sda3"), Some(3));
        assert_eq!(partition_number("/dev/sda", "/dev/sda12"), Some(12));
        assert_eq!(partition_number("nvme0n1", "/dev/nvme0n1p2"), Some(2));
        assert_eq!(partition_number("mmcblk0", "mmcblk0p1"), Some(1));

        for (disk, partition) in [
            ("sda", "sdb1"),
            ("sda", "sda"),
            ("sda", "sdaa1"),
            ("sda", "sdap1"),
            ("sda", "sda0"),
            ("nvme0n1", "nvme0n11"),
            ("nvme0n1", "nvme0n1p"),
            ("sda", "/srv/sda1"),
            ("", "1"),
        ] {
            assert_eq!(partition_number(disk, partition), None, "{partition} is not on {disk}");
        }
    }

    #[test]
    fn test_partition_number_matches_scheme() {
        for disk in ["sda", "vdb", "nvme1n1"] {
            let scheme = NamingScheme::detect(disk).unwrap();
            for n in 1..=4 {
                let name = scheme.partition_name(disk, n);
                assert_eq!(partition_number(disk, &name), Some(n));
            }
        }
    }
}
