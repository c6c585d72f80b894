// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Filesystem a partition is formatted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    /// FAT32, used for the EFI system partition
    Vfat,
    Ext4,
    Btrfs,
    Xfs,
    /// Not a filesystem, but tagged like one
    Swap,
}

impl FilesystemType {
    /// Filesystems offered when reusing existing partitions
    pub const MANUAL_CHOICES: [FilesystemType; 3] = [Self::Ext4, Self::Btrfs, Self::Xfs];

    pub fn is_swap(&self) -> bool {
        matches!(self, Self::Swap)
    }

    /// Whether a subvolume mapping may be mounted from this filesystem
    pub fn supports_subvolumes(&self) -> bool {
        matches!(self, Self::Btrfs)
    }

    /// Whether this can hold the root filesystem
    pub fn is_root_capable(&self) -> bool {
        matches!(self, Self::Ext4 | Self::Btrfs | Self::Xfs)
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vfat => f.write_str("vfat"),
            Self::Ext4 => f.write_str("ext4"),
            Self::Btrfs => f.write_str("btrfs"),
            Self::Xfs => f.write_str("xfs"),
            Self::Swap => f.write_str("swap"),
        }
    }
}

impl FromStr for FilesystemType {
    type Err = crate::Error;

    /// Parses a filesystem name as lsblk reports it
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "vfat" => Ok(Self::Vfat),
            "ext4" => Ok(Self::Ext4),
            "btrfs" => Ok(Self::Btrfs),
            "xfs" => Ok(Self::Xfs),
            "swap" => Ok(Self::Swap),
            _ => Err(crate::Error::invalid(format!("unsupported filesystem: {value}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_names() {
        for fs in [
            FilesystemType::Vfat,
            FilesystemType::Ext4,
            FilesystemType::Btrfs,
            FilesystemType::Xfs,
            FilesystemType::Swap,
        ] {
            assert_eq!(fs.to_string().parse::<FilesystemType>().unwrap(), fs);
        }
        assert!("ntfs".parse::<FilesystemType>().is_err());
        assert!("crypto_LUKS".parse::<FilesystemType>().is_err());
    }

    #[test]
    fn test_capabilities() {
        assert!(FilesystemType::Btrfs.supports_subvolumes());
        assert!(!FilesystemType::Ext4.supports_subvolumes());
        assert!(!FilesystemType::Vfat.is_root_capable());
        assert!(!FilesystemType::Swap.is_root_capable());
        assert!(FilesystemType::MANUAL_CHOICES.iter().all(FilesystemType::is_root_capable));
    }
}
