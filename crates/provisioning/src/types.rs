// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, path::PathBuf};

use partitioning::SizeSpec;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

mod filesystem;
pub use filesystem::*;

mod mount_target;
pub use mount_target::*;

/// How the user chose to lay out the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Wipe the disk and create boot, swap and root partitions
    Automatic,
    /// Keep existing partitions and assign mountpoints to them
    Manual,
    /// Use whatever is already mounted at the mount root
    Preexisting,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => f.write_str("automatic"),
            Self::Manual => f.write_str("manual"),
            Self::Preexisting => f.write_str("preexisting"),
        }
    }
}

/// One partition of a plan
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Device node of the partition (e.g. /dev/sda1)
    pub device_path: PathBuf,

    pub filesystem_type: FilesystemType,

    /// fdisk size token, empty for the remaining space
    #[serde_as(as = "DisplayFromStr")]
    pub size: SizeSpec,

    pub mountpoint: MountTarget,
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = if self.size.is_remaining() {
            "remaining space".to_owned()
        } else {
            self.size.to_string()
        };
        write!(
            f,
            "{} ({}, {size}) at {}",
            self.device_path.display(),
            self.filesystem_type,
            self.mountpoint
        )
    }
}
