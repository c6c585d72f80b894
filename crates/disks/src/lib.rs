// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Disk inventory for the installer
//!
//! Physical disks and their partitions are enumerated through `lsblk`, disk names are
//! classified into a partition naming scheme, and the hardware facts consumed by
//! partition planning are probed from procfs and sysfs.

use std::{io, path::PathBuf};

use thiserror::Error;

mod command;
pub mod hardware;
pub mod inventory;
pub mod mock;
pub mod naming;

pub use command::{run, CommandError};
pub use hardware::{CpuVendor, Firmware, HardwareFacts, Incompatibility, Requirement};
pub use inventory::{DiskRecord, Inventory, Lsblk, PartitionRecord};
pub use naming::{partition_number, NamingScheme};

const DEVFS_DIR: &str = "/dev";

/// Errors raised while querying the host about its disks
#[derive(Debug, Error)]
pub enum Error {
    /// An external tool ran but exited unsuccessfully
    #[error(transparent)]
    Command(#[from] CommandError),

    /// An external tool could not be started at all
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The structured output of a tool could not be decoded
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The tool reported nothing for the requested device
    #[error("no such device: {0}")]
    NoSuchDevice(String),

    /// A procfs or sysfs node did not have the expected shape
    #[error("malformed system file {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// An I/O error occurred
    #[error("io: {0}")]
    IO(#[from] io::Error),
}

/// Returns the bare kernel name of a disk, accepting both `sda` and `/dev/sda`.
pub fn disk_name(disk: &str) -> &str {
    disk.strip_prefix(DEVFS_DIR)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(disk)
}

/// Returns the path of a disk (or partition) node in `/dev`.
///
/// # Examples
///
/// ```
/// assert_eq!(disks::device_path("sda"), std::path::PathBuf::from("/dev/sda"));
/// assert_eq!(disks::device_path("/dev/sda"), std::path::PathBuf::from("/dev/sda"));
/// ```
pub fn device_path(disk: &str) -> PathBuf {
    PathBuf::from(DEVFS_DIR).join(disk_name(disk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_disk_name() {
        assert_eq!(disk_name("sda"), "sda");
        assert_eq!(disk_name("/dev/nvme0n1"), "nvme0n1");
        // Not a /dev path, leave it alone
        assert_eq!(disk_name("/devices/sda"), "/devices/sda");
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path("vdb"), PathBuf::from("/dev/vdb"));
        assert_eq!(device_path("/dev/vdb"), PathBuf::from("/dev/vdb"));
    }
}
