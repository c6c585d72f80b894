// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Disk and partition enumeration via `lsblk`
//!
//! Both queries ask `lsblk` for JSON output and only depend on that schema. Records are
//! returned in the order `lsblk` reports them.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{command, device_path, disk_name, Error};

/// One physical block device, as seen at query time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRecord {
    /// Kernel name of the device (e.g. sda, nvme0n1)
    pub name: String,
    /// Human readable size as reported by lsblk (e.g. 476.9G)
    pub size: String,
    /// Filesystem label, empty if none
    pub label: String,
}

/// One first-level partition of a disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Kernel name of the partition (e.g. sda1, nvme0n1p2)
    pub name: String,
    /// Human readable size as reported by lsblk
    pub size: String,
    /// Detected filesystem type, if any
    pub filesystem_type: Option<String>,
}

/// Source of disk and partition records
pub trait Inventory {
    /// Lists all physical disks
    fn list_physical_disks(&self) -> Result<Vec<DiskRecord>, Error>;

    /// Lists the first-level partitions of a disk. Anything nested below a partition
    /// (LVM volumes, LUKS mappings) is not reported.
    fn list_partitions(&self, disk: &str) -> Result<Vec<PartitionRecord>, Error>;
}

/// Top level of `lsblk --json` output
#[derive(Debug, Deserialize)]
struct Output {
    blockdevices: Vec<Device>,
}

/// A device node in `lsblk --json` output. Older lsblk releases emit every value as a
/// string and use `null` for missing ones.
#[derive(Debug, Deserialize)]
struct Device {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    children: Vec<Device>,
}

/// Parses the output of `lsblk --json -ldo name,size,label`
pub fn parse_disks(json: &str) -> Result<Vec<DiskRecord>, Error> {
    let output: Output = serde_json::from_str(json)?;
    Ok(output
        .blockdevices
        .into_iter()
        .map(|d| DiskRecord {
            name: d.name,
            size: d.size.unwrap_or_default(),
            label: d.label.unwrap_or_default(),
        })
        .collect())
}

/// Parses the output of `lsblk <disk> --json -no name,size,fstype`
///
/// Only the children of the first reported device are returned, with their own
/// children discarded.
pub fn parse_partitions(disk: &str, json: &str) -> Result<Vec<PartitionRecord>, Error> {
    let output: Output = serde_json::from_str(json)?;
    let device = output
        .blockdevices
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoSuchDevice(disk.to_owned()))?;

    Ok(device
        .children
        .into_iter()
        .map(|p| PartitionRecord {
            name: p.name,
            size: p.size.unwrap_or_default(),
            filesystem_type: p.fstype.filter(|s| !s.is_empty()),
        })
        .collect())
}

/// Inventory backed by the `lsblk` tool
#[derive(Debug, Clone)]
pub struct Lsblk {
    program: PathBuf,
}

impl Default for Lsblk {
    fn default() -> Self {
        Self::new()
    }
}

impl Lsblk {
    /// Uses `lsblk` from `PATH`
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("lsblk"),
        }
    }

    /// Uses a specific lsblk binary
    pub fn with_program(self, program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the lsblk binary in use
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Inventory for Lsblk {
    fn list_physical_disks(&self) -> Result<Vec<DiskRecord>, Error> {
        let json = command::run(Command::new(&self.program).args(["--json", "-ldo", "name,size,label"]))?;
        let disks = parse_disks(&json)?;
        debug!("lsblk reported {} disks", disks.len());
        Ok(disks)
    }

    fn list_partitions(&self, disk: &str) -> Result<Vec<PartitionRecord>, Error> {
        let json = command::run(
            Command::new(&self.program)
                .arg(device_path(disk))
                .args(["--json", "-no", "name,size,fstype"]),
        )?;
        let partitions = parse_partitions(disk_name(disk), &json)?;
        debug!("lsblk reported {} partitions on {}", partitions.len(), disk);
        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const DISKS: &str = r#"{
       "blockdevices": [
          {"name":"sda", "size":"465.8G", "label":null},
          {"name":"nvme0n1", "size":"476.9G", "label":"scratch"},
          {"name":"sr0", "size":"1024M", "label":null}
       ]
    }"#;

    const PARTITIONS: &str = r#"{
       "blockdevices": [
          {"name":"nvme0n1", "size":"476.9G", "fstype":null,
             "children": [
                {"name":"nvme0n1p1", "size":"512M", "fstype":"vfat"},
                {"name":"nvme0n1p2", "size":"8G", "fstype":"swap"},
                {"name":"nvme0n1p3", "size":"468.4G", "fstype":"crypto_LUKS",
                   "children": [
                      {"name":"cryptroot", "size":"468.4G", "fstype":"btrfs"}
                   ]
                },
                {"name":"nvme0n1p4", "size":"1M", "fstype":null}
             ]
          }
       ]
    }"#;

    #[test]
    fn test_parse_disks_keeps_lsblk_order() {
        let disks = parse_disks(DISKS).unwrap();
        let names: Vec<_> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["sda", "nvme0n1", "sr0"]);
        assert_eq!(disks[0].label, "");
        assert_eq!(disks[1].label, "scratch");
        assert_eq!(disks[1].size, "476.9G");
    }

    #[test]
    fn test_parse_partitions_flattens_children() {
        let partitions = parse_partitions("nvme0n1", PARTITIONS).unwrap();
        assert_eq!(partitions.len(), 4);
        assert_eq!(partitions[0].filesystem_type.as_deref(), Some("vfat"));
        assert_eq!(partitions[2].name, "nvme0n1p3");
        assert_eq!(partitions[2].filesystem_type.as_deref(), Some("crypto_LUKS"));
        assert!(partitions.iter().all(|p| p.name != "cryptroot"));
        assert_eq!(partitions[3].filesystem_type, None);
    }

    #[test]
    fn test_parse_partitions_without_children() {
        let json = r#"{"blockdevices": [{"name":"sdb", "size":"16G", "fstype":null}]}"#;
        assert!(parse_partitions("sdb", json).unwrap().is_empty());
    }

    #[test]
    fn test_parse_partitions_no_device() {
        let err = parse_partitions("sdz", r#"{"blockdevices": []}"#).unwrap_err();
        assert!(matches!(err, Error::NoSuchDevice(ref d) if d == "sdz"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_disks("NAME SIZE"), Err(Error::InvalidJson(_))));
    }

    #[test]
    fn test_failing_lsblk_surfaces_command_error() {
        let lsblk = Lsblk::new().with_program("false");
        let err = lsblk.list_physical_disks().unwrap_err();
        let Error::Command(err) = err else {
            panic!("expected a command error, got {err:?}");
        };
        assert_eq!(err.code, Some(1));
        assert!(err.command.starts_with("false --json"));
    }
}
