// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Partition plans
//!
//! A [`PartitionPlan`] is built once per installation from the chosen scheme, the disk
//! and the hardware facts. Confirming it checks every invariant and yields a
//! [`ConfirmedPlan`], which is read-only and consumed exactly once by the executor.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use disks::{disk_name, partition_number, HardwareFacts, Inventory, NamingScheme, PartitionRecord};
use itertools::Itertools;
use log::{debug, info};
use partitioning::{SizeSpec, TableKind};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{
    policy::{boot_partition, boot_size, suggested_swap_size, table_kind},
    Error, FilesystemType, HardwareIncompatible, MountTarget, PartitionSpec, Scheme,
};

/// A mountpoint chosen for an existing partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountAssignment {
    /// Kernel name of the partition, bare or as a /dev path
    pub partition: String,
    /// Absolute path or `swap`; empty leaves the partition out of the plan
    pub mountpoint: String,
    /// Reformat with this filesystem instead of keeping the detected one
    pub filesystem: Option<FilesystemType>,
}

impl MountAssignment {
    pub fn new(partition: impl Into<String>, mountpoint: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            mountpoint: mountpoint.into(),
            filesystem: None,
        }
    }

    pub fn with_filesystem(self, filesystem: FilesystemType) -> Self {
        Self {
            filesystem: Some(filesystem),
            ..self
        }
    }
}

/// The target layout of a disk
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub scheme: Scheme,

    /// Kernel name of the disk (e.g. sda)
    pub disk: String,

    /// Table to create, only for automatic plans
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableKind>,

    pub entries: Vec<PartitionSpec>,
}

impl PartitionPlan {
    /// Builds the boot, swap and root layout for a whole disk
    ///
    /// # Arguments
    ///
    /// * `disk` - Disk to wipe, bare or as a /dev path
    /// * `facts` - Firmware mode and memory of the machine
    /// * `root_filesystem` - Filesystem of the root partition. Btrfs gets `@` and
    ///   `@home` subvolumes.
    pub fn automatic(disk: &str, facts: &HardwareFacts, root_filesystem: FilesystemType) -> Result<Self, Error> {
        let naming = NamingScheme::detect(disk)
            .ok_or_else(|| HardwareIncompatible::UnsupportedDisk(disk_name(disk).to_owned()))?;
        if !root_filesystem.is_root_capable() {
            return Err(Error::invalid(format!("{root_filesystem} cannot hold the root filesystem")));
        }

        let swap_gib = suggested_swap_size(facts.total_memory_kb);
        if swap_gib == 0 {
            return Err(Error::invalid(format!(
                "no swap size for {} kB of memory",
                facts.total_memory_kb
            )));
        }
        debug!("Using {naming} partition names for {disk}, {swap_gib}G of swap");

        let table = table_kind(facts);
        let (boot_filesystem, boot_mountpoint) = boot_partition(table);
        let root_mountpoint = if root_filesystem.supports_subvolumes() {
            MountTarget::btrfs_root()
        } else {
            MountTarget::path("/")
        };

        let entries = vec![
            PartitionSpec {
                device_path: naming.partition_path(disk, 1),
                filesystem_type: boot_filesystem,
                size: boot_size(),
                mountpoint: MountTarget::path(boot_mountpoint),
            },
            PartitionSpec {
                device_path: naming.partition_path(disk, 2),
                filesystem_type: FilesystemType::Swap,
                size: SizeSpec::gibibytes(swap_gib),
                mountpoint: MountTarget::Swap,
            },
            PartitionSpec {
                device_path: naming.partition_path(disk, 3),
                filesystem_type: root_filesystem,
                size: SizeSpec::Remaining,
                mountpoint: root_mountpoint,
            },
        ];

        let plan = Self {
            scheme: Scheme::Automatic,
            disk: disk_name(disk).to_owned(),
            table: Some(table),
            entries,
        };
        plan.log();
        Ok(plan)
    }

    /// Builds a plan reusing existing partitions of `disk`.
    ///
    /// Entries follow the order of `assignments`. Partitions without an assignment, or
    /// with an empty mountpoint, are left out.
    pub fn manual(
        disk: &str,
        partitions: &[PartitionRecord],
        assignments: &[MountAssignment],
    ) -> Result<Self, Error> {
        let mut entries = vec![];
        let mut seen = HashSet::new();

        for assignment in assignments {
            let mountpoint = assignment.mountpoint.trim();
            if mountpoint.is_empty() {
                debug!("Leaving {} out of the plan", assignment.partition);
                continue;
            }

            let name = disk_name(&assignment.partition);
            let record = partitions
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| Error::invalid(format!("no partition {name} on {}", disk_name(disk))))?;
            if !seen.insert(name) {
                return Err(Error::invalid(format!("{name} is assigned more than once")));
            }

            entries.push(Self::manual_entry(record, mountpoint, assignment.filesystem)?);
        }

        let plan = Self {
            scheme: Scheme::Manual,
            disk: disk_name(disk).to_owned(),
            table: None,
            entries,
        };
        plan.log();
        Ok(plan)
    }

    /// Like [`PartitionPlan::manual`], reading the partitions of `disk` from `inventory`
    pub fn manual_from_inventory(
        inventory: &impl Inventory,
        disk: &str,
        assignments: &[MountAssignment],
    ) -> Result<Self, Error> {
        let partitions = inventory.list_partitions(disk)?;
        Self::manual(disk, &partitions, assignments)
    }

    /// A plan deferring to whatever is mounted at the mount root
    pub fn preexisting(disk: &str) -> Self {
        info!("Using existing mounts for {}", disk_name(disk));
        Self {
            scheme: Scheme::Preexisting,
            disk: disk_name(disk).to_owned(),
            table: None,
            entries: vec![],
        }
    }

    fn manual_entry(
        record: &PartitionRecord,
        mountpoint: &str,
        filesystem: Option<FilesystemType>,
    ) -> Result<PartitionSpec, Error> {
        let size = SizeSpec::from_lsblk(&record.size)
            .ok_or_else(|| Error::invalid(format!("cannot read size {:?} of {}", record.size, record.name)))?;

        let (filesystem_type, mountpoint) = if mountpoint == "swap" {
            match filesystem {
                None | Some(FilesystemType::Swap) => (FilesystemType::Swap, MountTarget::Swap),
                Some(other) => {
                    return Err(Error::invalid(format!("{} is used as swap but set to {other}", record.name)));
                }
            }
        } else {
            let filesystem_type = match filesystem {
                Some(fs) if FilesystemType::MANUAL_CHOICES.contains(&fs) => fs,
                Some(fs) => {
                    return Err(Error::invalid(format!(
                        "{fs} is not offered for {}, choose one of {}",
                        record.name,
                        FilesystemType::MANUAL_CHOICES.iter().join(", ")
                    )))
                }
                None => match &record.filesystem_type {
                    Some(detected) => detected.parse()?,
                    None => {
                        return Err(Error::invalid(format!(
                            "{} has no filesystem, choose one to format it with",
                            record.name
                        )))
                    }
                },
            };
            (filesystem_type, MountTarget::path(mountpoint))
        };

        Ok(PartitionSpec {
            device_path: disks::device_path(&record.name),
            filesystem_type,
            size,
            mountpoint,
        })
    }

    /// Checks every invariant of the plan's scheme
    pub fn validate(&self) -> Result<(), Error> {
        if self.disk.is_empty() || self.disk.contains('/') {
            return Err(Error::invalid(format!("bad disk name {:?}", self.disk)));
        }

        match self.scheme {
            Scheme::Automatic => self.validate_automatic()?,
            Scheme::Manual => {
                if self.table.is_some() {
                    return Err(Error::invalid("manual plans keep the existing table"));
                }
                for entry in &self.entries {
                    let on_disk = entry
                        .device_path
                        .to_str()
                        .and_then(|path| partition_number(&self.disk, path))
                        .is_some();
                    if !on_disk {
                        return Err(Error::invalid(format!(
                            "{} is not a partition of {}",
                            entry.device_path.display(),
                            self.disk
                        )));
                    }
                }
            }
            Scheme::Preexisting => {
                if self.table.is_some() || !self.entries.is_empty() {
                    return Err(Error::invalid("preexisting plans have no table and no entries"));
                }
            }
        }

        let remaining = self.entries.iter().positions(|e| e.size.is_remaining()).collect::<Vec<_>>();
        match remaining.as_slice() {
            [] => {}
            [last] if *last + 1 == self.entries.len() => {}
            [_] => return Err(Error::invalid("only the last partition may use the remaining space")),
            _ => return Err(Error::invalid("more than one partition uses the remaining space")),
        }

        let mut devices = HashSet::new();
        let mut mount_paths = HashSet::new();
        for entry in &self.entries {
            Self::validate_entry(entry)?;
            if !devices.insert(&entry.device_path) {
                return Err(Error::invalid(format!(
                    "{} appears more than once",
                    entry.device_path.display()
                )));
            }
            for path in entry.mountpoint.mount_paths() {
                if !mount_paths.insert(path) {
                    return Err(Error::invalid(format!("{path} is mounted more than once")));
                }
            }
        }

        Ok(())
    }

    fn validate_automatic(&self) -> Result<(), Error> {
        let naming =
            NamingScheme::detect(&self.disk).ok_or_else(|| HardwareIncompatible::UnsupportedDisk(self.disk.clone()))?;
        let Some(table) = self.table else {
            return Err(Error::invalid("automatic plan has no partition table"));
        };
        let [boot, swap, root] = self.entries.as_slice() else {
            return Err(Error::invalid(format!(
                "automatic plan needs boot, swap and root entries, found {}",
                self.entries.len()
            )));
        };
        for (number, entry) in (1..).zip(&self.entries) {
            let expected = naming.partition_path(&self.disk, number);
            if entry.device_path != expected {
                return Err(Error::invalid(format!(
                    "entry {number} is {} instead of {}",
                    entry.device_path.display(),
                    expected.display()
                )));
            }
        }

        let (boot_filesystem, boot_mountpoint) = boot_partition(table);
        if boot.filesystem_type != boot_filesystem || boot.mountpoint != MountTarget::path(boot_mountpoint) {
            return Err(Error::invalid(format!(
                "{table} table needs a {boot_filesystem} boot partition at {boot_mountpoint}"
            )));
        }
        if !swap.filesystem_type.is_swap() {
            return Err(Error::invalid("second partition of an automatic plan must be swap"));
        }
        if !root.filesystem_type.is_root_capable() || !root.size.is_remaining() {
            return Err(Error::invalid("root partition must be last and use the remaining space"));
        }

        Ok(())
    }

    fn validate_entry(entry: &PartitionSpec) -> Result<(), Error> {
        let device = entry.device_path.display();
        if !entry.device_path.is_absolute() {
            return Err(Error::invalid(format!("device path {device} is not absolute")));
        }
        if entry.size.bytes() == Some(0) {
            return Err(Error::invalid(format!("{device} has no size")));
        }

        match &entry.mountpoint {
            MountTarget::Swap if entry.filesystem_type.is_swap() => Ok(()),
            MountTarget::Swap => Err(Error::invalid(format!(
                "{device} is mounted as swap but formatted {}",
                entry.filesystem_type
            ))),
            _ if entry.filesystem_type.is_swap() => Err(Error::invalid(format!("{device} is swap but has a mount path"))),
            MountTarget::Subvolumes(_) if !entry.filesystem_type.supports_subvolumes() => Err(Error::invalid(
                format!("{device} has subvolumes but is formatted {}", entry.filesystem_type),
            )),
            MountTarget::Subvolumes(map) if map.is_empty() || map.keys().any(String::is_empty) => {
                Err(Error::invalid(format!("{device} has an empty subvolume mapping")))
            }
            target => match target.mount_paths().into_iter().find(|p| !p.starts_with('/')) {
                Some(path) => Err(Error::invalid(format!("mountpoint {path} of {device} is not absolute"))),
                None => Ok(()),
            },
        }
    }

    /// Validates the plan and freezes it for execution
    pub fn confirm(self) -> Result<ConfirmedPlan, Error> {
        self.validate()?;
        info!("✅ Confirmed {} plan for {}", self.scheme, self.disk);
        Ok(ConfirmedPlan { plan: self })
    }

    /// Persisted representation of the plan
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads and validates a persisted plan
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let plan: Self = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Device node of the disk
    pub fn disk_path(&self) -> PathBuf {
        disks::device_path(&self.disk)
    }

    /// Mount paths of every entry, resolved against `root`
    pub fn mount_paths(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        self.entries.iter().flat_map(|e| e.mountpoint.resolve(root)).collect()
    }

    fn log(&self) {
        info!("📝 Built {} plan for {}", self.scheme, self.disk);
        for entry in &self.entries {
            debug!("  {entry}");
        }
    }
}

/// A validated plan, consumed once by the executor
#[derive(Debug)]
pub struct ConfirmedPlan {
    plan: PartitionPlan,
}

impl ConfirmedPlan {
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub(crate) fn into_plan(self) -> PartitionPlan {
        self.plan
    }
}
