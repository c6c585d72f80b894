// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock inventory for testing.
//!
//! This module provides an in-memory inventory that can be used for testing
//! planning without running `lsblk` against real hardware.

use std::collections::HashMap;

use crate::{disk_name, DiskRecord, Error, Inventory, PartitionRecord};

/// Inventory serving canned records
#[derive(Debug, Default)]
pub struct MockInventory {
    disks: Vec<DiskRecord>,
    partitions: HashMap<String, Vec<PartitionRecord>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a disk with no partitions
    pub fn add_disk(&mut self, name: &str, size: &str) {
        self.disks.push(DiskRecord {
            name: name.to_owned(),
            size: size.to_owned(),
            label: String::new(),
        });
        self.partitions.entry(name.to_owned()).or_default();
    }

    /// Add a partition to a previously added disk
    pub fn add_partition(&mut self, disk: &str, name: &str, size: &str, filesystem_type: Option<&str>) {
        self.partitions.entry(disk.to_owned()).or_default().push(PartitionRecord {
            name: name.to_owned(),
            size: size.to_owned(),
            filesystem_type: filesystem_type.map(str::to_owned),
        });
    }
}

impl Inventory for MockInventory {
    fn list_physical_disks(&self) -> Result<Vec<DiskRecord>, Error> {
        Ok(self.disks.clone())
    }

    fn list_partitions(&self, disk: &str) -> Result<Vec<PartitionRecord>, Error> {
        self.partitions
            .get(disk_name(disk))
            .cloned()
            .ok_or_else(|| Error::NoSuchDevice(disk.to_owned()))
    }
}
