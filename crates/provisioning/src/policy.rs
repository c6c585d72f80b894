// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Hardware-driven layout decisions

use disks::{Firmware, HardwareFacts};
use partitioning::{SizeSpec, TableKind};

use crate::FilesystemType;

/// fdisk alias for the Linux swap type, accepted on both GPT and DOS tables
pub const SWAP_TYPE_ALIAS: &str = "swap";

/// Size of the boot or EFI system partition
pub fn boot_size() -> SizeSpec {
    SizeSpec::gibibytes(1)
}

/// Suggested swap size in GiB for `total_memory_kb` of memory.
///
/// Only the leading decimal digit of the kB count is considered, so 4 000 000 kB and
/// 40 000 000 kB both suggest 8 GiB. This matches the behavior installs have always
/// had; correcting it needs a decision on what sizes are wanted.
pub fn suggested_swap_size(total_memory_kb: u64) -> u64 {
    let leading = total_memory_kb
        .to_string()
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .map(u64::from)
        .unwrap_or(0);
    swap_size_for_band(leading)
}

/// Swap size in GiB for a memory figure `band`: double up to 5, half up to 15, 4 beyond
pub fn swap_size_for_band(band: u64) -> u64 {
    match band {
        0..=5 => band * 2,
        6..=15 => band / 2,
        _ => 4,
    }
}

/// Partition table matching the firmware mode
pub fn table_kind(facts: &HardwareFacts) -> TableKind {
    match facts.firmware {
        Firmware::Uefi => TableKind::Gpt,
        Firmware::Bios => TableKind::Dos,
    }
}

/// Filesystem and mountpoint of the boot partition for a table kind
pub fn boot_partition(table: TableKind) -> (FilesystemType, &'static str) {
    match table {
        TableKind::Gpt => (FilesystemType::Vfat, "/boot/efi"),
        TableKind::Dos => (FilesystemType::Ext4, "/boot"),
    }
}

/// fdisk type to give a partition, `None` keeps the default Linux filesystem type
pub fn type_code_for_filesystem(filesystem: FilesystemType) -> Option<&'static str> {
    match filesystem {
        FilesystemType::Swap => Some(SWAP_TYPE_ALIAS),
        _ => None,
    }
}
