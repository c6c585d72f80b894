// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Hardware facts consumed by partition planning
//!
//! Facts are probed once, relative to a sysroot so they can be tested against a fake
//! tree, and then handed around by reference.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::Error;

const MEMINFO: &str = "proc/meminfo";
const CPUINFO: &str = "proc/cpuinfo";
const EFI_DIR: &str = "sys/firmware/efi";

/// Minimum amount of memory (in kB) needed to install
pub const MINIMUM_MEMORY_KB: u64 = 2_000_000;

/// Firmware mode the system was booted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Firmware {
    /// UEFI firmware, partitioned with GPT
    Uefi,
    /// Legacy BIOS, partitioned with a DOS table
    Bios,
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => f.write_str("uefi"),
            Self::Bios => f.write_str("bios"),
        }
    }
}

/// CPU vendor as reported by cpuinfo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

/// Facts about the machine being installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFacts {
    pub firmware: Firmware,
    /// Total memory in kB, as reported by meminfo
    pub total_memory_kb: u64,
    pub cpu_vendor: CpuVendor,
}

/// A minimum requirement that the hardware does not meet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Neither an Intel nor an AMD CPU was found
    CpuVendor,
    /// Not enough memory
    Memory { found_kb: u64, required_kb: u64 },
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CpuVendor => f.write_str("no supported CPU vendor (Intel or AMD) detected"),
            Self::Memory { found_kb, required_kb } => {
                write!(f, "{found_kb} kB of memory, at least {required_kb} kB required")
            }
        }
    }
}

/// The hardware does not meet the minimum requirements
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .unmet.iter().join("; "))]
pub struct Incompatibility {
    /// Every unmet requirement
    pub unmet: Vec<Requirement>,
}

impl HardwareFacts {
    /// Probes the running system
    pub fn probe() -> Result<Self, Error> {
        Self::probe_in_sysroot("/")
    }

    /// Probes a system rooted at `sysroot`
    ///
    /// # Arguments
    ///
    /// * `sysroot` - Directory containing the `proc` and `sys` trees to read
    pub fn probe_in_sysroot(sysroot: impl AsRef<Path>) -> Result<Self, Error> {
        let sysroot = sysroot.as_ref();

        let firmware = if sysroot.join(EFI_DIR).is_dir() {
            Firmware::Uefi
        } else {
            Firmware::Bios
        };
        let total_memory_kb = read_total_memory(&sysroot.join(MEMINFO))?;
        let cpu_vendor = read_cpu_vendor(&sysroot.join(CPUINFO))?;

        let facts = Self {
            firmware,
            total_memory_kb,
            cpu_vendor,
        };
        debug!("Probed hardware: {facts:?}");
        Ok(facts)
    }

    /// Whether the system booted via UEFI
    pub fn is_uefi(&self) -> bool {
        self.firmware == Firmware::Uefi
    }

    /// Checks the minimum hardware requirements, reporting every unmet one.
    pub fn check_requirements(&self) -> Result<(), Incompatibility> {
        let mut unmet = vec![];
        if self.cpu_vendor == CpuVendor::Unknown {
            unmet.push(Requirement::CpuVendor);
        }
        if self.total_memory_kb < MINIMUM_MEMORY_KB {
            unmet.push(Requirement::Memory {
                found_kb: self.total_memory_kb,
                required_kb: MINIMUM_MEMORY_KB,
            });
        }

        if unmet.is_empty() {
            Ok(())
        } else {
            Err(Incompatibility { unmet })
        }
    }
}

fn malformed(path: &Path, reason: &str) -> Error {
    Error::Malformed {
        path: PathBuf::from(path),
        reason: reason.to_owned(),
    }
}

/// Reads `MemTotal` from the first line of meminfo, e.g. `MemTotal:  16318480 kB`
fn read_total_memory(path: &Path) -> Result<u64, Error> {
    let contents = fs::read_to_string(path)?;
    let line = contents.lines().next().ok_or_else(|| malformed(path, "empty"))?;
    let value = line
        .strip_prefix("MemTotal:")
        .ok_or_else(|| malformed(path, "first line is not MemTotal"))?;
    value
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .map_err(|_| malformed(path, "MemTotal is not a number"))
}

fn read_cpu_vendor(path: &Path) -> Result<CpuVendor, Error> {
    let contents = fs::read_to_string(path)?;
    let vendor = contents
        .lines()
        .find_map(|line| {
            if line.contains("GenuineIntel") {
                Some(CpuVendor::Intel)
            } else if line.contains("AuthenticAMD") {
                Some(CpuVendor::Amd)
            } else {
                None
            }
        })
        .unwrap_or(CpuVendor::Unknown);
    Ok(vendor)
}
