// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use miette::Diagnostic;
use thiserror::Error;

/// Error type for the provisioning crate
#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error("disk inventory: {0}")]
    #[diagnostic(
        code(provisioning::inventory),
        help("check that lsblk is installed and the disk is attached")
    )]
    Inventory(#[from] disks::Error),

    #[error("partitioning: {0}")]
    #[diagnostic(
        code(provisioning::session),
        help("fdisk was stopped; the table on disk only changes once it has been written")
    )]
    Session(#[from] partitioning::Error),

    #[diagnostic(transparent)]
    #[error(transparent)]
    HardwareIncompatible(#[from] HardwareIncompatible),

    #[error("invalid plan: {0}")]
    #[diagnostic(code(provisioning::invalid_plan))]
    InvalidPlanState(String),

    #[error("plan json: {0}")]
    #[diagnostic(code(provisioning::json))]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPlanState(reason.into())
    }
}

/// The machine or disk cannot be installed to
#[derive(Debug, Diagnostic, Error)]
pub enum HardwareIncompatible {
    /// The disk name belongs to no supported naming scheme
    #[error("unsupported disk: {0}")]
    #[diagnostic(
        code(provisioning::unsupported_disk),
        help("NVMe (nvme0n1), SCSI/SATA (sda) and virtio (vda) disks are supported")
    )]
    UnsupportedDisk(String),

    /// Minimum hardware requirements are not met
    #[error("hardware requirements not met: {0}")]
    #[diagnostic(code(provisioning::requirements))]
    Requirements(#[from] disks::Incompatibility),
}
