// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Partition plans and their execution
//!
//! The flow is inventory, then a [`PartitionPlan`] for the chosen [`Scheme`], then
//! confirmation into a [`ConfirmedPlan`], then a [`PlanExecutor`] realizing it
//! through a single fdisk session.

mod errors;
pub use errors::*;

mod types;
pub use types::*;

mod config;
pub use config::*;

pub mod executor;
pub use executor::{fdisk_executor, PlanExecutor};

pub mod format;
pub use format::FormatCommand;

pub mod plan;
pub use plan::{ConfirmedPlan, MountAssignment, PartitionPlan};

pub mod policy;
pub use policy::{suggested_swap_size, swap_size_for_band};

/// Checks the machine can be installed to at all
pub fn check_hardware(facts: &disks::HardwareFacts) -> Result<(), Error> {
    facts.check_requirements().map_err(HardwareIncompatible::from)?;
    Ok(())
}
