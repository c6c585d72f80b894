// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Formatting commands for planned partitions
//!
//! Only the command lines are built here; running them belongs to the stage that
//! formats the new system.

use std::{fmt, process::Command};

use itertools::Itertools;

use crate::{FilesystemType, PartitionPlan, PartitionSpec};

/// A command formatting one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FormatCommand {
    /// `mkswap` for swap, `mkfs.<type>` for everything else
    pub fn for_entry(entry: &PartitionSpec) -> Self {
        let device = entry.device_path.to_string_lossy().into_owned();
        match entry.filesystem_type {
            FilesystemType::Swap => Self {
                program: "mkswap".to_owned(),
                args: vec![device],
            },
            FilesystemType::Vfat => Self {
                program: "mkfs.vfat".to_owned(),
                args: vec!["-F".to_owned(), "32".to_owned(), device],
            },
            fs => Self {
                program: format!("mkfs.{fs}"),
                args: vec![device],
            },
        }
    }

    /// Commands for every entry of a plan, in plan order
    pub fn for_plan(plan: &PartitionPlan) -> Vec<Self> {
        plan.entries.iter().map(Self::for_entry).collect()
    }

    /// A process ready to spawn
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for FormatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.iter().join(" "))
    }
}
