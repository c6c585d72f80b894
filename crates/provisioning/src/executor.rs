// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Realizes automatic plans through one fdisk session

use std::path::Path;

use log::{debug, info};
use partitioning::{Conversation, Session, SessionConfig};

use crate::{policy::type_code_for_filesystem, ConfirmedPlan, Error, Scheme};

/// Applies confirmed plans, opening sessions with `open_session`
pub struct PlanExecutor<F> {
    open_session: F,
}

/// Executor running the real fdisk
pub fn fdisk_executor(
    config: SessionConfig,
) -> PlanExecutor<impl FnMut(&Path) -> Result<Session, partitioning::Error>> {
    PlanExecutor::new(move |device: &Path| Session::open(device, config.clone()))
}

impl<F, C> PlanExecutor<F>
where
    F: FnMut(&Path) -> Result<Session<C>, partitioning::Error>,
    C: Conversation,
{
    pub fn new(open_session: F) -> Self {
        Self { open_session }
    }

    /// Creates the plan's table and partitions on its disk, then writes them
    pub fn apply(&mut self, plan: ConfirmedPlan) -> Result<(), Error> {
        let target = plan.plan().disk_path();
        self.apply_to(plan, &target)
    }

    /// Like [`PlanExecutor::apply`], against `target` instead of the plan's disk.
    ///
    /// Device paths in the plan are left alone, so this is meant for rehearsing a
    /// plan against an image file.
    pub fn apply_to(&mut self, plan: ConfirmedPlan, target: &Path) -> Result<(), Error> {
        let plan = plan.into_plan();
        if plan.scheme != Scheme::Automatic {
            return Err(Error::invalid(format!("{} plans are not partitioned", plan.scheme)));
        }
        let Some(table) = plan.table else {
            return Err(Error::invalid("automatic plan has no partition table"));
        };
        if plan.entries.is_empty() {
            return Err(Error::invalid("automatic plan has no entries"));
        }

        info!("🚀 Partitioning {} for {} entries", target.display(), plan.entries.len());
        let mut session = (self.open_session)(target)?;
        session.create_table(table)?;
        for entry in &plan.entries {
            let number = session.create_partition(&entry.size, type_code_for_filesystem(entry.filesystem_type))?;
            debug!("Partition {number} is {entry}");
        }
        session.commit()?;

        info!("🎉 Partitioned {}", target.display());
        Ok(())
    }
}
