// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

use disks::Lsblk;
use partitioning::{Session, SessionConfig};

use crate::{executor::fdisk_executor, PlanExecutor};

/// Where the new system is assembled by default
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt/gentoo";

/// Settings shared by every provisioning step, built once and passed by reference
#[derive(Debug, Clone)]
pub struct Config {
    /// Inventory tool
    pub lsblk: Lsblk,
    /// How fdisk sessions are run
    pub session: SessionConfig,
    /// Root the new system is mounted under
    pub mount_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lsblk: Lsblk::new(),
            session: SessionConfig::default(),
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
        }
    }
}

impl Config {
    pub fn with_lsblk(self, lsblk: Lsblk) -> Self {
        Self { lsblk, ..self }
    }

    pub fn with_session(self, session: SessionConfig) -> Self {
        Self { session, ..self }
    }

    pub fn with_mount_root(self, mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
            ..self
        }
    }

    /// Executor driving fdisk with these settings
    pub fn executor(&self) -> PlanExecutor<impl FnMut(&Path) -> Result<Session, partitioning::Error>> {
        fdisk_executor(self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use test_log::test;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.lsblk.program(), Path::new("lsblk"));
        assert_eq!(config.session.program, PathBuf::from("fdisk"));
        assert_eq!(config.session.prompt_timeout, Duration::from_secs(10));
        assert_eq!(config.session.exit_timeout, Duration::from_secs(5));
        assert_eq!(config.mount_root, PathBuf::from("/mnt/gentoo"));
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_lsblk(Lsblk::new().with_program("/usr/bin/lsblk"))
            .with_session(SessionConfig::default().with_program("/sbin/fdisk"))
            .with_mount_root("/mnt/target");
        assert_eq!(config.lsblk.program(), Path::new("/usr/bin/lsblk"));
        assert_eq!(config.session.program, PathBuf::from("/sbin/fdisk"));
        assert_eq!(config.mount_root, PathBuf::from("/mnt/target"));
    }
}
