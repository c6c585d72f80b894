// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Where a partition ends up in the installed system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Repr", into = "Repr")]
pub enum MountTarget {
    /// A single absolute mount path
    Path(String),
    /// Activated as swap, never mounted
    Swap,
    /// Btrfs subvolume name to mount path
    Subvolumes(BTreeMap<String, String>),
}

/// Persisted form: a path string, the string `swap`, or a subvolume object
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    Subvolumes(BTreeMap<String, String>),
}

impl From<Repr> for MountTarget {
    fn from(repr: Repr) -> Self {
        match repr {
            Repr::Text(text) if text == "swap" => Self::Swap,
            Repr::Text(path) => Self::Path(path),
            Repr::Subvolumes(map) => Self::Subvolumes(map),
        }
    }
}

impl From<MountTarget> for Repr {
    fn from(target: MountTarget) -> Self {
        match target {
            MountTarget::Path(path) => Self::Text(path),
            MountTarget::Swap => Self::Text("swap".to_owned()),
            MountTarget::Subvolumes(map) => Self::Subvolumes(map),
        }
    }
}

impl MountTarget {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// The default btrfs layout: `@` at `/` and `@home` at `/home`
    pub fn btrfs_root() -> Self {
        Self::Subvolumes(BTreeMap::from([
            ("@".to_owned(), "/".to_owned()),
            ("@home".to_owned(), "/home".to_owned()),
        ]))
    }

    pub fn is_swap(&self) -> bool {
        matches!(self, Self::Swap)
    }

    /// Every mount path this target uses, in subvolume name order
    pub fn mount_paths(&self) -> Vec<&str> {
        match self {
            Self::Path(path) => vec![path.as_str()],
            Self::Swap => vec![],
            Self::Subvolumes(map) => map.values().map(String::as_str).collect(),
        }
    }

    /// Resolves the mount paths against the root the new system is assembled in
    pub fn resolve(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        let root = root.as_ref();
        self.mount_paths()
            .into_iter()
            .map(|path| match path.trim_start_matches('/') {
                "" => root.to_path_buf(),
                relative => root.join(relative),
            })
            .collect()
    }
}

impl fmt::Display for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.write_str(path),
            Self::Swap => f.write_str("swap"),
            Self::Subvolumes(map) => {
                write!(f, "{}", map.iter().map(|(name, path)| format!("{name}={path}")).join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_persisted_shapes() {
        let cases = [
            (MountTarget::path("/boot/efi"), r#""/boot/efi""#),
            (MountTarget::Swap, r#""swap""#),
            (MountTarget::btrfs_root(), r#"{"@":"/","@home":"/home"}"#),
        ];
        for (target, json) in cases {
            assert_eq!(serde_json::to_string(&target).unwrap(), json);
            assert_eq!(serde_json::from_str::<MountTarget>(json).unwrap(), target);
        }
        assert!(serde_json::from_str::<MountTarget>("42").is_err());
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/mnt/gentoo");
        assert_eq!(MountTarget::path("/").resolve(root), [PathBuf::from("/mnt/gentoo")]);
        assert_eq!(
            MountTarget::path("/boot/efi").resolve(root),
            [PathBuf::from("/mnt/gentoo/boot/efi")]
        );
        assert!(MountTarget::Swap.resolve(root).is_empty());
        assert_eq!(
            MountTarget::btrfs_root().resolve(root),
            [PathBuf::from("/mnt/gentoo"), PathBuf::from("/mnt/gentoo/home")]
        );
    }
}
