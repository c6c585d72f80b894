// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The prompt grammar of fdisk
//!
//! These are the prompts of util-linux fdisk (2.36 and later) with `LC_ALL=C`. A change
//! in their wording breaks the session, so new variants belong here as additions to
//! the grammar rather than as special cases in the session.

use std::{fmt, sync::LazyLock};

use regex::Regex;

/// A prompt the driven tool is known to present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prompt {
    /// Top-level menu
    Command,
    /// Primary or extended, DOS tables only
    PartitionKind,
    /// Which partition to create or retype
    PartitionNumber,
    FirstSector,
    /// Last sector or `+size`
    LastSector,
    /// Type code or alias on a GPT table
    GptTypeCode,
    /// Hex code or alias on a DOS table
    DosTypeCode,
    /// Printed once the table has been written
    Synced,
}

impl Prompt {
    /// Every prompt, in declaration order
    pub const ALL: [Prompt; 8] = [
        Prompt::Command,
        Prompt::PartitionKind,
        Prompt::PartitionNumber,
        Prompt::FirstSector,
        Prompt::LastSector,
        Prompt::GptTypeCode,
        Prompt::DosTypeCode,
        Prompt::Synced,
    ];

    /// The regular expression matching this prompt in the tool's output
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Command => r"Command \(m for help\): ",
            Self::PartitionKind => r"Select \(.*?\): ",
            Self::PartitionNumber => r"Partition number \(.*?\): ",
            Self::FirstSector => r"First sector \(.*?\): ",
            Self::LastSector => r"Last sector, \+/-sectors or \+/-size\{K,M,G,T,P\} \(.*?\): ",
            Self::GptTypeCode => r"Partition type or alias \(type L to list all\): ",
            Self::DosTypeCode => r"Hex code or alias \(type L to list all\): ",
            Self::Synced => r"Syncing disks\.",
        }
    }

    /// Compiled form of [`Prompt::pattern`]
    pub fn regex(&self) -> &'static Regex {
        static COMPILED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
            Prompt::ALL
                .iter()
                .map(|p| Regex::new(p.pattern()).expect("static prompt pattern"))
                .collect()
        });
        &COMPILED[*self as usize]
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Command => "menu prompt",
            Self::PartitionKind => "primary/extended prompt",
            Self::PartitionNumber => "partition number prompt",
            Self::FirstSector => "first sector prompt",
            Self::LastSector => "last sector or size prompt",
            Self::GptTypeCode => "partition type prompt",
            Self::DosTypeCode => "hex code prompt",
            Self::Synced => "sync confirmation",
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// What fdisk asks first after the change-type command.
///
/// With more than one partition fdisk asks which partition to retype, with a single
/// partition it selects it implicitly and goes straight to the type code. Which one
/// shows up depends on table state and fdisk version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePrompt {
    NeedsPartitionNumber,
    ReadyForTypeCode,
}

impl TypePrompt {
    /// The two prompts that may follow the change-type command
    pub fn candidates(type_prompt: Prompt) -> [Prompt; 2] {
        [Prompt::PartitionNumber, type_prompt]
    }

    /// Classifies the prompt that was matched
    pub fn from_prompt(prompt: Prompt) -> Self {
        if prompt == Prompt::PartitionNumber {
            Self::NeedsPartitionNumber
        } else {
            Self::ReadyForTypeCode
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_compiled_order_matches_variants() {
        for prompt in Prompt::ALL {
            assert_eq!(prompt.regex().as_str(), prompt.pattern());
        }
    }

    #[test]
    fn test_prompts_match_fdisk_output() {
        let cases = [
            (Prompt::Command, "\nCommand (m for help): "),
            (Prompt::PartitionKind, "   e   extended (container for logical partitions)\nSelect (default p): "),
            (Prompt::PartitionNumber, "Partition number (1-128, default 1): "),
            (Prompt::FirstSector, "First sector (2048-41943006, default 2048): "),
            (
                Prompt::LastSector,
                "Last sector, +/-sectors or +/-size{K,M,G,T,P} (2048-41943006, default 41940991): ",
            ),
            (Prompt::GptTypeCode, "Partition type or alias (type L to list all): "),
            (Prompt::DosTypeCode, "Hex code or alias (type L to list all): "),
            (Prompt::Synced, "The partition table has been altered.\nSyncing disks.\n"),
        ];
        for (prompt, output) in cases {
            assert!(prompt.regex().is_match(output), "{prompt} should match {output:?}");
            for other in Prompt::ALL.iter().filter(|p| **p != prompt) {
                assert!(!other.regex().is_match(output), "{other} should not match {output:?}");
            }
        }
    }

    #[test]
    fn test_type_prompt_classification() {
        assert_eq!(
            TypePrompt::from_prompt(Prompt::PartitionNumber),
            TypePrompt::NeedsPartitionNumber
        );
        assert_eq!(
            TypePrompt::from_prompt(Prompt::GptTypeCode),
            TypePrompt::ReadyForTypeCode
        );
        assert_eq!(
            TypePrompt::candidates(Prompt::DosTypeCode),
            [Prompt::PartitionNumber, Prompt::DosTypeCode]
        );
    }
}
