// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Scripted partitioning through `fdisk`
//!
//! `fdisk` is treated as a protocol peer with a fixed grammar of prompts. A [`Session`]
//! spawns it against one device and drives it through create-table, create-partition,
//! set-type and write sub-dialogs, matching each expected prompt before sending the
//! next response. Nothing reaches the disk until [`Session::commit`], as fdisk holds
//! all edits in memory until it is told to write.

use std::{fmt, io, str::FromStr, time::Duration};

use thiserror::Error;

pub mod mock;
pub mod process;
pub mod prompt;
pub mod session;
pub mod size;

pub use process::{Conversation, FdiskProcess};
pub use prompt::{Prompt, TypePrompt};
pub use session::{CreateStep, Session, SessionConfig, State};
pub use size::{SizeSpec, SizeUnit};

/// Errors that can occur while driving the partitioning tool
#[derive(Debug, Error)]
pub enum Error {
    /// The tool could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The tool did not present the expected prompt
    #[error(transparent)]
    Desync(#[from] Desynchronization),

    /// An operation was requested from a state that does not allow it. Nothing was
    /// sent to the tool.
    #[error("cannot {operation} while {state}")]
    OutOfSequence { operation: &'static str, state: State },

    #[error("unknown variant: {0}")]
    UnknownVariant(String),

    #[error("invalid size token: {0:?}")]
    InvalidSize(String),

    #[error("io: {0}")]
    IO(#[from] io::Error),
}

/// Why an expected prompt never appeared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncReason {
    /// Nothing matching arrived within the bounded wait
    Timeout(Duration),
    /// The tool closed its output
    Exited,
}

impl fmt::Display for DesyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(wait) => write!(f, "did not show it within {wait:?}"),
            Self::Exited => f.write_str("exited"),
        }
    }
}

/// The tool's output diverged from the prompt grammar.
///
/// Fatal to the session: the tool is terminated and no response is guessed, as the
/// tool's state is unknown at this point.
#[derive(Debug, Error)]
#[error("protocol desynchronization while {state}: expected {} but fdisk {reason}; unmatched output: {output:?}", .expected.join(" or "))]
pub struct Desynchronization {
    /// State the session was in
    pub state: State,
    /// Descriptions of the prompts that would have been accepted
    pub expected: Vec<&'static str>,
    pub reason: DesyncReason,
    /// Tail of the output that did not match
    pub output: String,
}

/// The type of partition table to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// GUID Partition Table
    Gpt,
    /// DOS (MBR) partition table
    Dos,
}

impl TableKind {
    /// The fdisk menu command creating an empty table of this kind
    pub fn command(&self) -> &'static str {
        match self {
            Self::Gpt => "g",
            Self::Dos => "o",
        }
    }

    /// The prompt fdisk shows when asking for a partition type on this table
    pub fn type_prompt(&self) -> Prompt {
        match self {
            Self::Gpt => Prompt::GptTypeCode,
            Self::Dos => Prompt::DosTypeCode,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpt => f.write_str("gpt"),
            Self::Dos => f.write_str("dos"),
        }
    }
}

impl FromStr for TableKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "gpt" => Ok(Self::Gpt),
            "dos" => Ok(Self::Dos),
            _ => Err(Error::UnknownVariant(value.to_owned())),
        }
    }
}
