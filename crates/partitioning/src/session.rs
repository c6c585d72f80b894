// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The fdisk session state machine
//!
//! Every public operation is a fixed sequence of send/expect pairs. Each response is
//! followed by a bounded wait for the next prompt of the grammar in [`crate::prompt`];
//! anything else is a [`Desynchronization`] that terminates the tool and fails the
//! session for good.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{debug, error, info, trace, warn};

use crate::{
    process::{Conversation, FdiskProcess},
    prompt::{Prompt, TypePrompt},
    DesyncReason, Desynchronization, Error, SizeSpec, TableKind,
};

/// Most unmatched output kept in a desynchronization report
const OUTPUT_TAIL: usize = 512;

/// How a session finds and waits on its tool
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The fdisk binary to run
    pub program: PathBuf,
    /// Longest wait for any single prompt
    pub prompt_timeout: Duration,
    /// Longest wait for the tool to exit after writing
    pub exit_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("fdisk"),
            prompt_timeout: Duration::from_secs(10),
            exit_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn with_program(self, program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..self
        }
    }

    pub fn with_prompt_timeout(self, prompt_timeout: Duration) -> Self {
        Self { prompt_timeout, ..self }
    }

    pub fn with_exit_timeout(self, exit_timeout: Duration) -> Self {
        Self { exit_timeout, ..self }
    }
}

/// Where in the create-partition dialog the session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStep {
    /// Primary or extended, DOS tables only
    PrimaryOrExtended,
    PartitionNumber,
    FirstSector,
    LastSector,
}

/// The prompt a session is at, or waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// At the top-level menu
    AwaitingCommand,
    /// A create-table command was issued
    AwaitingTableTypeCommit,
    /// Inside the create-partition dialog
    CreatingPartition(CreateStep),
    /// Inside the change-type dialog
    SettingPartitionType,
    /// The write command was issued
    Committing,
    /// The table was written and the tool has gone
    Finished,
    /// The session hit a fatal error and its tool was terminated
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingCommand => f.write_str("at the command prompt"),
            Self::AwaitingTableTypeCommit => f.write_str("creating a partition table"),
            Self::CreatingPartition(step) => {
                let step = match step {
                    CreateStep::PrimaryOrExtended => "primary or extended",
                    CreateStep::PartitionNumber => "partition number",
                    CreateStep::FirstSector => "first sector",
                    CreateStep::LastSector => "last sector",
                };
                write!(f, "creating a partition ({step})")
            }
            Self::SettingPartitionType => f.write_str("setting a partition type"),
            Self::Committing => f.write_str("writing the partition table"),
            Self::Finished => f.write_str("finished"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A scripted conversation with fdisk against one device
///
/// The session owns its tool for its whole lifetime and terminates it on every exit
/// path, including drop. Edits stay in fdisk's memory until [`Session::commit`].
pub struct Session<C: Conversation = FdiskProcess> {
    tool: C,
    config: SessionConfig,
    state: State,
    table: Option<TableKind>,
    partitions: u32,
    buffer: String,
}

impl Session<FdiskProcess> {
    /// Spawns fdisk against `device` and waits for its menu
    pub fn open(device: impl AsRef<Path>, config: SessionConfig) -> Result<Self, Error> {
        let device = device.as_ref();
        let tool = FdiskProcess::spawn(&config.program, device)?;
        info!("🔧 Opened partitioning session on {device:?}");
        Self::attach(tool, config)
    }
}

impl<C: Conversation> Session<C> {
    /// Takes over an already started tool and waits for its menu
    pub fn attach(tool: C, config: SessionConfig) -> Result<Self, Error> {
        let mut session = Self {
            tool,
            config,
            state: State::AwaitingCommand,
            table: None,
            partitions: 0,
            buffer: String::new(),
        };
        session.expect(Prompt::Command)?;
        Ok(session)
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The table created in this session, if any
    pub fn table(&self) -> Option<TableKind> {
        self.table
    }

    pub fn partitions_created(&self) -> u32 {
        self.partitions
    }

    /// Replaces the in-memory partition table with an empty one of `kind`
    pub fn create_table(&mut self, kind: TableKind) -> Result<(), Error> {
        self.require_command("create a partition table")?;
        if self.partitions > 0 {
            return Err(self.out_of_sequence("replace the partition table after creating partitions"));
        }

        self.state = State::AwaitingTableTypeCommit;
        self.send(kind.command())?;
        self.expect(Prompt::Command)?;
        self.state = State::AwaitingCommand;
        self.table = Some(kind);

        info!("📋 Created empty {kind} partition table");
        Ok(())
    }

    /// Creates the next partition with `size`, then retypes it when `type_code` is given.
    ///
    /// # Returns
    ///
    /// The number of the new partition
    pub fn create_partition(&mut self, size: &SizeSpec, type_code: Option<&str>) -> Result<u32, Error> {
        self.require_command("create a partition")?;
        let Some(table) = self.table else {
            return Err(self.out_of_sequence("create a partition without a partition table"));
        };

        self.send("n")?;
        if table == TableKind::Dos {
            self.state = State::CreatingPartition(CreateStep::PrimaryOrExtended);
            self.expect(Prompt::PartitionKind)?;
            self.send("p")?;
        }
        self.state = State::CreatingPartition(CreateStep::PartitionNumber);
        self.expect(Prompt::PartitionNumber)?;
        self.send("")?;
        self.state = State::CreatingPartition(CreateStep::FirstSector);
        self.expect(Prompt::FirstSector)?;
        self.send("")?;
        self.state = State::CreatingPartition(CreateStep::LastSector);
        self.expect(Prompt::LastSector)?;
        self.send(&size.to_string())?;
        self.expect(Prompt::Command)?;
        self.state = State::AwaitingCommand;

        self.partitions += 1;
        let number = self.partitions;
        if size.is_remaining() {
            info!("➕ Created partition {number} using the remaining space");
        } else {
            info!("➕ Created partition {number} of {size}");
        }

        if let Some(code) = type_code {
            self.set_type(table, number, code)?;
        }

        Ok(number)
    }

    /// Writes the table to disk and lets the tool exit
    pub fn commit(mut self) -> Result<(), Error> {
        self.require_command("write the partition table")?;
        if self.table.is_none() {
            return Err(self.out_of_sequence("write without a partition table"));
        }

        self.state = State::Committing;
        self.send("w")?;
        self.expect(Prompt::Synced)?;
        info!("💾 Wrote partition table with {} partitions", self.partitions);

        match self.tool.wait_exit(self.config.exit_timeout) {
            Ok(true) => debug!("fdisk exited after writing"),
            Ok(false) => warn!("fdisk did not exit within {:?} of writing", self.config.exit_timeout),
            Err(e) => warn!("Failed to wait for fdisk: {e}"),
        }
        self.state = State::Finished;

        Ok(())
    }

    fn set_type(&mut self, table: TableKind, number: u32, code: &str) -> Result<(), Error> {
        self.state = State::SettingPartitionType;
        self.send("t")?;

        let type_prompt = table.type_prompt();
        let prompt = self.expect_any(&TypePrompt::candidates(type_prompt))?;
        match TypePrompt::from_prompt(prompt) {
            TypePrompt::NeedsPartitionNumber => {
                self.send(&number.to_string())?;
                self.expect(type_prompt)?;
            }
            TypePrompt::ReadyForTypeCode => {}
        }
        self.send(code)?;
        self.expect(Prompt::Command)?;
        self.state = State::AwaitingCommand;

        info!("🏷️ Set type of partition {number} to {code}");
        Ok(())
    }

    fn require_command(&self, operation: &'static str) -> Result<(), Error> {
        if self.state == State::AwaitingCommand {
            Ok(())
        } else {
            Err(self.out_of_sequence(operation))
        }
    }

    fn out_of_sequence(&self, operation: &'static str) -> Error {
        Error::OutOfSequence {
            operation,
            state: self.state,
        }
    }

    fn send(&mut self, token: &str) -> Result<(), Error> {
        trace!("fdisk <- {token:?}");
        if let Err(e) = self.tool.send_line(token) {
            error!("Failed to send {token:?} to fdisk: {e}");
            self.fail();
            return Err(e.into());
        }
        Ok(())
    }

    fn expect(&mut self, prompt: Prompt) -> Result<(), Error> {
        self.expect_any(&[prompt]).map(|_| ())
    }

    /// Waits for whichever of `candidates` appears first in the output, consuming the
    /// output up to the end of that prompt
    fn expect_any(&mut self, candidates: &[Prompt]) -> Result<Prompt, Error> {
        let wait = self.config.prompt_timeout;
        let deadline = Instant::now() + wait;

        loop {
            let earliest = candidates
                .iter()
                .filter_map(|prompt| prompt.regex().find(&self.buffer).map(|m| (*prompt, m.start(), m.end())))
                .min_by_key(|(_, start, _)| *start);
            if let Some((prompt, _, end)) = earliest {
                trace!("fdisk -> {prompt}");
                self.buffer.drain(..end);
                return Ok(prompt);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.desync(candidates, DesyncReason::Timeout(wait)));
            }
            match self.tool.read_available(deadline - now) {
                Ok(Some(text)) => self.buffer.push_str(&text),
                Ok(None) => return Err(self.desync(candidates, DesyncReason::Exited)),
                Err(e) => {
                    error!("Failed to read from fdisk: {e}");
                    self.fail();
                    return Err(e.into());
                }
            }
        }
    }

    fn desync(&mut self, candidates: &[Prompt], reason: DesyncReason) -> Error {
        let start = self
            .buffer
            .char_indices()
            .rev()
            .nth(OUTPUT_TAIL - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let desync = Desynchronization {
            state: self.state,
            expected: candidates.iter().map(Prompt::describe).collect(),
            reason,
            output: self.buffer[start..].to_owned(),
        };
        error!("❌ {desync}");
        self.fail();
        desync.into()
    }

    fn fail(&mut self) {
        self.state = State::Failed;
        if let Err(e) = self.tool.terminate() {
            warn!("Failed to terminate fdisk: {e}");
        }
    }
}

impl<C: Conversation> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.tool.terminate() {
            warn!("Failed to terminate fdisk: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{text, ScriptedTool, Transcript},
        SizeUnit,
    };
    use test_log::test;

    fn config() -> SessionConfig {
        SessionConfig::default().with_prompt_timeout(Duration::from_millis(50))
    }

    fn attach(tool: ScriptedTool) -> (Session<ScriptedTool>, Transcript) {
        let transcript = tool.transcript();
        (Session::attach(tool, config()).unwrap(), transcript)
    }

    #[test]
    fn test_gpt_sequence() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            .answering_type(TableKind::Gpt, true)
            .answering_partition(TableKind::Gpt)
            .answering_write();
        let (mut session, transcript) = attach(tool);

        session.create_table(TableKind::Gpt).unwrap();
        assert_eq!(session.create_partition(&SizeSpec::gibibytes(1), None).unwrap(), 1);
        assert_eq!(session.create_partition(&SizeSpec::gibibytes(4), Some("swap")).unwrap(), 2);
        assert_eq!(session.create_partition(&SizeSpec::Remaining, None).unwrap(), 3);
        assert_eq!(session.state(), State::AwaitingCommand);
        assert_eq!(session.table(), Some(TableKind::Gpt));
        session.commit().unwrap();

        assert_eq!(
            transcript.sent(),
            ["g", "n", "", "", "+1G", "n", "", "", "+4G", "t", "2", "swap", "n", "", "", "", "w"]
        );
        assert!(!transcript.terminated());
    }

    #[test]
    fn test_dos_sequence() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Dos)
            .answering_partition(TableKind::Dos)
            .answering_type(TableKind::Dos, false)
            .answering_partition(TableKind::Dos)
            .answering_write();
        let (mut session, transcript) = attach(tool);

        session.create_table(TableKind::Dos).unwrap();
        session
            .create_partition(&SizeSpec::exact(512, SizeUnit::Mebibytes), Some("swap"))
            .unwrap();
        session.create_partition(&SizeSpec::Remaining, None).unwrap();
        assert_eq!(session.partitions_created(), 2);
        session.commit().unwrap();

        assert_eq!(
            transcript.sent(),
            ["o", "n", "p", "", "", "+512M", "t", "swap", "n", "p", "", "", "", "w"]
        );
    }

    #[test]
    fn test_slow_exit_is_terminated() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            .then(text::WRITTEN);
        let (mut session, transcript) = attach(tool);

        session.create_table(TableKind::Gpt).unwrap();
        session.create_partition(&SizeSpec::Remaining, None).unwrap();
        session.commit().unwrap();
        assert!(transcript.terminated());
    }

    #[test]
    fn test_out_of_sequence() {
        let (mut session, transcript) = attach(ScriptedTool::new(text::BANNER));

        let err = session.create_partition(&SizeSpec::Remaining, None).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfSequence {
                state: State::AwaitingCommand,
                ..
            }
        ));
        assert!(transcript.sent().is_empty());

        let err = session.commit().unwrap_err();
        assert!(matches!(err, Error::OutOfSequence { .. }));
        assert!(transcript.sent().is_empty());
        assert!(transcript.terminated(), "dropping the session terminates the tool");
    }

    #[test]
    fn test_table_cannot_be_replaced_after_partitions() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt);
        let (mut session, transcript) = attach(tool);

        session.create_table(TableKind::Gpt).unwrap();
        session.create_partition(&SizeSpec::gibibytes(1), None).unwrap();
        assert!(matches!(
            session.create_table(TableKind::Dos),
            Err(Error::OutOfSequence { .. })
        ));
        assert_eq!(transcript.sent().len(), 5);
    }

    /// Runs `ops` against `tool` and returns the desynchronization it hits
    fn desync_of(
        tool: ScriptedTool,
        ops: impl FnOnce(&mut Session<ScriptedTool>) -> Result<(), Error>,
    ) -> (Desynchronization, Transcript) {
        let (mut session, transcript) = attach(tool);
        let err = ops(&mut session).unwrap_err();
        assert_eq!(session.state(), State::Failed);
        assert!(transcript.terminated(), "tool must not be left running");

        // Failed sessions refuse further work without sending anything
        let sent = transcript.sent().len();
        assert!(matches!(
            session.create_partition(&SizeSpec::Remaining, None),
            Err(Error::OutOfSequence {
                state: State::Failed,
                ..
            })
        ));
        assert_eq!(transcript.sent().len(), sent);

        match err {
            Error::Desync(desync) => (desync, transcript),
            other => panic!("expected a desynchronization, got {other}"),
        }
    }

    #[test]
    fn test_desync_on_banner() {
        let tool = ScriptedTool::failing("fdisk: cannot open /dev/sdz: No such file or directory\n");
        let transcript = tool.transcript();
        let Err(Error::Desync(desync)) = Session::attach(tool, config()) else {
            panic!("attach should fail");
        };
        assert_eq!(desync.reason, DesyncReason::Exited);
        assert_eq!(desync.state, State::AwaitingCommand);
        assert!(desync.output.contains("cannot open"));
        assert!(transcript.sent().is_empty());
    }

    #[test]
    fn test_desync_creating_table() {
        let tool = ScriptedTool::new(text::BANNER).then_silence();
        let (desync, transcript) = desync_of(tool, |s| s.create_table(TableKind::Gpt));
        assert_eq!(desync.state, State::AwaitingTableTypeCommit);
        assert_eq!(desync.reason, DesyncReason::Timeout(Duration::from_millis(50)));
        assert_eq!(transcript.sent(), ["g"]);
    }

    #[test]
    fn test_desync_creating_partition() {
        let unexpected = "Partition #1 contains a ext4 signature.\n\nDo you want to remove the signature? [Y]es/[N]o: ";
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .then(text::GPT_NUMBER)
            .then(text::FIRST_SECTOR)
            .then(text::LAST_SECTOR)
            .then(unexpected);
        let (desync, transcript) = desync_of(tool, |s| {
            s.create_table(TableKind::Gpt)?;
            s.create_partition(&SizeSpec::gibibytes(1), None).map(|_| ())
        });
        assert_eq!(desync.state, State::CreatingPartition(CreateStep::LastSector));
        assert_eq!(desync.expected, ["menu prompt"]);
        assert_eq!(desync.output, unexpected);
        assert_eq!(transcript.sent(), ["g", "n", "", "", "+1G"]);
    }

    #[test]
    fn test_desync_on_dos_kind_prompt() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Dos)
            .then(text::GPT_NUMBER);
        let (desync, transcript) = desync_of(tool, |s| {
            s.create_table(TableKind::Dos)?;
            s.create_partition(&SizeSpec::Remaining, None).map(|_| ())
        });
        assert_eq!(desync.state, State::CreatingPartition(CreateStep::PrimaryOrExtended));
        assert_eq!(transcript.sent(), ["o", "n"]);
    }

    #[test]
    fn test_desync_setting_type() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            // A DOS type prompt on a GPT table is outside the grammar
            .then(text::DOS_TYPE);
        let (desync, transcript) = desync_of(tool, |s| {
            s.create_table(TableKind::Gpt)?;
            s.create_partition(&SizeSpec::gibibytes(2), Some("swap")).map(|_| ())
        });
        assert_eq!(desync.state, State::SettingPartitionType);
        assert_eq!(desync.expected, ["partition number prompt", "partition type prompt"]);
        assert_eq!(transcript.sent().last().map(String::as_str), Some("t"));
    }

    #[test]
    fn test_desync_after_type_code() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            .then(text::TYPE_NUMBER)
            .then(text::GPT_TYPE)
            .then("Failed to parse 'bogus' partition type.\n");
        let (desync, transcript) = desync_of(tool, |s| {
            s.create_table(TableKind::Gpt)?;
            s.create_partition(&SizeSpec::gibibytes(2), Some("bogus")).map(|_| ())
        });
        assert_eq!(desync.state, State::SettingPartitionType);
        assert_eq!(desync.expected, ["menu prompt"]);
        assert_eq!(transcript.sent(), ["g", "n", "", "", "+2G", "t", "1", "bogus"]);
    }

    #[test]
    fn test_desync_committing() {
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            .then_exit("fdisk: failed to write disklabel: Input/output error\n");
        let (mut session, transcript) = attach(tool);
        session.create_table(TableKind::Gpt).unwrap();
        session.create_partition(&SizeSpec::Remaining, None).unwrap();

        let Err(Error::Desync(desync)) = session.commit() else {
            panic!("commit should fail");
        };
        assert_eq!(desync.state, State::Committing);
        assert_eq!(desync.reason, DesyncReason::Exited);
        assert!(desync.output.contains("Input/output error"));
        assert_eq!(transcript.sent().last().map(String::as_str), Some("w"));
    }

    #[test]
    fn test_earliest_prompt_wins() {
        // Both candidates are in the buffer; the one printed first is taken
        let tool = ScriptedTool::new(text::BANNER)
            .answering_table(TableKind::Gpt)
            .answering_partition(TableKind::Gpt)
            .then(&format!("{}{}", text::TYPE_NUMBER, text::GPT_TYPE))
            .then(text::CHANGED);
        let (mut session, transcript) = attach(tool);
        session.create_table(TableKind::Gpt).unwrap();
        session.create_partition(&SizeSpec::gibibytes(1), Some("swap")).unwrap();
        assert_eq!(transcript.sent()[5..], ["t", "1", "swap"]);
    }
}
