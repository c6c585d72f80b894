// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A scripted stand-in for fdisk
//!
//! [`ScriptedTool`] replays canned output after each line it is sent and records what
//! it was sent, so sessions can be tested without a block device or an fdisk binary.

use std::{cell::RefCell, collections::VecDeque, io, rc::Rc, thread, time::Duration};

use crate::{Conversation, TableKind};

/// Canned fdisk output, as printed by util-linux 2.39 with `LC_ALL=C`
pub mod text {
    pub const BANNER: &str = "\nWelcome to fdisk (util-linux 2.39.3).\n\
        Changes will remain in memory only, until you decide to write them.\n\
        Be careful before using the write command.\n\n\
        Device does not contain a recognized partition table.\n\
        Created a new DOS (MBR) disklabel with disk identifier 0x5c1b2f3e.\n\n\
        Command (m for help): ";
    pub const GPT_CREATED: &str =
        "Created a new GPT disklabel (GUID: 0B7F0A7D-6D52-4B4F-9A1E-7D3C2A1B4E5F).\n\nCommand (m for help): ";
    pub const DOS_CREATED: &str =
        "Created a new DOS (MBR) disklabel with disk identifier 0x8e2a4c11.\n\nCommand (m for help): ";
    pub const SELECT: &str = "Partition type\n   p   primary (0 primary, 0 extended, 4 free)\n   \
        e   extended (container for logical partitions)\nSelect (default p): ";
    pub const GPT_NUMBER: &str = "Partition number (1-128, default 1): ";
    pub const DOS_NUMBER: &str = "Partition number (1-4, default 1): ";
    pub const FIRST_SECTOR: &str = "First sector (2048-41943006, default 2048): ";
    pub const LAST_SECTOR: &str =
        "Last sector, +/-sectors or +/-size{K,M,G,T,P} (2048-41943006, default 41940991): ";
    pub const CREATED: &str =
        "\nCreated a new partition 1 of type 'Linux filesystem' and of size 1 GiB.\n\nCommand (m for help): ";
    pub const TYPE_NUMBER: &str = "Partition number (1-2, default 2): ";
    pub const SELECTED: &str = "Selected partition 1\n";
    pub const GPT_TYPE: &str = "Partition type or alias (type L to list all): ";
    pub const DOS_TYPE: &str = "Hex code or alias (type L to list all): ";
    pub const CHANGED: &str =
        "\nChanged type of partition 'Linux filesystem' to 'Linux swap'.\n\nCommand (m for help): ";
    pub const WRITTEN: &str = "The partition table has been altered.\n\
        Calling ioctl() to re-read partition table.\nSyncing disks.\n";
}

#[derive(Debug)]
enum Reply {
    Output(String),
    Exit(String),
    Silence,
}

#[derive(Debug, Default)]
struct Record {
    sent: Vec<String>,
    terminated: bool,
}

/// Shared view of everything a [`ScriptedTool`] saw, usable after the tool is dropped
#[derive(Debug, Clone, Default)]
pub struct Transcript(Rc<RefCell<Record>>);

impl Transcript {
    /// Every line sent to the tool, in order
    pub fn sent(&self) -> Vec<String> {
        self.0.borrow().sent.clone()
    }

    /// Whether the tool was forcefully terminated while still running
    pub fn terminated(&self) -> bool {
        self.0.borrow().terminated
    }
}

/// A fake driven process following a fixed script
#[derive(Debug)]
pub struct ScriptedTool {
    outbox: String,
    replies: VecDeque<Reply>,
    closing: bool,
    gone: bool,
    transcript: Transcript,
}

impl ScriptedTool {
    /// A tool that prints `banner` on startup
    pub fn new(banner: &str) -> Self {
        Self {
            outbox: banner.to_owned(),
            replies: VecDeque::new(),
            closing: false,
            gone: false,
            transcript: Transcript::default(),
        }
    }

    /// A tool that prints `message` and exits without ever prompting
    pub fn failing(message: &str) -> Self {
        Self {
            closing: true,
            ..Self::new(message)
        }
    }

    /// Prints `output` after the next line is sent
    pub fn then(mut self, output: &str) -> Self {
        self.replies.push_back(Reply::Output(output.to_owned()));
        self
    }

    /// Prints `output` and exits after the next line is sent
    pub fn then_exit(mut self, output: &str) -> Self {
        self.replies.push_back(Reply::Exit(output.to_owned()));
        self
    }

    /// Prints nothing at all after the next line is sent
    pub fn then_silence(mut self) -> Self {
        self.replies.push_back(Reply::Silence);
        self
    }

    /// Answers a create-table command
    pub fn answering_table(self, kind: TableKind) -> Self {
        match kind {
            TableKind::Gpt => self.then(text::GPT_CREATED),
            TableKind::Dos => self.then(text::DOS_CREATED),
        }
    }

    /// Answers every prompt of one create-partition dialog
    pub fn answering_partition(self, kind: TableKind) -> Self {
        let script = match kind {
            TableKind::Gpt => self.then(text::GPT_NUMBER),
            TableKind::Dos => self.then(text::SELECT).then(text::DOS_NUMBER),
        };
        script.then(text::FIRST_SECTOR).then(text::LAST_SECTOR).then(text::CREATED)
    }

    /// Answers a change-type dialog, asking which partition to retype when `asks_number` is set
    pub fn answering_type(self, kind: TableKind, asks_number: bool) -> Self {
        let type_prompt = match kind {
            TableKind::Gpt => text::GPT_TYPE,
            TableKind::Dos => text::DOS_TYPE,
        };
        let script = if asks_number {
            self.then(text::TYPE_NUMBER).then(type_prompt)
        } else {
            self.then(&format!("{}{type_prompt}", text::SELECTED))
        };
        script.then(text::CHANGED)
    }

    /// Answers the write command and exits
    pub fn answering_write(self) -> Self {
        self.then_exit(text::WRITTEN)
    }

    /// Handle on what this tool is sent
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

impl Conversation for ScriptedTool {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        if self.gone {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.transcript.0.borrow_mut().sent.push(line.to_owned());
        match self.replies.pop_front() {
            Some(Reply::Output(text)) => self.outbox.push_str(&text),
            Some(Reply::Exit(text)) => {
                self.outbox.push_str(&text);
                self.closing = true;
            }
            Some(Reply::Silence) | None => {}
        }
        Ok(())
    }

    fn read_available(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        if !self.outbox.is_empty() {
            return Ok(Some(std::mem::take(&mut self.outbox)));
        }
        if self.closing || self.gone {
            self.gone = true;
            return Ok(None);
        }
        thread::sleep(timeout);
        Ok(Some(String::new()))
    }

    fn wait_exit(&mut self, _timeout: Duration) -> io::Result<bool> {
        if self.closing {
            self.gone = true;
        }
        Ok(self.gone)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.closing && !self.gone {
            self.transcript.0.borrow_mut().terminated = true;
        }
        self.gone = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_replays_in_order() {
        let mut tool = ScriptedTool::new("hello").then("one").then_silence().then_exit("bye");
        let transcript = tool.transcript();
        let wait = Duration::from_millis(1);

        assert_eq!(tool.read_available(wait).unwrap().as_deref(), Some("hello"));
        tool.send_line("a").unwrap();
        assert_eq!(tool.read_available(wait).unwrap().as_deref(), Some("one"));
        tool.send_line("b").unwrap();
        assert_eq!(tool.read_available(wait).unwrap().as_deref(), Some(""));
        tool.send_line("c").unwrap();
        assert_eq!(tool.read_available(wait).unwrap().as_deref(), Some("bye"));
        assert_eq!(tool.read_available(wait).unwrap(), None);
        assert!(tool.wait_exit(wait).unwrap());

        tool.terminate().unwrap();
        assert_eq!(transcript.sent(), ["a", "b", "c"]);
        assert!(!transcript.terminated(), "an exited tool is not killed");
    }

    #[test]
    fn test_terminate_running_tool() {
        let mut tool = ScriptedTool::new("");
        let transcript = tool.transcript();
        assert!(!tool.wait_exit(Duration::from_millis(1)).unwrap());
        tool.terminate().unwrap();
        assert!(transcript.terminated());
        assert!(tool.send_line("x").is_err());
        assert_eq!(tool.read_available(Duration::from_millis(1)).unwrap(), None);
    }
}
