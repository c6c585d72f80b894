// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Transport to the driven tool
//!
//! The session only needs to send lines, wait a bounded time for output, and
//! terminate the peer. [`FdiskProcess`] does this for a real child process using
//! `poll(2)` on its output pipes, so every wait is bounded without helper threads.

use std::{
    io::{self, Read, Write},
    os::fd::AsFd,
    path::Path,
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};

/// A line-oriented conversation with an interactive tool
pub trait Conversation {
    /// Sends one line of input, terminated by a newline
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Waits up to `timeout` for output.
    ///
    /// # Returns
    ///
    /// * `Some(text)` with whatever arrived, empty if nothing did
    /// * `None` once the tool has closed its output
    fn read_available(&mut self, timeout: Duration) -> io::Result<Option<String>>;

    /// Waits up to `timeout` for the tool to exit on its own, returning whether it did
    fn wait_exit(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Forcefully terminates the tool. Calling this on an exited tool is a no-op.
    fn terminate(&mut self) -> io::Result<()>;
}

/// A spawned fdisk process with piped stdio
pub struct FdiskProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    reaped: bool,
}

impl FdiskProcess {
    /// Spawns `program` against `device` with a stable C locale
    pub fn spawn(program: &Path, device: &Path) -> Result<Self, crate::Error> {
        debug!("Spawning {program:?} {device:?}");
        let mut child = Command::new(program)
            .arg(device)
            .env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| crate::Error::Spawn {
                program: program.to_string_lossy().into_owned(),
                source,
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) = (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("child stdio was not captured").into());
        };

        Ok(Self {
            child,
            stdin,
            stdout: Some(stdout),
            stderr: Some(stderr),
            reaped: false,
        })
    }
}

impl Conversation for FdiskProcess {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()
    }

    fn read_available(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        if self.stdout.is_none() && self.stderr.is_none() {
            return Ok(None);
        }

        // Which of (stdout, stderr) have something for us, EOF included
        let ready = {
            let mut fds = vec![];
            let mut streams = vec![];
            if let Some(out) = &self.stdout {
                fds.push(PollFd::new(out.as_fd(), PollFlags::POLLIN));
                streams.push(0);
            }
            if let Some(err) = &self.stderr {
                fds.push(PollFd::new(err.as_fd(), PollFlags::POLLIN));
                streams.push(1);
            }

            let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(0) | Err(Errno::EINTR) => return Ok(Some(String::new())),
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }

            let wanted = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            fds.iter()
                .zip(streams)
                .filter(|(fd, _)| fd.revents().is_some_and(|r| r.intersects(wanted)))
                .map(|(_, stream)| stream)
                .collect::<Vec<_>>()
        };

        let mut text = String::new();
        let mut buf = [0u8; 4096];
        for stream in ready {
            let n = match stream {
                0 => self.stdout.as_mut().map(|s| s.read(&mut buf)).transpose()?,
                _ => self.stderr.as_mut().map(|s| s.read(&mut buf)).transpose()?,
            };
            match n {
                Some(0) => {
                    trace!("fdisk closed {}", if stream == 0 { "stdout" } else { "stderr" });
                    if stream == 0 {
                        self.stdout = None;
                    } else {
                        self.stderr = None;
                    }
                }
                Some(n) => text.push_str(&String::from_utf8_lossy(&buf[..n])),
                None => {}
            }
        }

        if text.is_empty() && self.stdout.is_none() && self.stderr.is_none() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    fn wait_exit(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("fdisk exited with {status}");
                self.reaped = true;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }
        if self.child.try_wait()?.is_none() {
            warn!("🛑 Killing fdisk (pid {})", self.child.id());
            self.child.kill()?;
        }
        self.child.wait()?;
        self.reaped = true;
        Ok(())
    }
}

impl Drop for FdiskProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("Failed to terminate fdisk: {e}");
        }
    }
}
