// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Running external tools and capturing their output

use std::process::Command;

use itertools::Itertools;
use log::{debug, error};
use thiserror::Error;

/// An external command ran but exited unsuccessfully.
///
/// Never retried: a failing block device query points at a problem with the
/// environment that the caller has to resolve.
#[derive(Debug, Error)]
#[error("`{command}` failed with {}: {}", describe_code(.code), .stderr.trim())]
pub struct CommandError {
    /// The command line that was executed
    pub command: String,
    /// Exit code of the process, `None` if it was terminated by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_owned(),
    }
}

/// Render a command as a shell-like command line for diagnostics
pub(crate) fn render(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|s| s.to_string_lossy())
        .join(" ")
}

/// Runs a command to completion, returning its standard output.
///
/// # Errors
///
/// * [`crate::Error::Spawn`] if the program could not be started
/// * [`crate::Error::Command`] if it exited unsuccessfully
pub fn run(command: &mut Command) -> Result<String, crate::Error> {
    let rendered = render(command);
    debug!("Running `{rendered}`");

    let output = command.output().map_err(|source| crate::Error::Spawn {
        program: command.get_program().to_string_lossy().into_owned(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        error!("❌ `{rendered}` exited with {:?}", output.status.code());
        return Err(CommandError {
            command: rendered,
            code: output.status.code(),
            stdout,
            stderr,
        }
        .into());
    }

    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use test_log::test;

    #[test]
    fn test_success_captures_stdout() {
        let out = run(Command::new("echo").args(["hello", "world"])).unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[test]
    fn test_failure_carries_context() {
        let err = run(Command::new("sh").args(["-c", "echo out; echo err >&2; exit 3"])).unwrap_err();
        let Error::Command(err) = err else {
            panic!("expected a command error, got {err:?}");
        };
        assert_eq!(err.code, Some(3));
        assert_eq!(err.command, "sh -c echo out; echo err >&2; exit 3");
        assert_eq!(err.stdout.trim(), "out");
        assert_eq!(err.stderr.trim(), "err");
        assert!(err.to_string().contains("exit code 3"));
    }

    #[test]
    fn test_missing_program() {
        let err = run(&mut Command::new("/nonexistent/lsblk")).unwrap_err();
        assert!(matches!(err, Error::Spawn { ref program, .. } if program == "/nonexistent/lsblk"));
    }
}
