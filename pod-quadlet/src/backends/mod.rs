use log::debug;
use std::{
    ffi::OsStr,
    process::{Command, Stdio},
};

use crate::error::{Error, Result};

mod podman;
mod systemd;

pub use podman::PodmanBackend;
pub use systemd::SystemdSupervisor;

/// Lines of stderr kept when a command fails.
const ERROR_LINES: usize = 20;

/// `program arg arg ...`, for logs and error messages.
fn command_line<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Runs a command to completion and returns what it printed on stdout.
fn run<S: AsRef<OsStr>>(program: &str, args: &[S]) -> Result<String> {
    let line = command_line(program, args);
    debug!("running {}", line);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| Error::io(program, err))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines = stderr.lines().collect::<Vec<_>>();
        let tail = lines[lines.len().saturating_sub(ERROR_LINES)..].join("\n");
        return Err(Error::command_failed(line, output.status, tail));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_command_lines() {
        assert_eq!(
            command_line("podman", &["volume", "rm", "-f", "data"]),
            "podman volume rm -f data"
        );
    }

    #[cfg(unix)]
    #[test]
    fn failures_keep_the_tail_of_stderr() {
        match run("sh", &["-c", "echo one >&2; echo two >&2; exit 3"]) {
            Err(Error::ExternalCommand { status, output, .. }) => {
                assert_eq!(status, "exit code 3");
                assert_eq!(output, "one\ntwo");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn returns_stdout() {
        assert_eq!(run("sh", &["-c", "echo hello"]).unwrap(), "hello\n");
    }
}
