use std::{
    collections::VecDeque,
    io::{self, BufRead, BufReader, Read},
    process::Child,
    sync::mpsc::{self, Sender},
    thread,
};

use crate::error::{Error, Result};

/// Lines of diagnostic output kept for error reports.
const TAIL_LINES: usize = 20;

/// Output of a long running external command, read one line at a time.
///
/// Iterating yields the lines as the command prints them. Call
/// [`Progress::finish`] afterwards to wait for the command and learn whether
/// it succeeded.
pub struct Progress {
    command: String,
    lines: Box<dyn Iterator<Item = io::Result<String>>>,
    child: Option<Child>,
    tail: VecDeque<String>,
    read_error: Option<io::Error>,
}

impl Progress {
    /// Follows both output streams of a spawned command. Podman reports pull
    /// progress on stderr and build steps on stdout.
    pub fn from_child(command: String, mut child: Child) -> Progress {
        let (sender, receiver) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, sender.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, sender);
        }

        Progress {
            command,
            lines: Box::new(receiver.into_iter()),
            child: Some(child),
            tail: VecDeque::new(),
            read_error: None,
        }
    }

    /// Progress that is already complete, e.g. from a fake engine.
    pub fn from_lines<I>(command: String, lines: I) -> Progress
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: 'static,
    {
        Progress {
            command,
            lines: Box::new(lines.into_iter().map(Ok)),
            child: None,
            tail: VecDeque::new(),
            read_error: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Drains any remaining output and waits for the command to exit. The
    /// command is waited for even when its output could not be read.
    pub fn finish(mut self) -> Result<()> {
        while self.next().is_some() {}

        let status = match self.child.take() {
            Some(mut child) => Some(
                child
                    .wait()
                    .map_err(|err| Error::io(self.command.clone(), err))?,
            ),
            None => None,
        };

        if let Some(err) = self.read_error.take() {
            return Err(Error::io(self.command.clone(), err));
        }

        match status {
            Some(status) if !status.success() => {
                let output = self.tail.into_iter().collect::<Vec<_>>().join("\n");
                Err(Error::command_failed(self.command, status, output))
            }
            _ => Ok(()),
        }
    }
}

/// Sends the lines of `output` from a thread of their own, so a command
/// filling one pipe never blocks on the other. Stops after the first read
/// error.
fn forward_lines<R: Read + Send + 'static>(output: R, sender: Sender<io::Result<String>>) {
    thread::spawn(move || {
        for line in BufReader::new(output).lines() {
            let failed = line.is_err();
            if sender.send(line).is_err() || failed {
                break;
            }
        }
    });
}

impl Iterator for Progress {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.read_error.is_some() {
            return None;
        }

        match self.lines.next()? {
            Ok(line) => {
                if self.tail.len() == TAIL_LINES {
                    self.tail.pop_front();
                }
                self.tail.push_back(line.clone());
                Some(line)
            }
            Err(err) => {
                self.read_error = Some(err);
                None
            }
        }
    }
}
