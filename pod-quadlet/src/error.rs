use std::{fmt, io, path::PathBuf, process::ExitStatus};
use thiserror::Error;

use crate::rules::RuleError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The stack definition or a snapshot could not be decoded.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("{}", ValidationList(.0))]
    Validation(Vec<RuleError>),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    /// An external tool exited unsuccessfully. `output` keeps the tail of
    /// what the tool printed so the user can see why.
    #[error("`{command}` failed ({status}){}", render_output(.output))]
    ExternalCommand {
        command: String,
        status: String,
        output: String,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not serialize snapshot: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

impl Error {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn command_failed(command: String, status: ExitStatus, output: String) -> Error {
        let status = match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".into(),
        };

        Error::ExternalCommand {
            command,
            status,
            output,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

struct ValidationList<'a>(&'a [RuleError]);

impl fmt::Display for ValidationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack failed validation with {} error(s)", self.0.len())?;
        for err in self.0 {
            write!(f, "\n    - {}", err)?;
        }
        Ok(())
    }
}

fn render_output(output: &str) -> String {
    let output = output.trim();
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{}", output)
    }
}
