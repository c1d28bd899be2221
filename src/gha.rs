//! GitHub Actions step outputs.
//!
//! Outputs are appended to the file named by `GITHUB_OUTPUT` using the
//! multi-line `name<<delimiter` form. Outside of Actions they are written to
//! stdout as `name=value` lines.

use std::env;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir, fs_utf8::OpenOptions};
use thiserror::Error;
use uuid::Uuid;

/// Environment variable naming the step output file.
pub const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Errors raised while publishing an output.
#[derive(Debug, Error)]
pub enum OutputSinkError {
    /// Raised when the output file cannot be opened or appended to.
    #[error("failed to write output {name} to {path}: {source}")]
    File {
        /// Output name.
        name: String,
        /// Output file location.
        path: Utf8PathBuf,
        /// Underlying file system error.
        #[source]
        source: io::Error,
    },
    /// Raised when writing to stdout fails.
    #[error("failed to write output {name} to stdout: {source}")]
    Stdout {
        /// Output name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Destination for named step outputs.
pub trait OutputSink {
    /// Publishes one output value.
    ///
    /// # Errors
    ///
    /// Returns an [`OutputSinkError`] when the value cannot be written.
    fn set_output(&self, name: &str, value: &str) -> Result<(), OutputSinkError>;
}

impl<T: OutputSink + ?Sized> OutputSink for &T {
    fn set_output(&self, name: &str, value: &str) -> Result<(), OutputSinkError> {
        (**self).set_output(name, value)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Target {
    File(Utf8PathBuf),
    Stdout,
}

/// Writes outputs the way GitHub Actions expects them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GithubOutput {
    target: Target,
}

impl GithubOutput {
    /// Targets the file named by `GITHUB_OUTPUT`, or stdout when unset or
    /// empty.
    #[must_use]
    pub fn from_env() -> Self {
        match env::var(GITHUB_OUTPUT_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::to_file(path),
            _ => Self::stdout(),
        }
    }

    /// Targets an explicit output file.
    #[must_use]
    pub fn to_file(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            target: Target::File(path.into()),
        }
    }

    /// Targets stdout.
    #[must_use]
    pub const fn stdout() -> Self {
        Self {
            target: Target::Stdout,
        }
    }

    /// Returns the output file, if one is targeted.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match &self.target {
            Target::File(path) => Some(path),
            Target::Stdout => None,
        }
    }
}

impl OutputSink for GithubOutput {
    fn set_output(&self, name: &str, value: &str) -> Result<(), OutputSinkError> {
        match &self.target {
            Target::File(path) => {
                append_block(path, name, value).map_err(|source| OutputSinkError::File {
                    name: name.to_owned(),
                    path: path.clone(),
                    source,
                })
            }
            Target::Stdout => writeln!(io::stdout(), "{name}={value}").map_err(|source| {
                OutputSinkError::Stdout {
                    name: name.to_owned(),
                    source,
                }
            }),
        }
    }
}

/// Renders one output as a delimited block.
///
/// The delimiter is random, so a value can only collide with it by chance.
#[must_use]
pub fn render_block(name: &str, value: &str, delimiter: &str) -> String {
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}

fn append_block(path: &Utf8Path, name: &str, value: &str) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name")
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    let mut file = dir.open_with(file_name, OpenOptions::new().append(true).create(true))?;
    let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
    file.write_all(render_block(name, value, &delimiter).as_bytes())
}
