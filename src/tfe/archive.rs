//! Packages a configuration directory as a gzipped tarball.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use uuid::Uuid;

use crate::process::CommandRunner;

use super::TfeError;

const TAR: &str = "tar";
const IGNORE_FILE: &str = ".terraformignore";
const ALWAYS_EXCLUDED: [&str; 2] = [".git", ".terraform"];

/// Builds configuration archives by shelling out to `tar`.
#[derive(Clone, Debug)]
pub(super) struct Archiver<R> {
    runner: R,
    scratch: Utf8PathBuf,
}

impl<R: CommandRunner> Archiver<R> {
    pub(super) const fn new(runner: R, scratch: Utf8PathBuf) -> Self {
        Self { runner, scratch }
    }

    /// Returns the `tar` arguments used to package `directory` into
    /// `archive`.
    pub(super) fn arguments(directory: &Utf8Path, archive: &Utf8Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("-czf"), OsString::from(archive.as_str())];
        args.extend(
            ALWAYS_EXCLUDED
                .iter()
                .map(|pattern| OsString::from(format!("--exclude={pattern}"))),
        );
        let ignore = directory.join(IGNORE_FILE);
        if ignore.is_file() {
            args.push(OsString::from(format!("--exclude-from={ignore}")));
        }
        args.push(OsString::from("-C"));
        args.push(OsString::from(directory.as_str()));
        args.push(OsString::from("."));
        args
    }

    /// Packages `directory` and returns the archive bytes. The temporary
    /// archive is removed before returning.
    pub(super) fn package(&self, directory: &Utf8Path) -> Result<Vec<u8>, TfeError> {
        if !directory.is_dir() {
            return Err(TfeError::Archive(format!("{directory} is not a directory")));
        }

        let name = format!("tfe-run-{}.tar.gz", Uuid::new_v4());
        let archive = self.scratch.join(&name);
        let output = self
            .runner
            .run(TAR, &Self::arguments(directory, &archive))?;
        let scratch = Dir::open_ambient_dir(&self.scratch, ambient_authority())
            .map_err(|err| TfeError::Archive(format!("{}: {err}", self.scratch)))?;

        if !output.is_success() {
            scratch.remove_file(&name).ok();
            return Err(TfeError::Archive(format!(
                "tar exited with {}: {}",
                output
                    .code
                    .map_or_else(|| String::from("a signal"), |code| format!("status {code}")),
                output.stderr.trim()
            )));
        }

        let bytes = scratch
            .read(&name)
            .map_err(|err| TfeError::Archive(format!("{archive}: {err}")))?;
        if let Err(err) = scratch.remove_file(&name) {
            tracing::warn!(path = %archive, error = %err, "could not remove temporary archive");
        }
        Ok(bytes)
    }
}
