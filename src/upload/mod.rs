//! Configuration upload: temporary variables file, configuration version
//! creation, directory upload, and the wait for processing.

use std::fmt;
use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tokio_util::sync::CancellationToken;

use crate::api::{
    ConfigurationStatus, ConfigurationVersion, ConfigurationVersionRequest, RemoteApi, RemoteError,
    Workspace,
};
use crate::observer::{DistinctStatus, RunEvent, RunObserver};
use crate::poll::{PollPolicy, poll_until};
use crate::run::{RunError, RunKind, WaitStage};

/// Name of the variables file Terraform loads automatically.
pub const VARIABLES_FILE_NAME: &str = "run.auto.tfvars";

/// Delay between configuration version status checks.
pub const CONFIGURATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Budget for the service to process an uploaded configuration version.
pub const CONFIGURATION_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Variables file written into the upload directory for one upload.
///
/// The file is removed when the value is dropped, whether the upload
/// finished, failed, or the surrounding future was abandoned. A failed
/// removal is reported to the observer as
/// [`RunEvent::VariablesFileNotRemoved`].
pub struct VariablesFile<'a> {
    dir: Dir,
    path: Utf8PathBuf,
    observer: &'a dyn RunObserver,
}

impl<'a> VariablesFile<'a> {
    /// Returns the location the file is written to.
    #[must_use]
    pub fn location(directory: &Utf8Path, working_directory: &str) -> Utf8PathBuf {
        directory
            .join(working_directory.trim_start_matches('/'))
            .join(VARIABLES_FILE_NAME)
    }

    /// Writes `contents` verbatim to `run.auto.tfvars` inside the workspace
    /// working directory beneath `directory`.
    ///
    /// # Errors
    ///
    /// Returns the file system error when the directory cannot be opened or
    /// the file cannot be written.
    pub fn write(
        directory: &Utf8Path,
        working_directory: &str,
        contents: &str,
        observer: &'a dyn RunObserver,
    ) -> io::Result<Self> {
        let parent = directory.join(working_directory.trim_start_matches('/'));
        let dir = Dir::open_ambient_dir(&parent, ambient_authority())?;
        dir.write(VARIABLES_FILE_NAME, contents)?;
        Ok(Self {
            dir,
            path: parent.join(VARIABLES_FILE_NAME),
            observer,
        })
    }

    /// Location of the written file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl fmt::Debug for VariablesFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariablesFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for VariablesFile<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.dir.remove_file(VARIABLES_FILE_NAME) {
            self.observer.on_event(&RunEvent::VariablesFileNotRemoved {
                path: self.path.clone(),
                message: err.to_string(),
            });
        }
    }
}

/// Creates configuration versions, uploads the directory, and waits for the
/// service to process it.
#[derive(Debug)]
pub struct UploadCoordinator<'a, A, O> {
    api: &'a A,
    observer: &'a O,
    policy: PollPolicy,
}

impl<'a, A, O> UploadCoordinator<'a, A, O>
where
    A: RemoteApi,
    O: RunObserver,
{
    /// Creates a coordinator using the default polling policy.
    #[must_use]
    pub const fn new(api: &'a A, observer: &'a O) -> Self {
        Self {
            api,
            observer,
            policy: PollPolicy::new(CONFIGURATION_POLL_INTERVAL, CONFIGURATION_WAIT_TIMEOUT),
        }
    }

    /// Overrides the processing wait policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Uploads `directory` as a new configuration version and returns it
    /// once the service has processed it.
    ///
    /// The version never queues runs on its own and is speculative exactly
    /// when `kind` is [`RunKind::Plan`]. When `inline_variables` is given it
    /// is written to `run.auto.tfvars` for the duration of the upload call
    /// and removed afterwards whether or not the upload succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::VariablesFile`] before any upload when the
    /// variables file cannot be written,
    /// [`RunError::MissingUploadPermission`] when the service answers "not
    /// found", [`RunError::Upload`] when the upload fails,
    /// [`RunError::ConfigurationErrored`] or
    /// [`RunError::ConfigurationArchived`] as soon as processing fails, and
    /// [`RunError::Timeout`] or [`RunError::Cancelled`] when the wait is cut
    /// short.
    pub async fn upload_configuration(
        &self,
        workspace: &Workspace,
        directory: &Utf8Path,
        kind: RunKind,
        inline_variables: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ConfigurationVersion, RunError<A::Error>> {
        let variables = inline_variables
            .map(|contents| self.write_variables(workspace, directory, contents))
            .transpose()?;

        let request = ConfigurationVersionRequest {
            auto_queue_runs: false,
            speculative: kind.is_speculative(),
        };
        let version = self
            .api
            .create_configuration_version(workspace, request)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    RunError::MissingUploadPermission(err)
                } else {
                    RunError::CreateConfigurationVersion(err)
                }
            })?;

        self.observer.on_event(&RunEvent::UploadStarted {
            directory: directory.to_path_buf(),
        });
        let uploaded = self.api.upload_configuration(&version, directory).await;
        drop(variables);
        uploaded.map_err(|source| RunError::Upload {
            directory: directory.to_path_buf(),
            source,
        })?;
        self.observer.on_event(&RunEvent::UploadFinished);

        let processed = self.wait_until_processed(version, cancel).await?;
        self.observer.on_event(&RunEvent::ConfigurationProcessed {
            id: processed.id.clone(),
        });
        Ok(processed)
    }

    fn write_variables(
        &self,
        workspace: &Workspace,
        directory: &Utf8Path,
        contents: &str,
    ) -> Result<VariablesFile<'a>, RunError<A::Error>> {
        let path = VariablesFile::location(directory, &workspace.working_directory);
        self.observer
            .on_event(&RunEvent::VariablesFileCreated { path: path.clone() });
        VariablesFile::write(
            directory,
            &workspace.working_directory,
            contents,
            self.observer,
        )
        .map_err(|source| RunError::VariablesFile { path, source })
    }

    async fn wait_until_processed(
        &self,
        version: ConfigurationVersion,
        cancel: &CancellationToken,
    ) -> Result<ConfigurationVersion, RunError<A::Error>> {
        let mut current = version;
        let mut seen = DistinctStatus::new();

        let waited = poll_until(cancel, self.policy, async || {
            let latest = match self.api.read_configuration_version(&current.id).await {
                Ok(latest) => latest,
                Err(err) => return Err(RunError::ReadConfigurationVersion(err)),
            };
            if seen.observe(&latest.status) {
                self.observer.on_event(&RunEvent::ConfigurationStatusChanged {
                    status: latest.status.clone(),
                });
            }
            let status = latest.status.clone();
            current = latest;
            match status {
                ConfigurationStatus::Uploaded => Ok(true),
                ConfigurationStatus::Errored => Err(RunError::ConfigurationErrored {
                    id: current.id.clone(),
                    error: current.error.clone().unwrap_or_default(),
                    message: current.error_message.clone().unwrap_or_default(),
                }),
                ConfigurationStatus::Archived => Err(RunError::ConfigurationArchived {
                    id: current.id.clone(),
                }),
                _ => Ok(false),
            }
        })
        .await;

        waited.map_err(|err| RunError::from_poll(err, WaitStage::ConfigurationProcessing))?;
        Ok(current)
    }
}
