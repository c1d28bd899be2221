//! Remote service abstraction for driving a single Terraform Cloud run.
//!
//! The orchestration code only talks to [`RemoteApi`]; the HTTP client in
//! [`crate::tfe`] is one implementation and the scripted double in
//! [`crate::test_support`] is another.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use thiserror::Error;

mod status;

pub use status::{ConfigurationStatus, RunStatus};

/// Workspace resolved once at startup and treated as read-only afterwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Workspace {
    /// Provider identifier (for example `ws-abc123`).
    pub id: String,
    /// Organisation that owns the workspace.
    pub organization: String,
    /// Workspace name as shown in the web UI.
    pub name: String,
    /// Sub-directory of the uploaded configuration that Terraform runs in.
    /// Empty when the workspace uses the upload root.
    pub working_directory: String,
    /// Whether successful plans are applied without confirmation.
    pub auto_apply: bool,
}

/// Attributes sent when creating a configuration version.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConfigurationVersionRequest {
    /// Whether the service should queue a run as soon as the upload is
    /// processed.
    pub auto_queue_runs: bool,
    /// Whether runs using this version are plan-only.
    pub speculative: bool,
}

/// Immutable upload of configuration content bound to one workspace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigurationVersion {
    /// Provider identifier (for example `cv-abc123`).
    pub id: String,
    /// Pre-signed URL that accepts the packaged configuration.
    pub upload_url: String,
    /// Processing status reported by the service.
    pub status: ConfigurationStatus,
    /// Error code reported when processing failed.
    pub error: Option<String>,
    /// Human readable error reported when processing failed.
    pub error_message: Option<String>,
}

/// Parameters required to create a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunRequest {
    /// Workspace the run belongs to.
    pub workspace_id: String,
    /// Processed configuration version the run executes.
    pub configuration_version_id: String,
    /// Whether the run destroys every managed resource.
    pub is_destroy: bool,
    /// Optional message shown as the run title.
    pub message: Option<String>,
    /// Resource addresses passed to `-target`; `None` means no targeting.
    pub target_addrs: Option<Vec<String>>,
    /// Resource addresses passed to `-replace`; `None` means no replacement.
    pub replace_addrs: Option<Vec<String>>,
}

impl RunRequest {
    /// Starts a builder for a [`RunRequest`].
    #[must_use]
    pub fn builder() -> RunRequestBuilder {
        RunRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// identifier is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] when an identifier is empty.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.workspace_id.is_empty() {
            return Err(ApiError::Validation("workspace_id".to_owned()));
        }
        if self.configuration_version_id.is_empty() {
            return Err(ApiError::Validation("configuration_version_id".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`RunRequest`] that normalises empty inputs to "absent".
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunRequestBuilder {
    workspace_id: String,
    configuration_version_id: String,
    is_destroy: bool,
    message: Option<String>,
    target_addrs: Vec<String>,
    replace_addrs: Vec<String>,
}

impl RunRequestBuilder {
    /// Creates an empty builder; identifiers must be set before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the workspace identifier.
    #[must_use]
    pub fn workspace_id(mut self, value: impl Into<String>) -> Self {
        self.workspace_id = value.into();
        self
    }

    /// Sets the configuration version identifier.
    #[must_use]
    pub fn configuration_version_id(mut self, value: impl Into<String>) -> Self {
        self.configuration_version_id = value.into();
        self
    }

    /// Marks the run as a destroy run.
    #[must_use]
    pub const fn is_destroy(mut self, value: bool) -> Self {
        self.is_destroy = value;
        self
    }

    /// Sets the optional run message.
    #[must_use]
    pub fn message(mut self, value: Option<String>) -> Self {
        self.message = value;
        self
    }

    /// Sets the resource addresses to target.
    #[must_use]
    pub fn target_addrs(mut self, value: Vec<String>) -> Self {
        self.target_addrs = value;
        self
    }

    /// Sets the resource addresses to replace.
    #[must_use]
    pub fn replace_addrs(mut self, value: Vec<String>) -> Self {
        self.replace_addrs = value;
        self
    }

    /// Builds and validates the [`RunRequest`].
    ///
    /// Blank messages become `None` and address lists that contain nothing
    /// but blank entries become `None`, so an empty input never reaches the
    /// service as "target nothing".
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] when an identifier is empty.
    pub fn build(self) -> Result<RunRequest, ApiError> {
        let request = RunRequest {
            workspace_id: self.workspace_id.trim().to_owned(),
            configuration_version_id: self.configuration_version_id.trim().to_owned(),
            is_destroy: self.is_destroy,
            message: self.message.filter(|message| !message.trim().is_empty()),
            target_addrs: normalise_addresses(self.target_addrs),
            replace_addrs: normalise_addresses(self.replace_addrs),
        };
        request.validate()?;
        Ok(request)
    }
}

fn normalise_addresses(addresses: Vec<String>) -> Option<Vec<String>> {
    let kept: Vec<String> = addresses
        .into_iter()
        .map(|address| address.trim().to_owned())
        .filter(|address| !address.is_empty())
        .collect();
    if kept.is_empty() { None } else { Some(kept) }
}

/// Snapshot of a run as last fetched from the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Run {
    /// Provider identifier (for example `run-abc123`).
    pub id: String,
    /// Status token reported by the service.
    pub status: RunStatus,
    /// Whether the plan contained changes. Only meaningful once the run
    /// reached a terminal status.
    pub has_changes: bool,
}

/// Reference to the workspace's current persisted state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateVersion {
    /// Provider identifier (for example `sv-abc123`).
    pub id: String,
    /// URL serving the raw state document.
    pub download_url: String,
}

/// Errors raised before a request leaves the process.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Behaviour the orchestration code needs from remote client errors.
pub trait RemoteError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the service answered "not found".
    fn is_not_found(&self) -> bool;
}

/// Future returned by remote operations.
pub type ApiFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Remote operations used by the run lifecycle.
pub trait RemoteApi {
    /// Client specific error type.
    type Error: RemoteError;

    /// Resolves a workspace by organisation and name.
    fn read_workspace<'a>(
        &'a self,
        organization: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, Workspace, Self::Error>;

    /// Creates a configuration version awaiting upload.
    fn create_configuration_version<'a>(
        &'a self,
        workspace: &'a Workspace,
        request: ConfigurationVersionRequest,
    ) -> ApiFuture<'a, ConfigurationVersion, Self::Error>;

    /// Packages `directory` and uploads it to the version's upload URL.
    fn upload_configuration<'a>(
        &'a self,
        version: &'a ConfigurationVersion,
        directory: &'a Utf8Path,
    ) -> ApiFuture<'a, (), Self::Error>;

    /// Re-fetches a configuration version.
    fn read_configuration_version<'a>(
        &'a self,
        id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion, Self::Error>;

    /// Creates a run against a processed configuration version.
    fn create_run<'a>(&'a self, request: &'a RunRequest) -> ApiFuture<'a, Run, Self::Error>;

    /// Re-fetches a run.
    fn read_run<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Run, Self::Error>;

    /// Reads the workspace's current state version.
    fn read_current_state_version<'a>(
        &'a self,
        workspace: &'a Workspace,
    ) -> ApiFuture<'a, StateVersion, Self::Error>;

    /// Downloads the raw state document for a state version.
    fn download_state<'a>(
        &'a self,
        version: &'a StateVersion,
    ) -> ApiFuture<'a, Vec<u8>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn base() -> RunRequestBuilder {
        RunRequest::builder()
            .workspace_id("ws-1")
            .configuration_version_id("cv-1")
    }

    #[test]
    fn empty_targets_match_unspecified_targets() {
        let unspecified = base()
            .build()
            .unwrap_or_else(|err| panic!("request should build: {err}"));
        let empty = base()
            .target_addrs(vec![String::new(), String::from("  ")])
            .replace_addrs(Vec::new())
            .build()
            .unwrap_or_else(|err| panic!("request should build: {err}"));

        assert_eq!(unspecified, empty);
        assert_eq!(empty.target_addrs, None);
    }

    #[test]
    fn targets_drop_blank_entries() {
        let request = base()
            .target_addrs(vec![
                String::from("aws_instance.web"),
                String::new(),
                String::from(" module.db "),
            ])
            .build()
            .unwrap_or_else(|err| panic!("request should build: {err}"));

        assert_eq!(
            request.target_addrs,
            Some(vec![
                String::from("aws_instance.web"),
                String::from("module.db")
            ])
        );
    }

    #[test]
    fn blank_message_is_absent() {
        let request = base()
            .message(Some(String::from("   ")))
            .build()
            .unwrap_or_else(|err| panic!("request should build: {err}"));
        assert_eq!(request.message, None);
    }

    #[rstest]
    #[case("", "cv-1", "workspace_id")]
    #[case("ws-1", " ", "configuration_version_id")]
    fn build_rejects_missing_identifiers(
        #[case] workspace: &str,
        #[case] version: &str,
        #[case] field: &str,
    ) {
        let err = RunRequest::builder()
            .workspace_id(workspace)
            .configuration_version_id(version)
            .build()
            .expect_err("missing identifier should fail");
        assert_eq!(err, ApiError::Validation(field.to_owned()));
    }
}
