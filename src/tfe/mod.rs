//! Terraform Cloud implementation of [`RemoteApi`].

mod archive;
mod error;
mod types;

use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::{
    ApiFuture, ConfigurationVersion, ConfigurationVersionRequest, RemoteApi, Run, RunRequest,
    StateVersion, Workspace,
};
use crate::process::{CommandRunner, ProcessCommandRunner};
use archive::Archiver;
use types::{
    ConfigurationVersionAttributes, Document, ErrorDocument, RunAttributes,
    StateVersionAttributes, WorkspaceAttributes,
};

pub use error::TfeError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const JSON_API: &str = "application/vnd.api+json";

/// Returns the API base URL for `hostname`.
///
/// Bare host names are served over HTTPS; a value that already carries a
/// scheme is used as given.
#[must_use]
pub fn base_url(hostname: &str) -> String {
    let trimmed = hostname.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    }
}

/// Client for the Terraform Cloud (or Enterprise) JSON:API.
#[derive(Clone)]
pub struct TfeClient<R = ProcessCommandRunner> {
    http: reqwest::Client,
    base_url: String,
    token: String,
    archiver: Archiver<R>,
}

impl<R> fmt::Debug for TfeClient<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TfeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TfeClient {
    /// Creates a client for `hostname` authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`TfeError::Config`] when the token is empty, the scratch
    /// directory is not UTF-8, or the HTTP client cannot be built.
    pub fn new(hostname: &str, token: &str) -> Result<Self, TfeError> {
        let scratch = Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
            TfeError::Config(format!(
                "temporary directory {} is not valid UTF-8",
                path.display()
            ))
        })?;
        Self::with_runner(hostname, token, ProcessCommandRunner, scratch)
    }
}

impl<R: CommandRunner> TfeClient<R> {
    /// Creates a client that packages archives through `runner`, writing
    /// temporary files to `scratch`.
    ///
    /// # Errors
    ///
    /// Returns [`TfeError::Config`] when the token is empty or the HTTP
    /// client cannot be built.
    pub fn with_runner(
        hostname: &str,
        token: &str,
        runner: R,
        scratch: Utf8PathBuf,
    ) -> Result<Self, TfeError> {
        if token.trim().is_empty() {
            return Err(TfeError::Config(String::from("API token must not be empty")));
        }
        if hostname.trim().is_empty() {
            return Err(TfeError::Config(String::from("hostname must not be empty")));
        }
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| TfeError::Config(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url(hostname),
            token: token.trim().to_owned(),
            archiver: Archiver::new(runner, scratch),
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.base_url)
    }

    fn authorised(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token).header(ACCEPT, JSON_API)
    }

    async fn get_document<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &str,
    ) -> Result<T, TfeError> {
        let request = self.authorised(self.http.get(self.api_url(path)));
        let response = send(request, resource).await?;
        decode(response, resource).await
    }

    async fn post_document<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        resource: &str,
    ) -> Result<T, TfeError> {
        let payload = serde_json::to_vec(body).map_err(|err| TfeError::Decode {
            resource: resource.to_owned(),
            message: err.to_string(),
        })?;
        let request = self
            .authorised(self.http.post(self.api_url(path)))
            .header(CONTENT_TYPE, JSON_API)
            .body(payload);
        let response = send(request, resource).await?;
        decode(response, resource).await
    }
}

async fn send(request: RequestBuilder, resource: &str) -> Result<Response, TfeError> {
    let response = request.send().await.map_err(|err| TfeError::Transport {
        resource: resource.to_owned(),
        message: err.to_string(),
    })?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, resource, &body))
}

/// Maps a non-success response onto a [`TfeError`].
fn status_error(status: StatusCode, resource: &str, body: &str) -> TfeError {
    match status {
        StatusCode::NOT_FOUND => TfeError::NotFound {
            resource: resource.to_owned(),
        },
        StatusCode::UNAUTHORIZED => TfeError::Unauthorized,
        other => {
            let summary = serde_json::from_str::<ErrorDocument>(body)
                .map(|document| document.summary())
                .unwrap_or_default();
            TfeError::Http {
                resource: resource.to_owned(),
                status: other.as_u16(),
                message: if summary.is_empty() {
                    body.trim().to_owned()
                } else {
                    summary
                },
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response, resource: &str) -> Result<T, TfeError> {
    let bytes = response.bytes().await.map_err(|err| TfeError::Transport {
        resource: resource.to_owned(),
        message: err.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| TfeError::Decode {
        resource: resource.to_owned(),
        message: err.to_string(),
    })
}

impl<R> RemoteApi for TfeClient<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    type Error = TfeError;

    fn read_workspace<'a>(
        &'a self,
        organization: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, Workspace, Self::Error> {
        Box::pin(async move {
            let resource = format!("workspace {organization}/{name}");
            let document: Document<WorkspaceAttributes> = self
                .get_document(
                    &format!("organizations/{organization}/workspaces/{name}"),
                    &resource,
                )
                .await?;
            Ok(document.into_workspace(organization))
        })
    }

    fn create_configuration_version<'a>(
        &'a self,
        workspace: &'a Workspace,
        request: ConfigurationVersionRequest,
    ) -> ApiFuture<'a, ConfigurationVersion, Self::Error> {
        Box::pin(async move {
            let document: Document<ConfigurationVersionAttributes> = self
                .post_document(
                    &format!("workspaces/{}/configuration-versions", workspace.id),
                    &types::configuration_version_body(request),
                    "configuration version",
                )
                .await?;
            Ok(document.into_configuration_version())
        })
    }

    fn upload_configuration<'a>(
        &'a self,
        version: &'a ConfigurationVersion,
        directory: &'a Utf8Path,
    ) -> ApiFuture<'a, (), Self::Error> {
        Box::pin(async move {
            if version.upload_url.is_empty() {
                return Err(TfeError::MissingField {
                    resource: format!("configuration version {}", version.id),
                    field: "upload-url",
                });
            }
            let archiver = self.archiver.clone();
            let source = directory.to_path_buf();
            let archive = tokio::task::spawn_blocking(move || archiver.package(&source))
                .await
                .map_err(|err| TfeError::Archive(format!("packaging task failed: {err}")))??;
            tracing::debug!(bytes = archive.len(), id = %version.id, "uploading configuration archive");
            let request = self
                .http
                .put(&version.upload_url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .timeout(UPLOAD_TIMEOUT)
                .body(archive);
            send(request, "configuration upload").await?;
            Ok(())
        })
    }

    fn read_configuration_version<'a>(
        &'a self,
        id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion, Self::Error> {
        Box::pin(async move {
            let document: Document<ConfigurationVersionAttributes> = self
                .get_document(
                    &format!("configuration-versions/{id}"),
                    &format!("configuration version {id}"),
                )
                .await?;
            Ok(document.into_configuration_version())
        })
    }

    fn create_run<'a>(&'a self, request: &'a RunRequest) -> ApiFuture<'a, Run, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let document: Document<RunAttributes> = self
                .post_document("runs", &types::run_body(request), "run")
                .await?;
            Ok(document.into_run())
        })
    }

    fn read_run<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Run, Self::Error> {
        Box::pin(async move {
            let document: Document<RunAttributes> = self
                .get_document(&format!("runs/{id}"), &format!("run {id}"))
                .await?;
            Ok(document.into_run())
        })
    }

    fn read_current_state_version<'a>(
        &'a self,
        workspace: &'a Workspace,
    ) -> ApiFuture<'a, StateVersion, Self::Error> {
        Box::pin(async move {
            let document: Document<StateVersionAttributes> = self
                .get_document(
                    &format!("workspaces/{}/current-state-version", workspace.id),
                    "current state version",
                )
                .await?;
            document.into_state_version()
        })
    }

    fn download_state<'a>(
        &'a self,
        version: &'a StateVersion,
    ) -> ApiFuture<'a, Vec<u8>, Self::Error> {
        Box::pin(async move {
            let resource = format!("state version {}", version.id);
            let request = self.http.get(&version.download_url).bearer_auth(&self.token);
            let response = send(request, &resource).await?;
            let bytes = response.bytes().await.map_err(|err| TfeError::Transport {
                resource,
                message: err.to_string(),
            })?;
            Ok(bytes.to_vec())
        })
    }
}
