//! JSON:API documents exchanged with Terraform Cloud.

use serde::{Deserialize, Serialize};

use crate::api::{
    ConfigurationStatus, ConfigurationVersion, ConfigurationVersionRequest, Run, RunRequest,
    RunStatus, StateVersion, Workspace,
};

use super::TfeError;

#[derive(Debug, Deserialize)]
pub(super) struct Document<A> {
    pub(super) data: Resource<A>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Resource<A> {
    pub(super) id: String,
    pub(super) attributes: A,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct WorkspaceAttributes {
    pub(super) name: String,
    #[serde(default)]
    pub(super) working_directory: Option<String>,
    #[serde(default)]
    pub(super) auto_apply: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct ConfigurationVersionAttributes {
    pub(super) status: String,
    #[serde(default)]
    pub(super) upload_url: Option<String>,
    #[serde(default)]
    pub(super) error: Option<String>,
    #[serde(default)]
    pub(super) error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct RunAttributes {
    pub(super) status: String,
    #[serde(default)]
    pub(super) has_changes: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct StateVersionAttributes {
    #[serde(default)]
    pub(super) hosted_state_download_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorDocument {
    #[serde(default)]
    pub(super) errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorObject {
    #[serde(default)]
    pub(super) title: Option<String>,
    #[serde(default)]
    pub(super) detail: Option<String>,
}

impl ErrorDocument {
    /// Joins the reported errors into one line.
    pub(super) fn summary(&self) -> String {
        self.errors
            .iter()
            .filter_map(|err| match (&err.title, &err.detail) {
                (Some(title), Some(detail)) => Some(format!("{title}: {detail}")),
                (Some(text), None) | (None, Some(text)) => Some(text.clone()),
                (None, None) => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Document<WorkspaceAttributes> {
    pub(super) fn into_workspace(self, organization: &str) -> Workspace {
        Workspace {
            id: self.data.id,
            organization: organization.to_owned(),
            name: self.data.attributes.name,
            working_directory: self.data.attributes.working_directory.unwrap_or_default(),
            auto_apply: self.data.attributes.auto_apply,
        }
    }
}

impl Document<ConfigurationVersionAttributes> {
    pub(super) fn into_configuration_version(self) -> ConfigurationVersion {
        let attributes = self.data.attributes;
        ConfigurationVersion {
            id: self.data.id,
            upload_url: attributes.upload_url.unwrap_or_default(),
            status: ConfigurationStatus::from(attributes.status),
            error: attributes.error,
            error_message: attributes.error_message,
        }
    }
}

impl Document<RunAttributes> {
    pub(super) fn into_run(self) -> Run {
        Run {
            id: self.data.id,
            status: RunStatus::from(self.data.attributes.status),
            has_changes: self.data.attributes.has_changes,
        }
    }
}

impl Document<StateVersionAttributes> {
    pub(super) fn into_state_version(self) -> Result<StateVersion, TfeError> {
        let download_url = self
            .data
            .attributes
            .hosted_state_download_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| TfeError::MissingField {
                resource: String::from("current state version"),
                field: "hosted-state-download-url",
            })?;
        Ok(StateVersion {
            id: self.data.id,
            download_url,
        })
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateBody<A, R> {
    pub(super) data: CreateData<A, R>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateData<A, R> {
    #[serde(rename = "type")]
    pub(super) kind: &'static str,
    pub(super) attributes: A,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) relationships: Option<R>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct CreateConfigurationVersionAttributes {
    pub(super) auto_queue_runs: bool,
    pub(super) speculative: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct CreateRunAttributes<'a> {
    pub(super) is_destroy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) target_addrs: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) replace_addrs: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct RunRelationships<'a> {
    pub(super) workspace: Relationship<'a>,
    pub(super) configuration_version: Relationship<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct Relationship<'a> {
    pub(super) data: ResourceIdentifier<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct ResourceIdentifier<'a> {
    #[serde(rename = "type")]
    pub(super) kind: &'static str,
    pub(super) id: &'a str,
}

/// Relationship-less create body.
pub(super) type NoRelationships = ();

pub(super) fn configuration_version_body(
    request: ConfigurationVersionRequest,
) -> CreateBody<CreateConfigurationVersionAttributes, NoRelationships> {
    CreateBody {
        data: CreateData {
            kind: "configuration-versions",
            attributes: CreateConfigurationVersionAttributes {
                auto_queue_runs: request.auto_queue_runs,
                speculative: request.speculative,
            },
            relationships: None,
        },
    }
}

pub(super) fn run_body(
    request: &RunRequest,
) -> CreateBody<CreateRunAttributes<'_>, RunRelationships<'_>> {
    CreateBody {
        data: CreateData {
            kind: "runs",
            attributes: CreateRunAttributes {
                is_destroy: request.is_destroy,
                message: request.message.as_deref(),
                target_addrs: request.target_addrs.as_deref(),
                replace_addrs: request.replace_addrs.as_deref(),
            },
            relationships: Some(RunRelationships {
                workspace: Relationship {
                    data: ResourceIdentifier {
                        kind: "workspaces",
                        id: &request.workspace_id,
                    },
                },
                configuration_version: Relationship {
                    data: ResourceIdentifier {
                        kind: "configuration-versions",
                        id: &request.configuration_version_id,
                    },
                },
            }),
        },
    }
}
