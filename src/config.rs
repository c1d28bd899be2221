//! Configuration loading via `ortho-config`.

use std::env;
use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::run::{DEFAULT_HOSTNAME, RunKind, RunOptions, UnknownRunKind};

/// Inputs for a single run, derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "TFE_RUN",
    discovery(
        app_name = "tfe-run",
        env_var = "TFE_RUN_CONFIG_PATH",
        config_file_name = "tfe-run.toml",
        dotfile_name = ".tfe-run.toml",
        project_file_name = "tfe-run.toml"
    )
)]
pub struct ActionConfig {
    /// User or team API token. Organisation tokens cannot upload
    /// configuration. This value is required.
    #[ortho_config(default = String::new())]
    #[serde(deserialize_with = "scalar_string")]
    pub token: String,
    /// Organisation that owns the workspace. This value is required.
    #[ortho_config(default = String::new())]
    #[serde(deserialize_with = "scalar_string")]
    pub organization: String,
    /// Workspace name. This value is required.
    #[ortho_config(default = String::new())]
    #[serde(deserialize_with = "scalar_string")]
    pub workspace: String,
    /// Terraform Cloud or Enterprise host. Defaults to `app.terraform.io`.
    #[ortho_config(default = DEFAULT_HOSTNAME.to_owned())]
    #[serde(deserialize_with = "scalar_string")]
    pub hostname: String,
    /// Optional run title.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub message: Option<String>,
    /// Directory to upload. Defaults to the current directory.
    #[ortho_config(default = "./".to_owned())]
    #[serde(deserialize_with = "scalar_string")]
    pub directory: String,
    /// `plan`, `apply` or `destroy`. Defaults to `apply`.
    #[ortho_config(default = "apply".to_owned())]
    #[serde(deserialize_with = "scalar_string")]
    pub run_type: String,
    /// Newline separated resource addresses to target.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub targets: Option<String>,
    /// Newline separated resource addresses to replace.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub replacements: Option<String>,
    /// Whether to wait for the run to finish. Unset means `true`; runs that
    /// need a manual confirmation are never waited on.
    pub wait_for_completion: Option<bool>,
    /// Contents of a temporary `run.auto.tfvars` file.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub tf_vars: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

/// Splits a newline separated address list, dropping blank lines.
#[must_use]
pub fn split_addresses(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

/// Environment variables holding free-form text, in field order.
const RAW_TEXT_VARIABLES: [&str; 10] = [
    "TFE_RUN_TOKEN",
    "TFE_RUN_ORGANIZATION",
    "TFE_RUN_WORKSPACE",
    "TFE_RUN_HOSTNAME",
    "TFE_RUN_DIRECTORY",
    "TFE_RUN_RUN_TYPE",
    "TFE_RUN_MESSAGE",
    "TFE_RUN_TARGETS",
    "TFE_RUN_REPLACEMENTS",
    "TFE_RUN_TF_VARS",
];

fn render_scalar(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Accepts any scalar for a text field. The layered loader types values
/// such as `42` or `true` before they reach this struct.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(render_scalar)
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .filter(|value| !value.is_null())
        .map(render_scalar))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| !text.trim().is_empty())
        .map(str::to_owned)
}

impl ActionConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to tfe-run.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_iter([OsString::from("tfe-run")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_raw_text(|key| env::var(key).ok());
        Ok(config)
    }

    /// Replaces text fields with the verbatim value of their environment
    /// variable, when set and non-empty. Values such as `[1, 2]` or `1e3`
    /// otherwise come back re-rendered from their typed form.
    fn apply_raw_text(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let [
            token,
            organization,
            workspace,
            hostname,
            directory,
            run_type,
            message,
            targets,
            replacements,
            tf_vars,
        ] = RAW_TEXT_VARIABLES.map(|key| lookup(key).filter(|value| !value.is_empty()));

        for (value, field) in [
            (token, &mut self.token),
            (organization, &mut self.organization),
            (workspace, &mut self.workspace),
            (hostname, &mut self.hostname),
            (directory, &mut self.directory),
            (run_type, &mut self.run_type),
        ] {
            if let Some(raw) = value {
                *field = raw;
            }
        }
        for (value, field) in [
            (message, &mut self.message),
            (targets, &mut self.targets),
            (replacements, &mut self.replacements),
            (tf_vars, &mut self.tf_vars),
        ] {
            if value.is_some() {
                *field = value;
            }
        }
    }

    /// Whether the run should be waited on. Defaults to `true`.
    #[must_use]
    pub const fn waits_for_completion(&self) -> bool {
        !matches!(self.wait_for_completion, Some(false))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values via environment variables or configuration
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidRunType`] when the run type is unknown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.token,
            &FieldMetadata::new("Terraform Cloud API token", "TFE_RUN_TOKEN", "token"),
        )?;
        Self::require_field(
            &self.organization,
            &FieldMetadata::new("organization", "TFE_RUN_ORGANIZATION", "organization"),
        )?;
        Self::require_field(
            &self.workspace,
            &FieldMetadata::new("workspace name", "TFE_RUN_WORKSPACE", "workspace"),
        )?;
        Self::require_field(
            &self.hostname,
            &FieldMetadata::new("hostname", "TFE_RUN_HOSTNAME", "hostname"),
        )?;
        self.run_kind()?;
        Ok(())
    }

    /// Parses the configured run type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRunType`] for anything other than
    /// `plan`, `apply` or `destroy`.
    pub fn run_kind(&self) -> Result<RunKind, ConfigError> {
        Ok(self.run_type.trim().parse::<RunKind>()?)
    }

    /// Builds the run options described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRunType`] when the run type is unknown.
    pub fn run_options(&self) -> Result<RunOptions, ConfigError> {
        let directory = self.directory.trim();
        Ok(RunOptions {
            message: non_empty(self.message.as_deref()),
            directory: (!directory.is_empty()).then(|| Utf8PathBuf::from(directory)),
            kind: self.run_kind()?,
            target_addrs: split_addresses(self.targets.as_deref()),
            replace_addrs: split_addresses(self.replacements.as_deref()),
            wait_for_completion: self.waits_for_completion(),
            variables: non_empty(self.tf_vars.as_deref()),
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Indicates the run type is not supported.
    #[error(transparent)]
    InvalidRunType(#[from] UnknownRunKind),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> ActionConfig {
        ActionConfig {
            token: String::from("user-token"),
            organization: String::from("acme"),
            workspace: String::from("networking"),
            hostname: String::from(DEFAULT_HOSTNAME),
            message: None,
            directory: String::from("./"),
            run_type: String::from("apply"),
            targets: None,
            replacements: None,
            wait_for_completion: None,
            tf_vars: None,
        }
    }

    #[rstest]
    #[case(None, Vec::new())]
    #[case(Some(""), Vec::new())]
    #[case(Some("\n  \n"), Vec::new())]
    #[case(
        Some("aws_instance.web\n\n module.db \n"),
        vec![String::from("aws_instance.web"), String::from("module.db")]
    )]
    fn addresses_split_on_newlines(#[case] raw: Option<&str>, #[case] expected: Vec<String>) {
        assert_eq!(split_addresses(raw), expected);
    }

    #[rstest]
    fn run_options_normalise_blank_inputs(mut config: ActionConfig) {
        config.message = Some(String::from("  "));
        config.tf_vars = Some(String::new());
        config.targets = Some(String::from("\n"));

        let options = config.run_options().expect("options should build");

        assert_eq!(options.message, None);
        assert_eq!(options.variables, None);
        assert!(options.target_addrs.is_empty());
        assert_eq!(options.kind, RunKind::Apply);
    }

    #[rstest]
    fn run_options_carry_every_input(mut config: ActionConfig) {
        config.message = Some(String::from("ci run"));
        config.directory = String::from("infra");
        config.run_type = String::from("destroy");
        config.replacements = Some(String::from("aws_instance.web"));
        config.wait_for_completion = Some(false);
        config.tf_vars = Some(String::from("region = \"eu\""));

        let options = config.run_options().expect("options should build");

        assert_eq!(
            options,
            RunOptions {
                message: Some(String::from("ci run")),
                directory: Some(Utf8PathBuf::from("infra")),
                kind: RunKind::Destroy,
                target_addrs: Vec::new(),
                replace_addrs: vec![String::from("aws_instance.web")],
                wait_for_completion: false,
                variables: Some(String::from("region = \"eu\"")),
            }
        );
    }

    #[rstest]
    fn unknown_run_type_is_a_configuration_error(mut config: ActionConfig) {
        config.run_type = String::from("refresh");

        let err = config.validate().expect_err("unknown type should fail");

        assert_eq!(
            err.to_string(),
            "type \"refresh\" is not supported, must be plan, apply or destroy"
        );
    }

    #[rstest]
    #[case::token("TFE_RUN_TOKEN", "token")]
    #[case::organization("TFE_RUN_ORGANIZATION", "organization")]
    #[case::workspace("TFE_RUN_WORKSPACE", "workspace")]
    fn missing_required_fields_are_actionable(
        mut config: ActionConfig,
        #[case] env_var: &str,
        #[case] toml_key: &str,
    ) {
        match toml_key {
            "token" => config.token.clear(),
            "organization" => config.organization.clear(),
            _ => config.workspace.clear(),
        }

        let message = config
            .validate()
            .expect_err("missing field should fail")
            .to_string();

        assert!(message.contains(env_var), "message: {message}");
        assert!(message.contains(toml_key), "message: {message}");
        assert!(message.contains("tfe-run.toml"), "message: {message}");
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some(true), true)]
    #[case(Some(false), false)]
    fn unset_wait_flag_means_waiting(
        mut config: ActionConfig,
        #[case] flag: Option<bool>,
        #[case] expected: bool,
    ) {
        config.wait_for_completion = flag;

        let options = config.run_options().expect("options should build");

        assert_eq!(options.wait_for_completion, expected);
    }

    #[test]
    fn typed_scalars_are_read_as_text() {
        let config: ActionConfig = serde_json::from_value(serde_json::json!({
            "token": "user-token",
            "organization": "acme",
            "workspace": 2024,
            "hostname": "app.terraform.io",
            "message": 42,
            "directory": "./",
            "run_type": "apply",
            "tf_vars": [1, 2],
            "wait_for_completion": true
        }))
        .expect("scalars should deserialise");

        assert_eq!(config.workspace, "2024");
        assert_eq!(config.message.as_deref(), Some("42"));
        assert_eq!(config.tf_vars.as_deref(), Some("[1,2]"));
        assert_eq!(config.targets, None);
    }

    #[rstest]
    fn raw_environment_text_replaces_typed_values(mut config: ActionConfig) {
        config.message = Some(String::from("1000.0"));
        config.tf_vars = Some(String::from("[1,2]"));

        config.apply_raw_text(|key| match key {
            "TFE_RUN_MESSAGE" => Some(String::from("1e3")),
            "TFE_RUN_TF_VARS" => Some(String::from("[1, 2]")),
            "TFE_RUN_WORKSPACE" => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.message.as_deref(), Some("1e3"));
        assert_eq!(config.tf_vars.as_deref(), Some("[1, 2]"));
        assert_eq!(config.workspace, "networking");
        assert_eq!(config.token, "user-token");
    }
}
