//! Reads output values from a workspace's current state.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::api::{RemoteApi, Workspace};

/// Errors raised while fetching outputs.
#[derive(Debug, Error)]
pub enum OutputError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the current state version cannot be read.
    #[error("could not read current state version: {0}")]
    ReadStateVersion(#[source] E),
    /// Raised when the state document cannot be downloaded.
    #[error("could not download state version {id}: {source}")]
    Download {
        /// State version identifier.
        id: String,
        /// Client error.
        #[source]
        source: E,
    },
    /// Raised when the state document is not valid JSON.
    #[error("could not decode state: {0}")]
    Parse(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StateDocument {
    #[serde(default)]
    outputs: BTreeMap<String, StateOutput>,
}

#[derive(Debug, Deserialize)]
struct StateOutput {
    #[serde(default)]
    value: Value,
}

/// Extracts output values from a raw state document.
///
/// String values are returned as-is; any other value is rendered as compact
/// JSON. Everything other than `outputs` is ignored.
///
/// # Errors
///
/// Returns the decoding error when `raw` is not a JSON state document.
pub fn parse_outputs(raw: &[u8]) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let document: StateDocument = serde_json::from_slice(raw)?;
    Ok(document
        .outputs
        .into_iter()
        .map(|(name, output)| (name, render_value(output.value)))
        .collect())
}

fn render_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Reads the workspace's current state and returns its outputs by name.
///
/// # Errors
///
/// Each failing step is wrapped in the matching [`OutputError`] variant;
/// nothing is retried.
pub async fn fetch_outputs<A>(
    api: &A,
    workspace: &Workspace,
) -> Result<BTreeMap<String, String>, OutputError<A::Error>>
where
    A: RemoteApi,
{
    let version = api
        .read_current_state_version(workspace)
        .await
        .map_err(OutputError::ReadStateVersion)?;
    let raw = api
        .download_state(&version)
        .await
        .map_err(|source| OutputError::Download {
            id: version.id.clone(),
            source,
        })?;
    parse_outputs(&raw).map_err(OutputError::Parse)
}
