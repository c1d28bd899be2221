//! Error types for the Terraform Cloud client.

use thiserror::Error;

use crate::api::{ApiError, RemoteError};
use crate::process::ProcessError;

/// Errors raised by [`super::TfeClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TfeError {
    /// Raised when the client cannot be constructed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error(transparent)]
    Validation(#[from] ApiError),
    /// Raised when the service answers 404.
    #[error("{resource} not found")]
    NotFound {
        /// Resource that was requested.
        resource: String,
    },
    /// Raised when the service rejects the token.
    #[error("unauthorized: check that the API token is valid")]
    Unauthorized,
    /// Raised for any other non-success status.
    #[error("request for {resource} failed with status {status}: {message}")]
    Http {
        /// Resource that was requested.
        resource: String,
        /// HTTP status code.
        status: u16,
        /// Error details reported by the service.
        message: String,
    },
    /// Raised when the request could not be sent or the body not read.
    #[error("request for {resource} failed: {message}")]
    Transport {
        /// Resource that was requested.
        resource: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("could not decode {resource}: {message}")]
    Decode {
        /// Resource that was requested.
        resource: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when a response lacks a field the client needs.
    #[error("{resource} response is missing {field}")]
    MissingField {
        /// Resource that was requested.
        resource: String,
        /// Missing attribute.
        field: &'static str,
    },
    /// Raised when the configuration archive cannot be built.
    #[error("could not package configuration: {0}")]
    Archive(String),
}

impl From<ProcessError> for TfeError {
    fn from(err: ProcessError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl RemoteError for TfeError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
