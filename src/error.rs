//! Error types for the extract-monster library.
//!
//! Two error types reflect the two layers of the node:
//!
//! * [`ExtractError`] — why a single unit of work failed (missing binary
//!   field, failed download, server-reported error, transport failure...).
//!   Returned directly by [`crate::client::ExtractClient`] and the pipeline
//!   stages, which know nothing about item positions.
//!
//! * [`NodeError`] — an [`ExtractError`] tagged with the index of the input
//!   item it came from. When continue-on-failure is disabled and one item
//!   fails, [`crate::execute::execute`] returns it inside [`RunAborted`]
//!   together with the records completed so far.
//!
//! With continue-on-failure enabled, the `Display` text of the
//! [`ExtractError`] becomes the `error` field of the substituted output record.

use crate::output::OutputRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Fixed diagnostic attached to every server-reported [`ExtractError::ApiError`].
pub const API_ERROR_HINT: &str =
    "Check your schema format and input data. Verify your API key is valid and has sufficient credits.";

/// Every reason a single extraction can fail.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The item carries no binary attachment under the configured field name.
    #[error("No binary data property \"{field}\" exists on item!")]
    MissingBinaryData { field: String },

    /// URL-mode download failed (transport error or non-2xx status).
    #[error("Failed to download file from URL: {reason}")]
    FileDownloadError { reason: String },

    /// Path-mode read failed.
    #[error("Failed to read file '{}': {reason}", path.display())]
    FileReadError { path: PathBuf, reason: String },

    // ── API errors ────────────────────────────────────────────────────────
    /// The service answered `{"status": "error"}`.
    #[error("The API returned an error: {code}")]
    ApiError { code: String },

    /// Non-2xx response whose body is not a recognisable error payload.
    #[error("Request failed with status code {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// A 2xx response whose body is not valid JSON.
    #[error("Invalid response from API: {0}")]
    InvalidResponse(String),

    /// The credential probe (`GET /me`) did not succeed.
    #[error("API key was rejected (status {status})")]
    CredentialRejected { status: u16 },

    /// Network-level failure reported by the HTTP collaborator, unmodified.
    #[error(transparent)]
    Transport(#[from] TransportError),

    // ── Configuration errors ──────────────────────────────────────────────
    /// No API key is available.
    #[error("No Extract Monster API key configured")]
    MissingCredentials,

    /// A required node parameter was not supplied.
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    /// A node parameter has a value of the wrong shape.
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExtractError {
    /// Extra guidance shown alongside the message, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ExtractError::ApiError { .. } => Some(API_ERROR_HINT),
            _ => None,
        }
    }

    /// True when the HTTP collaborator gave up waiting for a response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExtractError::Transport(e) if e.timeout)
    }

    pub(crate) fn missing_parameter(name: &str) -> Self {
        ExtractError::MissingParameter {
            name: name.to_string(),
        }
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        ExtractError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A failure raised by an [`crate::transport::HttpTransport`].
///
/// The message is passed through untouched so callers see exactly what the
/// transport reported.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// True when the failure was a timeout imposed by the transport.
    pub timeout: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            message: e.to_string(),
            timeout: e.is_timeout(),
        }
    }
}

/// An [`ExtractError`] attributed to the input item that produced it.
#[derive(Debug, Error)]
#[error("Item {item_index}: {source}")]
pub struct NodeError {
    pub item_index: usize,
    #[source]
    pub source: ExtractError,
}

impl NodeError {
    pub fn new(item_index: usize, source: ExtractError) -> Self {
        Self { item_index, source }
    }

    /// The underlying message without the item prefix.
    pub fn message(&self) -> String {
        self.source.to_string()
    }
}

/// A run stopped by an item failure while continue-on-failure was off.
///
/// Records produced before the failing item are kept in `completed`.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunAborted {
    #[source]
    pub error: NodeError,
    pub completed: Vec<OutputRecord>,
}

impl RunAborted {
    pub fn item_index(&self) -> usize {
        self.error.item_index
    }
}
