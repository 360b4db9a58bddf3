//! Error types for metabridge-core

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::EntityKind;

/// Result type alias for metabridge-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in metabridge-core
///
/// Per-entity problems (unknown handle, rejected value, unparseable color)
/// are not errors: they are recorded in the import and tag reports. Only
/// connection-level and file-level failures surface through this type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// The store rejected the access token
    #[error("authentication failed for {shop} (HTTP {status}): {message}")]
    Auth {
        /// Shop domain
        shop: String,
        /// HTTP status returned (200 when reported inside a GraphQL body)
        status: u16,
        /// Response detail
        message: String,
    },

    /// A transient failure kept recurring past the retry budget
    #[error("{operation}: giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// GraphQL operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Reason of the last failed attempt
        last: String,
    },

    /// Non-retryable HTTP status
    #[error("{operation}: HTTP {status}: {body}")]
    Http {
        /// GraphQL operation name
        operation: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Non-retryable GraphQL error
    #[error("{operation}: GraphQL error: {}", messages.join("; "))]
    GraphQl {
        /// GraphQL operation name
        operation: String,
        /// Error messages returned by the API
        messages: Vec<String>,
    },

    /// The response did not have the expected shape
    #[error("{operation}: unexpected response: {message}")]
    UnexpectedResponse {
        /// GraphQL operation name
        operation: String,
        /// What was missing or malformed
        message: String,
    },

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Pagination over a store was interrupted; nothing was written
    #[error("export of {kind} interrupted after {fetched} entities: {source}")]
    PartialExport {
        /// Entity kind being exported
        kind: EntityKind,
        /// Entities fetched before the failure (discarded)
        fetched: usize,
        /// Error that interrupted pagination
        #[source]
        source: Box<Error>,
    },

    /// Export document could not be parsed
    #[error("malformed export file {}: {message}", path.display())]
    MalformedInput {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Whether this error must abort the whole run.
    ///
    /// Importer and tagger record non-fatal errors against the entity they
    /// were processing and move on.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Http { .. } | Error::GraphQl { .. } | Error::UnexpectedResponse { .. }
        )
    }
}
