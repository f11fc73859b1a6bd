//! Error types and result types for repository operations.
//!
//! Every fallible operation in this workspace returns [`RepositoryResult<T>`].
//! Errors are never retried by the repository; they are handed back to the caller as-is.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with a repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A CRUD operation was issued before `connect()` completed.
    #[error("Connection not ready: the repository was accessed before the connection was completed")]
    NotReady,
    /// `connect()` was called on a repository that has already been disconnected.
    #[error("Repository is closed: reconnecting after disconnect is not supported")]
    Closed,
    /// No document matched the lookup.
    #[error("{0}")]
    NotFound(String),
    /// Serialization/deserialization error when converting between objects and documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error while establishing the connection.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The document has an invalid structure (for example, it did not serialize to a map).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A write violated a unique index.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    /// An index could not be created.
    #[error("Index error: {0}")]
    Index(String),
    /// The connection options could not be loaded or are inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// An error reported by the underlying document store client.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<BsonError> for RepositoryError {
    fn from(err: BsonError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RepositoryError {
    fn from(err: toml::de::Error) -> Self {
        RepositoryError::Configuration(err.to_string())
    }
}
