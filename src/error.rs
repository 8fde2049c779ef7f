//! Error types for datastore-dl
//!
//! This module provides the error taxonomy for the library:
//! - `AuthError` — token exchange failures, fatal to the run when they occur
//!   at startup
//! - `FetchError` — per-attempt download failures, recovered via retry inside
//!   a worker
//! - `ExtractError` — archive post-processing failures, terminal for one
//!   product but never for the worker

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for datastore-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for datastore-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Token exchange or credential error
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Download attempt error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Token exchange errors
///
/// An `AuthError` at startup aborts the whole run before any download
/// begins. During background refresh it terminates the refresher (fail-stop);
/// workers then observe a stale token and their requests start failing with
/// authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Client id or secret was empty
    #[error("missing credentials: client id and secret are both required")]
    MissingCredentials,

    /// Transport-level failure reaching the token endpoint
    #[error("token endpoint unreachable: {0}")]
    Network(#[source] reqwest::Error),

    /// Token endpoint answered with a non-success status
    #[error("token endpoint returned {status}")]
    Status {
        /// HTTP status code from the token endpoint
        status: reqwest::StatusCode,
    },

    /// Response body could not be parsed into a credential
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// Per-attempt download errors
///
/// Every variant is transient from the worker's point of view: the partial
/// file is removed and the attempt is repeated with a freshly read token.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, reset, body read)
    #[error("network failure for {url}: {source}")]
    Network {
        /// The product URL that failed
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status from the product endpoint
    #[error("{url} returned {status}")]
    Status {
        /// The product URL that failed
        url: String,
        /// HTTP status code returned by the server
        status: reqwest::StatusCode,
    },

    /// Writing the response body to the local archive failed
    #[error("failed to write {path}: {source}")]
    Write {
        /// Local archive path being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive's member directory could not be read
    #[error("corrupt archive {archive}: {reason}")]
    CorruptArchive {
        /// Path to the unreadable archive
        archive: PathBuf,
        /// Why the archive could not be read
        reason: String,
    },

    /// A member could not be written to the target directory
    #[error("failed to write extracted member {path}: {source}")]
    Write {
        /// Destination path of the member being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
