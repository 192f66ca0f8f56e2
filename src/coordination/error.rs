//! Coordination store error types

use thiserror::Error;

/// How the pipeline should treat a store error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; the pipeline continues
    Recoverable,
    /// Halts the pipeline
    Fatal,
}

/// etcd error code for a missing key
pub const ETCD_KEY_NOT_FOUND: u64 = 100;
/// etcd error code for a path that is not a file
pub const ETCD_NOT_FILE: u64 = 102;
/// etcd error code for an existing key
pub const ETCD_NODE_EXIST: u64 = 105;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected before any request was made
    #[error("invalid store path '{0}'")]
    InvalidPath(String),

    /// A lease that could never stay fresh
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Transport failures or HTTP 500 outlasted the retry policy
    #[error("could not reach the store after {attempts} attempts: {message}")]
    Connection { attempts: usize, message: String },

    #[error("unhandled HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("store error {code}: {message} ({cause})")]
    Api {
        code: u64,
        message: String,
        cause: String,
    },

    #[error("malformed store response: {0}")]
    Decode(String),

    #[error("invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The watch stream or store was shut down
    #[error("store closed")]
    Closed,
}

impl StoreError {
    pub fn severity(&self) -> Severity {
        match self {
            StoreError::AlreadyExists(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
