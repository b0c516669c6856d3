//! Error types for store and resolution operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::dns::record::RecordType;

/// Errors surfaced by the record store and its collaborators.
///
/// Validation, policy, and capacity errors are reported synchronously to the
/// mutating caller and leave the index unchanged. Persistence errors are
/// reported to the caller after the in-memory mutation has been applied; the
/// on-disk file catches up on the next successful persist or reload.
#[derive(Debug)]
pub enum StoreError {
    /// A record failed validation before reaching the index.
    Validation(String),
    /// The active sync policy forbids this mutation.
    PolicyDenied {
        operation: &'static str,
        name: String,
        rtype: Option<RecordType>,
    },
    /// A new insert would exceed the configured record limit.
    CapacityExceeded { limit: usize },
    /// Filesystem failure during a durable write or initial load.
    Persistence(io::Error),
    /// JSON (de)serialization failure.
    Serialization(serde_json::Error),
    /// A sync policy string that is not one of the known spellings.
    UnknownPolicy(String),
    /// A record type string outside the supported set.
    UnknownType(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Validation(reason) => write!(f, "invalid record: {}", reason),
            StoreError::PolicyDenied {
                operation,
                name,
                rtype,
            } => match rtype {
                Some(t) => write!(
                    f,
                    "cannot {} record {} (type {}): denied by sync policy",
                    operation, name, t
                ),
                None => write!(
                    f,
                    "cannot {} records for {}: denied by sync policy",
                    operation, name
                ),
            },
            StoreError::CapacityExceeded { limit } => {
                write!(f, "record limit of {} reached", limit)
            }
            StoreError::Persistence(e) => write!(f, "persistence error: {}", e),
            StoreError::Serialization(e) => write!(f, "serialization error: {}", e),
            StoreError::UnknownPolicy(s) => write!(
                f,
                "unknown sync policy {:?}: valid values are sync, crud, create-only, update-only, upsert-only",
                s
            ),
            StoreError::UnknownType(s) => write!(f, "unsupported record type {:?}", s),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Persistence(e) => Some(e),
            StoreError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Persistence(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl StoreError {
    /// True for errors a caller should treat as a rejected request rather
    /// than a server-side failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StoreError::Validation(_)
                | StoreError::PolicyDenied { .. }
                | StoreError::CapacityExceeded { .. }
                | StoreError::UnknownPolicy(_)
                | StoreError::UnknownType(_)
        )
    }
}
