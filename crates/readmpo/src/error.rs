//! Error types for MPO reading

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for MPO reading operations
pub type Result<T> = std::result::Result<T, ReadMpoError>;

/// Errors that can occur while opening, validating, decoding or assembling an MPO
#[derive(Error, Debug)]
pub enum ReadMpoError {
    /// The container is missing, unreadable, or lacks a requested group/dataset/attribute
    #[error("Container error at '{}': {message}", .path.display())]
    Container {
        /// File or in-container path the error refers to
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// The container layout does not match the MPO schema
    #[error("Schema error{}: {message}", fmt_site(.site))]
    Schema {
        /// Offending site, or `None` for root-level problems
        site: Option<usize>,
        /// Description of the mismatch
        message: String,
    },

    /// A payload could not be materialized as a tensor core
    #[error("Decode error{}: {message}", fmt_site(.site))]
    Decode {
        /// Offending site, if known
        site: Option<usize>,
        /// Description of the failure
        message: String,
    },

    /// Decoded neighbouring cores disagree on their shared bond
    #[error("Bond dimension mismatch at boundary {boundary}: left core has right_dim={left_right}, right core has left_dim={right_left}")]
    Consistency {
        /// Boundary index (between site `boundary` and `boundary + 1`)
        boundary: usize,
        /// Right bond dimension of the left core
        left_right: usize,
        /// Left bond dimension of the right core
        right_left: usize,
    },

    /// A chain end carries an open bond (dimension other than 1)
    #[error("Invalid boundary: {side} bond of site {site} has dimension {dim}, expected 1")]
    InvalidBoundary {
        /// Site at the chain end
        site: usize,
        /// `"left"` or `"right"`
        side: &'static str,
        /// Offending dimension
        dim: usize,
    },

    /// The operation is not allowed in the reader's current state
    #[error("Invalid state: cannot {operation} while {state}")]
    State {
        /// The attempted operation
        operation: &'static str,
        /// The state the reader was in
        state: &'static str,
    },

    /// A site index outside the chain was requested
    #[error("Site {site} is out of range (chain has {n_sites} sites)")]
    SiteOutOfRange {
        /// Requested site
        site: usize,
        /// Number of sites
        n_sites: usize,
    },

    /// I/O failure outside the HDF5 library (stock dumps, glob expansion)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error category, used by the C API to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`ReadMpoError::Container`] and [`ReadMpoError::Io`]
    Container,
    /// See [`ReadMpoError::Schema`]
    Schema,
    /// See [`ReadMpoError::Decode`]
    Decode,
    /// See [`ReadMpoError::Consistency`] and [`ReadMpoError::InvalidBoundary`]
    Consistency,
    /// See [`ReadMpoError::State`]
    State,
    /// See [`ReadMpoError::SiteOutOfRange`]
    OutOfRange,
}

fn fmt_site(site: &Option<usize>) -> String {
    match site {
        Some(s) => format!(" at site {}", s),
        None => String::new(),
    }
}

impl ReadMpoError {
    pub(crate) fn container(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Container {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(site: Option<usize>, message: impl Into<String>) -> Self {
        Self::Schema {
            site,
            message: message.into(),
        }
    }

    pub(crate) fn decode(site: Option<usize>, message: impl Into<String>) -> Self {
        Self::Decode {
            site,
            message: message.into(),
        }
    }

    /// Attach `site` to a decode error that does not name one yet.
    pub(crate) fn at_site(self, site: usize) -> Self {
        match self {
            Self::Decode { site: None, message } => Self::Decode {
                site: Some(site),
                message,
            },
            other => other,
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Container { .. } | Self::Io(_) => ErrorKind::Container,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Consistency { .. } | Self::InvalidBoundary { .. } => ErrorKind::Consistency,
            Self::State { .. } => ErrorKind::State,
            Self::SiteOutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }

    /// Site the error refers to, when there is one.
    pub fn site(&self) -> Option<usize> {
        match self {
            Self::Schema { site, .. } | Self::Decode { site, .. } => *site,
            Self::Consistency { boundary, .. } => Some(*boundary),
            Self::InvalidBoundary { site, .. } | Self::SiteOutOfRange { site, .. } => Some(*site),
            _ => None,
        }
    }

    /// Whether the failed operation may succeed when retried on the same handle
    /// (for instance after fixing the root group).
    ///
    /// Decode and consistency failures mean the stored data itself is unusable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Decode { .. } | Self::Consistency { .. } | Self::InvalidBoundary { .. }
        )
    }
}
