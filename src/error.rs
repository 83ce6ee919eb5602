//! Error types.
//!
//! Failures are tiered the way a run reacts to them: a [`Error::Container`]
//! aborts the run, everything else is logged and the traversal moves on to
//! the next folder, message or attachment.

use std::io;
use std::path::PathBuf;

/// Failures reported by a message store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored message could not be parsed.
    #[error("cannot parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The external extraction tool failed.
    #[error("extraction failed: {0}")]
    Extract(String),

    /// The backend refused the request.
    #[error("{0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while writing a record, an attachment or the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl ExportError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Why a single message could not be processed.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Tiered pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The container cannot be opened. Fatal.
    #[error("cannot open container {}: {source}", path.display())]
    Container {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    /// A folder's contents cannot be enumerated.
    #[error("folder `{folder}`: {source}")]
    Folder {
        folder: String,
        #[source]
        source: StoreError,
    },

    /// One message failed to load, match or export.
    #[error("message #{seq}: {source}")]
    Message {
        seq: u64,
        #[source]
        source: MessageError,
    },

    /// One attachment failed to read or write.
    #[error("attachment {index} of message #{seq}: {source}")]
    Attachment {
        seq: u64,
        index: usize,
        #[source]
        source: ExportError,
    },
}
