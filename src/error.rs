//! Error taxonomy for job submission and result handling.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the aggregator, dispatcher and materializer.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The request never reached the server or never came back.
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("server rejected the request with status {status}")]
    Rejected { status: u16 },

    /// The body arrived but could not be decoded into a result.
    #[error("unusable response body: {reason}")]
    Materialize { reason: String },

    /// Writing a result to disk failed.
    #[error("failed to save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a media file from disk failed.
    #[error("failed to read {}: {source}", path.display())]
    MediaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job was cancelled before a response arrived.
    #[error("job cancelled")]
    Cancelled,

    /// Another job for the same operation is still pending.
    #[error("{operation} is already running")]
    AlreadyPending { operation: String },

    /// Invalid base URL or endpoint.
    #[error("invalid endpoint {url}: {reason}")]
    Endpoint { url: String, reason: String },
}

/// How a failure is surfaced to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport or server rejection: generic "operation failed" notice.
    OperationFailed,
    /// The request succeeded but the body was unusable.
    BadResult,
    /// Local save failed; the payload is still available.
    SaveFailed,
    /// User-initiated cancellation.
    Cancelled,
    /// Refused before anything was sent.
    Refused,
}

impl CaptureError {
    pub fn materialize(reason: impl Into<String>) -> Self {
        Self::Materialize {
            reason: reason.into(),
        }
    }

    /// Classify for user-facing reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::Rejected { .. } => FailureKind::OperationFailed,
            Self::Materialize { .. } => FailureKind::BadResult,
            Self::Save { .. } => FailureKind::SaveFailed,
            Self::Cancelled => FailureKind::Cancelled,
            Self::MediaRead { .. } | Self::AlreadyPending { .. } | Self::Endpoint { .. } => {
                FailureKind::Refused
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
