//! Error types for remote API calls.

use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised by a single remote API operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when the request never produced an HTTP response.
    #[error("{operation} failed: {message}")]
    Transport {
        /// Operation being attempted (for example `create inventory`).
        operation: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the server answers with a non-success status.
    #[error("{operation} rejected with status {status}: {body}")]
    Rejected {
        /// Operation being attempted.
        operation: String,
        /// HTTP status code returned by the server.
        status: u16,
        /// Raw response body kept for diagnostics.
        body: String,
    },
    /// Raised when a success response cannot be parsed or lacks an identifier.
    #[error("{operation} returned an unusable response ({message}): {body}")]
    Malformed {
        /// Operation being attempted.
        operation: String,
        /// Parser or validation message.
        message: String,
        /// Raw response body kept for diagnostics.
        body: String,
    },
    /// Raised when a named lookup exhausts the listing without a match.
    #[error("{resource} '{name}' not found; available: {}", .available.join(", "))]
    NotFound {
        /// Kind of record searched for (for example `credential type`).
        resource: String,
        /// Name that was looked up.
        name: String,
        /// Names seen while paginating, rendered as `name (ID: n)`.
        available: Vec<String>,
    },
    /// Raised when a prerequisite lookup fails inside a compound operation.
    #[error("{operation} failed: {source}")]
    Prerequisite {
        /// Operation that could not proceed.
        operation: String,
        /// Failure of the prerequisite call.
        #[source]
        source: Box<RemoteError>,
    },
    /// Raised when a bounded call does not finish within its grace period.
    #[error("{operation} did not finish within {}ms", .timeout.as_millis())]
    Deadline {
        /// Operation being attempted.
        operation: String,
        /// Grace period that elapsed.
        timeout: Duration,
    },
    /// Raised when the caller's cancellation token fired mid-call.
    #[error("operation cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Classifies the error.
    ///
    /// Transport, deadline, and prerequisite failures are all reported as
    /// [`ErrorKind::RemoteRejected`]; only a top-level lookup miss is
    /// [`ErrorKind::NotFound`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Transport { .. }
            | Self::Rejected { .. }
            | Self::Malformed { .. }
            | Self::Prerequisite { .. }
            | Self::Deadline { .. } => ErrorKind::RemoteRejected,
        }
    }

    /// Returns `true` when the error was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the HTTP status for [`RemoteError::Rejected`] errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
