use thiserror::Error;

use crate::core::{InvoiceError, RecordId};

/// Errors raised while submitting invoices and tracking their completion.
///
/// Status and log query failures never escape a
/// [`CompletionTracker`](super::CompletionTracker) operation; they are
/// logged and degrade into recorded state. Resource reads and updates
/// surface every failure, a non-JSON body as
/// [`MalformedAcknowledgment`](Self::MalformedAcknowledgment).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmitError {
    /// Building or serializing the invoice failed.
    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    /// The backend refused the submission.
    #[error("submission rejected with HTTP {status}: {body}")]
    SubmissionRejected { status: u16, body: String },

    /// The backend refused a read or update of an invoice resource.
    #[error("resource request failed with HTTP {status}: {body}")]
    ResourceRequest { status: u16, body: String },

    /// The acknowledgment carried no usable transmission reference.
    #[error("malformed acknowledgment: {0}")]
    MalformedAcknowledgment(String),

    /// The status or log bridge was unreachable or answered garbage.
    #[error("status query failed: {0}")]
    StatusQuery(String),

    /// Every error report fetch came back empty.
    #[error("error report unavailable after {attempts} attempts")]
    ErrorReportUnavailable { attempts: u32 },

    /// The HTTP call itself failed (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The record store failed.
    #[error("store error: {0}")]
    Store(String),

    #[error("submission record {0} not found")]
    NotFound(RecordId),
}

/// Result alias for submission operations.
pub type Result<T> = std::result::Result<T, SubmitError>;
