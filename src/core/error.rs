use thiserror::Error;

/// Errors that can occur while building or serializing a canonical invoice.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvoiceError {
    /// The input batch held no rows to build an invoice from.
    #[error("empty batch: no rows to build an invoice from")]
    EmptyBatch,

    /// Builder received input it cannot turn into an invoice.
    #[error("builder error: {0}")]
    Builder(String),

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON generation or parsing error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for InvoiceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
