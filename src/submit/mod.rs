//! Submission to the backend and completion tracking.
//!
//! [`SubmissionClient`] performs single bounded HTTP calls over an
//! injectable [`HttpTransport`]. [`CompletionTracker`] composes those calls
//! into the submit, poll, report-fetch lifecycle and persists every step
//! through a [`SubmissionStore`].
//!
//! ```no_run
//! use otm_invoice::core::*;
//! use otm_invoice::submit::*;
//! use serde_json::json;
//!
//! let config = OtmConfigBuilder::new("https://otm.example.com", "INTL.INT01", "secret").build();
//! let client = SubmissionClient::from_config(config)?;
//! let tracker = CompletionTracker::new(client, InMemoryStore::new());
//!
//! let record = tracker.submit(
//!     InvoiceInput::Object(json!({"invoiceNumber": "100", "amount": "42.00"})),
//!     SubmissionFormat::Json,
//!     None,
//! )?;
//! println!("{} -> {}", record.identity.invoice_xid, record.status);
//! # Ok::<(), SubmitError>(())
//! ```

mod client;
mod error;
mod store;
mod tracker;
mod transport;

pub use client::{
    JSON_ACCEPT, JSON_CONTENT_TYPE, JsonAck, NO_TRANSMISSION, SubmissionClient, UNKNOWN,
    XML_CONTENT_TYPE, XmlAck,
};
pub use error::SubmitError;
pub use store::{InMemoryStore, SubmissionStore};
pub use tracker::{CompletionTracker, InvoiceInput, RetryPolicy, Sleeper, ThreadSleeper};
pub use reqwest::Method;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
