//! XML transmission channel.
//!
//! Renders a [`CanonicalInvoice`](crate::core::CanonicalInvoice) as a
//! namespaced `Transmission` document for the backend's integration
//! servlet, builds the `sql2xml` status and log queries, and parses what
//! the backend sends back.
//!
//! # Example
//!
//! ```
//! use otm_invoice::core::*;
//! use otm_invoice::transmission;
//! use serde_json::json;
//!
//! let rows = vec![
//!     json!({"INVOICE_XID": "INV1", "INVOICE_NUM": "100", "AMOUNT": "10.00"}),
//!     json!({"INVOICE_XID": "INV1", "INVOICE_NUM": "100", "AMOUNT": "5.50"}),
//! ];
//! let rows: Vec<Row> = rows.into_iter().filter_map(|v| v.as_object().cloned()).collect();
//! let invoice = CanonicalInvoiceBuilder::default().from_rows(&rows, None).unwrap();
//!
//! let xml = transmission::to_transmission_xml(&invoice).unwrap();
//! let summary = transmission::read_invoice_summary(&xml.text).unwrap();
//! assert_eq!(summary.invoice_xid.as_deref(), Some("INV1"));
//! assert_eq!(summary.line_count, 2);
//! assert_eq!(summary.total, Some(rust_decimal::Decimal::new(155, 1)));
//! ```

mod bridge;
mod envelope;
mod response;
pub(crate) mod xml_utils;

pub use bridge::{log_query, status_query};
pub use envelope::{TransmissionXml, to_transmission_xml, to_transmission_xml_at};
pub use response::{
    InvoiceSummary, LogRow, parse_log_rows, parse_status, parse_transmission_ack,
    read_invoice_summary,
};

/// Transmission document namespace.
pub const NS: &str = "http://xmlns.oracle.com/apps/otm/transmission/v6.4";

/// Schema version stamped into the transmission header.
pub const VERSION: &str = "25c";

/// `GLogXMLElementName` of an invoice transmission.
pub const ELEMENT_NAME: &str = "INVOICE";

/// Insert-or-update transaction code.
pub const TRANSACTION_CODE: &str = "IU";

/// Qualifier of the invoice-level reference number.
pub const INVOICE_REFNUM_QUALIFIER: &str = "BM";

/// Qualifier of line item reference numbers.
pub const LINE_REFNUM_QUALIFIER: &str = "GLOG";

/// Service provider alias qualifier.
pub const ALIAS_QUALIFIER: &str = "GLOG";

/// `WRITTEN_BY` value of integration log rows.
pub const LOG_WRITTEN_BY: &str = "INTEGRATION";
