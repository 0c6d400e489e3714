//! REST resource JSON document for the backend's `invoices` endpoint.
//!
//! Unlike the XML transmission this document is schema-permissive: input
//! keys the builder did not consume are passed through, except for the
//! [`RESERVED_KEYS`], and empty values are dropped before transmission.
//!
//! # Example
//!
//! ```
//! use otm_invoice::core::*;
//! use otm_invoice::resource;
//! use serde_json::json;
//!
//! let invoice = CanonicalInvoiceBuilder::default()
//!     .from_object(&json!({"invoiceXid": "INV1", "amount": 10, "remarks": "rush"}), None)
//!     .unwrap();
//! let doc = resource::to_resource_json(&invoice).unwrap();
//! assert_eq!(doc["remarks"], "rush");
//! assert_eq!(doc["refnums"]["items"][0]["invoiceRefnumQualGid"], "BM");
//! ```

mod document;

pub use document::{drop_empty, to_resource_json, to_resource_json_at};

/// Fixed `invoiceType`.
pub const INVOICE_TYPE: &str = "STANDARD";

/// Fixed `invoiceSource`.
pub const INVOICE_SOURCE: &str = "MANUAL";

/// Service provider alias qualifier.
pub const ALIAS_QUALIFIER: &str = "GLOG";

/// Reference number qualifier carrying the invoice number.
pub const REFNUM_QUALIFIER: &str = "BM";

/// Cost reference qualifier on every line.
pub const COST_REF_QUALIFIER: &str = "SHIPMENT_COST";

/// Cost type used when a line has none.
pub const DEFAULT_COST_TYPE: &str = "GENERIC";

/// Identity keys that pass-through input fields may never override.
pub const RESERVED_KEYS: [&str; 4] = [
    "domainName",
    "invoiceXid",
    "invoiceNumber",
    "servprovAliasValue",
];
