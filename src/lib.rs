//! # otm-invoice
//!
//! Freight invoice submission pipeline for Oracle Transportation
//! Management (OTM): spreadsheet or JSON input is mapped into a canonical
//! invoice, serialized as an XML transmission or a REST resource document,
//! submitted, and tracked to a terminal status.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point
//! until the JSON wire document.
//!
//! ## Quick Start
//!
//! ```rust
//! use otm_invoice::core::*;
//! use serde_json::json;
//!
//! let invoice = CanonicalInvoiceBuilder::default()
//!     .from_object(&json!({"invoiceNumber": "100", "amount": "42.00"}), None)
//!     .unwrap();
//!
//! assert_eq!(invoice.domain, "INTL");
//! assert!(invoice.invoice_xid.starts_with("100_"));
//! assert_eq!(invoice.line_items().len(), 1);
//!
//! let doc = otm_invoice::resource::to_resource_json(&invoice).unwrap();
//! assert_eq!(doc["lineItems"]["items"][0]["costTypeGid"], "GENERIC");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Mapping, canonical invoice, builder, config, REST JSON document |
//! | `xml` | XML transmission envelope and backend response parsing |
//! | `submit` | HTTP submission client, record store, completion tracker |
//! | `all` | Everything (also the default) |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod resource;

#[cfg(feature = "xml")]
pub mod transmission;

#[cfg(feature = "submit")]
pub mod submit;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
