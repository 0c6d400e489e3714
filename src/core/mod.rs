//! Core invoice types, field mapping, the canonical builder and
//! backend configuration.
//!
//! Everything here is network-free and format-independent: spreadsheet
//! rows or JSON objects go in, a [`CanonicalInvoice`] comes out.

mod builder;
mod config;
mod error;
mod mapping;
mod types;

pub use builder::*;
pub use config::*;
pub use error::*;
pub use mapping::*;
pub use types::*;
