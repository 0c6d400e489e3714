//! Parsing of backend responses: the intake acknowledgment, bridge query
//! results, and transmission documents read back for audit.
//!
//! Vendor responses are loosely shaped; every extraction returns an
//! `Option` and absence is never an error. Only input that is not XML at
//! all yields `Err`.

use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::NS;
use crate::core::InvoiceError;

fn parse_error(e: impl std::fmt::Display) -> InvoiceError {
    InvoiceError::Xml(format!("XML parse error: {e}"))
}

/// Transmission number from an intake acknowledgment: the text of the
/// first `ReferenceTransmissionNo` element in the transmission namespace.
pub fn parse_transmission_ack(xml: &str) -> Result<Option<String>, InvoiceError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    loop {
        match reader.read_resolved_event() {
            Ok((ResolveResult::Bound(Namespace(ns)), Event::Start(e)))
                if ns == NS.as_bytes() && e.local_name().as_ref() == b"ReferenceTransmissionNo" =>
            {
                inside = true;
            }
            Ok((_, Event::Text(t))) if inside => {
                let text = t.unescape().map_err(parse_error)?;
                let text = text.trim();
                return Ok((!text.is_empty()).then(|| text.to_string()));
            }
            Ok((_, Event::End(_))) => inside = false,
            Ok((_, Event::Eof)) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }
    Ok(None)
}

/// `STATUS` attribute of the first `I_Transmission` row in a status query
/// result.
pub fn parse_status(xml: &str) -> Result<Option<String>, InvoiceError> {
    let mut status = None;
    for_each_element(xml, |e| {
        if status.is_none() && e.local_name().as_ref() == b"I_Transmission" {
            status = attribute(e, "STATUS").filter(|s| !s.trim().is_empty());
        }
    })?;
    Ok(status)
}

/// One row of the integration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    pub seq: Option<i64>,
    pub code: Option<String>,
    /// Message text as stored; may be base64 encoded.
    pub text: Option<String>,
}

/// Every element of a log query result that carries log columns.
pub fn parse_log_rows(xml: &str) -> Result<Vec<LogRow>, InvoiceError> {
    let mut rows = Vec::new();
    for_each_element(xml, |e| {
        let code = attribute(e, "I_MESSAGE_CODE").filter(|s| !s.trim().is_empty());
        let text = attribute(e, "I_MESSAGE_TEXT")
            .or_else(|| attribute(e, "MESSAGE_TEXT"))
            .filter(|s| !s.trim().is_empty());
        if code.is_some() || text.is_some() {
            rows.push(LogRow {
                seq: attribute(e, "I_LOG_SEQNO").and_then(|s| s.trim().parse().ok()),
                code,
                text,
            });
        }
    })?;
    Ok(rows)
}

/// Identity and total of a transmission document, read back from its XML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub domain: Option<String>,
    pub invoice_xid: Option<String>,
    pub invoice_number: Option<String>,
    pub currency_code: Option<String>,
    pub total: Option<Decimal>,
    pub line_count: usize,
}

/// Read the invoice identity, currency and total back out of a
/// transmission document.
pub fn read_invoice_summary(xml: &str) -> Result<InvoiceSummary, InvoiceError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut summary = InvoiceSummary::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_resolved_event() {
            Ok((_, Event::Start(e))) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "GenericLineItem" {
                    summary.line_count += 1;
                }
                path.push(name);
            }
            Ok((_, Event::Text(t))) => {
                let text = t.unescape().map_err(parse_error)?.trim().to_string();
                if !text.is_empty() {
                    summary.handle_text(&path, text);
                }
            }
            Ok((_, Event::End(_))) => {
                path.pop();
            }
            Ok((_, Event::Eof)) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }
    Ok(summary)
}

impl InvoiceSummary {
    fn handle_text(&mut self, path: &[String], text: String) {
        let ends_with = |suffix: &[&str]| {
            path.len() >= suffix.len()
                && path[path.len() - suffix.len()..]
                    .iter()
                    .zip(suffix)
                    .all(|(a, b)| a == b)
        };

        if ends_with(&["PaymentHeader", "InvoiceGid", "Gid", "Xid"]) {
            self.invoice_xid = Some(text);
        } else if ends_with(&["PaymentHeader", "InvoiceGid", "Gid", "DomainName"]) {
            self.domain = Some(text);
        } else if ends_with(&["PaymentHeader", "InvoiceNum"]) {
            self.invoice_number = Some(text);
        } else if ends_with(&["PaymentHeader", "GlobalCurrencyCode"]) {
            self.currency_code = Some(text);
        } else if ends_with(&["PaymentSummary", "FreightCharge", "FinancialAmount", "MonetaryAmount"])
        {
            self.total = Decimal::from_str(&text).ok();
        }
    }
}

fn for_each_element(xml: &str, mut f: impl FnMut(&BytesStart<'_>)) -> Result<(), InvoiceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => f(e),
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }
    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}
