use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::mapping::FieldValue;

/// Length of the random hex token appended to JSON-origin invoice xids.
pub const XID_SUFFIX_LEN: usize = 6;

/// Where the canonical invoice was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceOrigin {
    /// A batch of spreadsheet rows sharing one invoice identifier.
    Rows,
    /// A single JSON object.
    Object,
}

/// The format-independent invoice, built once per submission unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalInvoice {
    /// Tenant domain (e.g. "INTL").
    pub domain: String,
    /// External invoice identifier; the GID is `domain.invoice_xid`.
    pub invoice_xid: String,
    /// Human-facing invoice number.
    pub invoice_number: String,
    /// Carrier / service provider identifier.
    pub service_provider_xid: String,
    /// ISO 4217 currency code of the header.
    pub currency_code: String,
    pub invoice_date: DateTime<Utc>,
    pub origin: InvoiceOrigin,
    /// Input keys not consumed by the builder, passed through by the JSON
    /// serializer.
    pub extra_fields: Map<String, Value>,
    line_items: Vec<LineItem>,
    xid_suffixed: bool,
}

/// A single freight charge line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// 1-based position in input order.
    pub sequence_number: u32,
    /// Shipment the charge belongs to.
    pub shipment_ref: FieldValue,
    /// Cost type; the JSON channel substitutes "GENERIC" when absent.
    pub cost_type_xid: Option<String>,
    /// Charge amount, never negative.
    pub amount: Decimal,
    pub currency_code: String,
}

impl CanonicalInvoice {
    /// An invoice with header fields only; lines are added with
    /// [`push_line`](Self::push_line).
    pub fn new(
        domain: impl Into<String>,
        invoice_xid: impl Into<String>,
        invoice_number: impl Into<String>,
        service_provider_xid: impl Into<String>,
        currency_code: impl Into<String>,
        invoice_date: DateTime<Utc>,
        origin: InvoiceOrigin,
    ) -> Self {
        Self {
            domain: domain.into(),
            invoice_xid: invoice_xid.into(),
            invoice_number: invoice_number.into(),
            service_provider_xid: service_provider_xid.into(),
            currency_code: currency_code.into(),
            invoice_date,
            origin,
            extra_fields: Map::new(),
            line_items: Vec::new(),
            xid_suffixed: false,
        }
    }

    /// Append a line, assigning the next sequence number.
    ///
    /// The line inherits the header currency unless `currency_code` is given.
    /// Negative amounts are stored as zero, as is an amount that would push
    /// the invoice total past the representable range.
    pub fn push_line(
        &mut self,
        shipment_ref: FieldValue,
        cost_type_xid: Option<String>,
        amount: Decimal,
        currency_code: Option<String>,
    ) -> &LineItem {
        let sequence_number = self.line_items.len() as u32 + 1;
        let mut amount = amount.max(Decimal::ZERO);
        if self.total_amount().checked_add(amount).is_none() {
            warn!(
                invoice_xid = %self.invoice_xid,
                sequence_number,
                %amount,
                "line amount overflows invoice total, using 0"
            );
            amount = Decimal::ZERO;
        }
        self.line_items.push(LineItem {
            sequence_number,
            shipment_ref,
            cost_type_xid,
            amount,
            currency_code: currency_code.unwrap_or_else(|| self.currency_code.clone()),
        });
        &self.line_items[self.line_items.len() - 1]
    }

    /// Lines in input order.
    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    /// Sum of all line amounts, always recomputed. Saturates at
    /// [`Decimal::MAX`].
    pub fn total_amount(&self) -> Decimal {
        self.line_items
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.amount))
    }

    /// `DOMAIN.XID` composite identifier.
    pub fn invoice_gid(&self) -> String {
        format!("{}.{}", self.domain, self.invoice_xid)
    }

    pub fn identity(&self) -> InvoiceIdentity {
        InvoiceIdentity {
            domain: self.domain.clone(),
            invoice_xid: self.invoice_xid.clone(),
            invoice_number: self.invoice_number.clone(),
        }
    }

    /// Whether the xid already carries the random uniqueness token.
    pub fn has_unique_suffix(&self) -> bool {
        self.xid_suffixed
    }

    /// Append `_` plus a random 6-hex-character token to the xid, once.
    pub fn ensure_unique_suffix(&mut self) {
        if self.xid_suffixed {
            return;
        }
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.invoice_xid = format!("{}_{}", self.invoice_xid, &token[..XID_SUFFIX_LEN]);
        self.xid_suffixed = true;
    }
}

/// The identity triple a submission is known by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIdentity {
    pub domain: String,
    pub invoice_xid: String,
    pub invoice_number: String,
}

/// Wire format a submission was sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionFormat {
    /// Transmission envelope posted to the XML intake servlet.
    Xml,
    /// Resource document posted to the REST invoices endpoint.
    Json,
}

impl fmt::Display for SubmissionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => f.write_str("XML"),
            Self::Json => f.write_str("JSON"),
        }
    }
}

/// Lifecycle status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionStatus {
    Submitted,
    Received,
    Error,
    Unknown,
    NoTransmission,
}

impl TransmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Received => "RECEIVED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
            Self::NoTransmission => "NO_TRANSMISSION",
        }
    }

    /// Map a backend transmission status string onto the lifecycle.
    ///
    /// Any status the backend reports other than `ERROR` means the
    /// transmission was received.
    pub fn from_backend(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Self::Error,
            "" | "UNKNOWN" => Self::Unknown,
            "NO_TRANSMISSION" => Self::NoTransmission,
            _ => Self::Received,
        }
    }
}

impl fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque store key of a submission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persisted lifecycle object of one submitted invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: RecordId,
    pub identity: InvoiceIdentity,
    pub format: SubmissionFormat,
    /// Backend correlation id; `None` until the backend accepts and
    /// identifies the submission.
    pub transmission_ref: Option<String>,
    pub status: TransmissionStatus,
    /// Status string as last reported by the backend.
    pub backend_status: Option<String>,
    /// Serialized payload as sent (XML text or JSON text).
    pub raw_request: String,
    /// Backend acknowledgment body.
    pub raw_response: Option<String>,
    /// Resource link returned by the REST channel.
    pub resource_link: Option<String>,
    /// Decoded error log; only set while status is ERROR.
    pub error_report: Option<String>,
    /// The invoice the payload was serialized from.
    pub invoice: CanonicalInvoice,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Invoice GID extracted from the REST resource link
    /// (`.../invoices/{gid}`).
    pub fn resource_gid(&self) -> Option<&str> {
        self.resource_link
            .as_deref()
            .and_then(|href| href.rsplit_once("/invoices/"))
            .map(|(_, gid)| gid)
            .filter(|gid| !gid.is_empty())
    }

    /// True when this record was submitted for `xid`, either verbatim or
    /// with the random uniqueness suffix appended.
    pub fn matches_invoice_xid(&self, xid: &str) -> bool {
        let stored = &self.identity.invoice_xid;
        if stored == xid {
            return true;
        }
        self.invoice.has_unique_suffix()
            && stored
                .rsplit_once('_')
                .is_some_and(|(base, token)| base == xid && token.len() == XID_SUFFIX_LEN)
    }
}

/// A record's payload in displayable form.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Xml(String),
    Json(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice() -> CanonicalInvoice {
        CanonicalInvoice::new(
            "INTL",
            "INV1",
            "100",
            "CARRIER",
            "INR",
            Utc::now(),
            InvoiceOrigin::Rows,
        )
    }

    #[test]
    fn lines_are_numbered_in_order() {
        let mut inv = invoice();
        inv.push_line(FieldValue::Absent, None, dec!(10), None);
        inv.push_line(FieldValue::Absent, None, dec!(5.25), Some("USD".into()));
        let seqs: Vec<u32> = inv.line_items().iter().map(|l| l.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(inv.line_items()[0].currency_code, "INR");
        assert_eq!(inv.line_items()[1].currency_code, "USD");
        assert_eq!(inv.total_amount(), dec!(15.25));
    }

    #[test]
    fn negative_amounts_clamp_to_zero() {
        let mut inv = invoice();
        inv.push_line(FieldValue::Absent, None, dec!(-3), None);
        assert_eq!(inv.total_amount(), Decimal::ZERO);
    }

    #[test]
    fn overflowing_line_is_stored_as_zero() {
        let mut inv = invoice();
        inv.push_line(FieldValue::Absent, None, Decimal::MAX, None);
        inv.push_line(FieldValue::Absent, None, dec!(1), None);
        assert_eq!(inv.line_items()[1].amount, Decimal::ZERO);
        assert_eq!(inv.line_items()[1].sequence_number, 2);
        assert_eq!(inv.total_amount(), Decimal::MAX);
    }

    #[test]
    fn empty_invoice_totals_zero() {
        assert_eq!(invoice().total_amount(), Decimal::ZERO);
    }

    #[test]
    fn unique_suffix_is_applied_once() {
        let mut inv = invoice();
        inv.ensure_unique_suffix();
        let first = inv.invoice_xid.clone();
        inv.ensure_unique_suffix();
        assert_eq!(inv.invoice_xid, first);
        let (base, token) = first.rsplit_once('_').unwrap();
        assert_eq!(base, "INV1");
        assert_eq!(token.len(), XID_SUFFIX_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn backend_status_mapping() {
        assert_eq!(TransmissionStatus::from_backend("ERROR"), TransmissionStatus::Error);
        assert_eq!(TransmissionStatus::from_backend("PROCESSED"), TransmissionStatus::Received);
        assert_eq!(TransmissionStatus::from_backend("STAGED"), TransmissionStatus::Received);
        assert_eq!(TransmissionStatus::from_backend("SUBMITTED"), TransmissionStatus::Received);
        assert_eq!(TransmissionStatus::from_backend(""), TransmissionStatus::Unknown);
        assert_eq!(
            TransmissionStatus::from_backend("NO_TRANSMISSION"),
            TransmissionStatus::NoTransmission
        );
    }

    #[test]
    fn gid_joins_domain_and_xid() {
        assert_eq!(invoice().invoice_gid(), "INTL.INV1");
    }
}
