use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::InvoiceDefaults;
use super::error::InvoiceError;
use super::mapping::{Field, FieldMapping, FieldValue, Row, resolve};
use super::types::{CanonicalInvoice, InvoiceOrigin};

/// Key holding the line item array of a JSON invoice object.
pub const LINE_ITEMS_KEY: &str = "lineItems";

/// REST-shaped charge object (`{value, currency}`) read as a line amount.
const FREIGHT_CHARGE_KEY: &str = "freightCharge";

/// Xid base used when a JSON object carries neither xid nor number.
const FALLBACK_XID: &str = "INVOICE";

/// Builds [`CanonicalInvoice`]s from spreadsheet rows or JSON objects.
///
/// ```
/// use otm_invoice::core::*;
/// use serde_json::json;
///
/// let rows: Vec<Row> = vec![
///     json!({"INVOICE_XID": "INV1", "INVOICE_NUM": "100", "AMOUNT": "50.5"}),
///     json!({"INVOICE_XID": "INV1", "INVOICE_NUM": "100", "AMOUNT": "bad"}),
/// ]
/// .into_iter()
/// .map(|v| v.as_object().cloned().unwrap())
/// .collect();
///
/// let invoice = CanonicalInvoiceBuilder::default().from_rows(&rows, None).unwrap();
/// assert_eq!(invoice.line_items().len(), 2);
/// assert_eq!(invoice.total_amount().to_string(), "50.5");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CanonicalInvoiceBuilder {
    defaults: InvoiceDefaults,
}

impl CanonicalInvoiceBuilder {
    pub fn new(defaults: InvoiceDefaults) -> Self {
        Self { defaults }
    }

    /// Build from a batch of rows sharing one invoice identifier.
    ///
    /// Header fields come from the first row; every row becomes one line,
    /// in order.
    pub fn from_rows(
        &self,
        rows: &[Row],
        mapping: Option<&FieldMapping>,
    ) -> Result<CanonicalInvoice, InvoiceError> {
        let first = rows.first().ok_or(InvoiceError::EmptyBatch)?;
        let columns = column_union(rows);
        let reader = FieldReader {
            mapping,
            available: &columns,
            tabular: true,
        };

        let mut invoice = self.header(first, &reader, InvoiceOrigin::Rows);
        for row in rows {
            push_row_line(&mut invoice, row, &reader);
        }

        debug!(
            invoice_xid = %invoice.invoice_xid,
            lines = invoice.line_items().len(),
            total = %invoice.total_amount(),
            "built invoice from rows"
        );
        Ok(invoice)
    }

    /// Build from a single JSON invoice object.
    ///
    /// The object supplies the header. Each element of its `lineItems`
    /// array (or `lineItems.items`) becomes a line; without such an array
    /// the object itself is the only line. The xid always receives a random
    /// uniqueness suffix, and a missing xid is generated.
    pub fn from_object(
        &self,
        object: &Value,
        mapping: Option<&FieldMapping>,
    ) -> Result<CanonicalInvoice, InvoiceError> {
        let row = object
            .as_object()
            .ok_or_else(|| InvoiceError::Builder("invoice input must be a JSON object".into()))?;
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let reader = FieldReader {
            mapping,
            available: &columns,
            tabular: false,
        };

        let mut invoice = self.header(row, &reader, InvoiceOrigin::Object);
        if invoice.invoice_xid.is_empty() {
            invoice.invoice_xid = if invoice.invoice_number.is_empty() {
                FALLBACK_XID.to_string()
            } else {
                invoice.invoice_number.clone()
            };
            debug!(base = %invoice.invoice_xid, "no invoice xid in object, generating one");
        }
        invoice.ensure_unique_suffix();

        match line_item_array(row) {
            Some(items) => {
                let empty = Row::new();
                for item in items {
                    let item_row = item.as_object().unwrap_or(&empty);
                    let item_columns: Vec<&str> = item_row.keys().map(String::as_str).collect();
                    let item_reader = FieldReader {
                        mapping,
                        available: &item_columns,
                        tabular: false,
                    };
                    push_row_line(&mut invoice, item_row, &item_reader);
                }
            }
            None => push_row_line(&mut invoice, row, &reader),
        }

        let mut consumed: Vec<&str> = Field::HEADER
            .iter()
            .chain(Field::LINE.iter())
            .map(|f| reader.column(*f))
            .collect();
        consumed.extend([LINE_ITEMS_KEY, FREIGHT_CHARGE_KEY]);
        invoice.extra_fields = row
            .iter()
            .filter(|(k, _)| !consumed.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        debug!(
            invoice_xid = %invoice.invoice_xid,
            lines = invoice.line_items().len(),
            extra_fields = invoice.extra_fields.len(),
            "built invoice from object"
        );
        Ok(invoice)
    }

    fn header(&self, row: &Row, reader: &FieldReader<'_>, origin: InvoiceOrigin) -> CanonicalInvoice {
        let text = |field: Field| reader.value(row, field).as_text();

        let date_value = row.get(reader.column(Field::InvoiceDate));
        let invoice_date = match date_value.and_then(date_text) {
            Some(raw) => parse_invoice_date(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unparseable invoice date, using current time");
                Utc::now()
            }),
            None => Utc::now(),
        };

        CanonicalInvoice::new(
            text(Field::Domain).unwrap_or_else(|| self.defaults.domain.clone()),
            text(Field::InvoiceXid).unwrap_or_default(),
            text(Field::InvoiceNumber).unwrap_or_default(),
            text(Field::ServiceProvider).unwrap_or_default(),
            text(Field::Currency).unwrap_or_else(|| self.defaults.currency.clone()),
            invoice_date,
            origin,
        )
    }
}

/// Split a table into per-invoice batches by the invoice identifier column.
///
/// Groups keep first-seen order and rows keep input order. Rows without an
/// identifier are grouped under the empty string.
pub fn group_rows(rows: Vec<Row>, mapping: Option<&FieldMapping>) -> Vec<(String, Vec<Row>)> {
    let column = {
        let columns = column_union(&rows);
        resolve(
            Field::InvoiceXid.logical_name(),
            Field::InvoiceXid.default_column(),
            mapping,
            &columns,
        )
        .to_string()
    };

    let mut groups: Vec<(String, Vec<Row>)> = Vec::new();
    for row in rows {
        let key = FieldValue::from_json(row.get(&column))
            .as_text()
            .unwrap_or_default();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, batch)) => batch.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    groups
}

struct FieldReader<'a> {
    mapping: Option<&'a FieldMapping>,
    available: &'a [&'a str],
    tabular: bool,
}

impl FieldReader<'_> {
    fn column(&self, field: Field) -> &str {
        let default = if self.tabular {
            field.default_column()
        } else {
            field.logical_name()
        };
        resolve(field.logical_name(), default, self.mapping, self.available)
    }

    fn value(&self, row: &Row, field: Field) -> FieldValue {
        FieldValue::from_json(row.get(self.column(field)))
    }
}

fn push_row_line(invoice: &mut CanonicalInvoice, row: &Row, reader: &FieldReader<'_>) {
    let charge = row.get(FREIGHT_CHARGE_KEY).and_then(Value::as_object);

    let amount_value = row
        .get(reader.column(Field::Amount))
        .or_else(|| charge.and_then(|c| c.get("value")));
    let currency = reader.value(row, Field::Currency).as_text().or_else(|| {
        charge
            .and_then(|c| c.get("currency"))
            .and_then(|v| FieldValue::from_json(Some(v)).as_text())
    });

    invoice.push_line(
        reader.value(row, Field::ShipmentRef),
        reader.value(row, Field::CostType).as_text(),
        parse_amount(amount_value),
        currency,
    );
}

fn line_item_array(row: &Row) -> Option<&Vec<Value>> {
    match row.get(LINE_ITEMS_KEY)? {
        Value::Array(items) => Some(items),
        Value::Object(wrapper) => wrapper.get("items").and_then(Value::as_array),
        _ => None,
    }
}

fn column_union(rows: &[Row]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for key in rows.iter().flat_map(|r| r.keys()) {
        if !columns.contains(&key.as_str()) {
            columns.push(key);
        }
    }
    columns
}

/// Coerce a cell to a non-negative amount.
///
/// Anything that does not parse as a number, including blanks and
/// placeholders, becomes zero. Parsing never fails the build.
pub fn parse_amount(value: Option<&Value>) -> Decimal {
    let text = match FieldValue::from_json(value) {
        FieldValue::Scalar(s) => s,
        FieldValue::Absent => return Decimal::ZERO,
        FieldValue::List(items) => items.join(","),
    };

    let parsed = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_str(&text.replace(',', "")))
        .or_else(|_| Decimal::from_scientific(&text));

    match parsed {
        Ok(d) if d.is_sign_negative() => {
            warn!(value = %text, "negative amount, using 0");
            Decimal::ZERO
        }
        Ok(d) => d.normalize(),
        Err(_) => {
            warn!(value = %text, "unparseable amount, using 0");
            Decimal::ZERO
        }
    }
}

fn date_text(value: &Value) -> Option<String> {
    match value {
        // REST shape: {"value": "...", "timezone": "UTC"}
        Value::Object(o) => o.get("value").and_then(date_text),
        other => FieldValue::from_json(Some(other)).as_text(),
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y%m%d%H%M%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%Y%m%d",
    "%m/%d/%Y",
];

/// Lenient, day-first date parsing.
///
/// `05/01/2024` is the 5th of January. Month-first is only tried when the
/// day-first reading is impossible. Returns `None` when nothing matches.
pub fn parse_invoice_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(dt.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
