use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::InvoiceError;

/// One input row: column (or key) name to cell value, in input order.
pub type Row = Map<String, Value>;

/// Logical invoice fields the builder knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Domain,
    InvoiceXid,
    InvoiceNumber,
    ServiceProvider,
    Currency,
    InvoiceDate,
    ShipmentRef,
    CostType,
    Amount,
}

impl Field {
    /// Header fields, read once from the first row.
    pub const HEADER: [Field; 6] = [
        Field::Domain,
        Field::InvoiceXid,
        Field::InvoiceNumber,
        Field::ServiceProvider,
        Field::Currency,
        Field::InvoiceDate,
    ];

    /// Per-line fields, read from every row.
    pub const LINE: [Field; 4] = [
        Field::ShipmentRef,
        Field::CostType,
        Field::Amount,
        Field::Currency,
    ];

    /// Logical name used as the key in a [`FieldMapping`] and as the
    /// default key of JSON input.
    pub fn logical_name(self) -> &'static str {
        match self {
            Self::Domain => "domainName",
            Self::InvoiceXid => "invoiceXid",
            Self::InvoiceNumber => "invoiceNumber",
            Self::ServiceProvider => "serviceProvider",
            Self::Currency => "currencyGid",
            Self::InvoiceDate => "invoiceDate",
            Self::ShipmentRef => "shipmentGid",
            Self::CostType => "costTypeGid",
            Self::Amount => "amount",
        }
    }

    /// Default spreadsheet column name.
    pub fn default_column(self) -> &'static str {
        match self {
            Self::Domain => "DOMAIN",
            Self::InvoiceXid => "INVOICE_XID",
            Self::InvoiceNumber => "INVOICE_NUM",
            Self::ServiceProvider => "SERVICE_PROVIDER",
            Self::Currency => "CURRENCY",
            Self::InvoiceDate => "INVOICE_DATE",
            Self::ShipmentRef => "SHIPMENT_GID",
            Self::CostType => "COST_TYPE",
            Self::Amount => "AMOUNT",
        }
    }
}

/// Caller-supplied mapping from logical field name to physical column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(HashMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping entry, builder style.
    pub fn with(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.insert(logical, physical);
        self
    }

    pub fn insert(&mut self, logical: impl Into<String>, physical: impl Into<String>) {
        self.0.insert(logical.into(), physical.into());
    }

    /// Physical name configured for a logical field, if any.
    pub fn get(&self, logical: &str) -> Option<&str> {
        self.0.get(logical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Resolve a logical field name to the physical column to read.
///
/// The mapped name wins only when it is one of `available`; otherwise the
/// default is returned, even when the default is missing too. A missing
/// column means "no value", never an error.
pub fn resolve<'a>(
    logical: &str,
    default: &'a str,
    mapping: Option<&'a FieldMapping>,
    available: &[&str],
) -> &'a str {
    match mapping.and_then(|m| m.get(logical)) {
        Some(physical) if available.contains(&physical) => physical,
        _ => default,
    }
}

/// True for text that stands in for "no value": empty or `none`, ignoring
/// case and surrounding whitespace.
pub fn is_placeholder(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || t.eq_ignore_ascii_case("none")
}

/// A normalized cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Absent,
    Scalar(String),
    /// Non-blank list elements. A single element stays a list so the
    /// serializer decides whether to join or array-encode it.
    List(Vec<String>),
}

impl FieldValue {
    /// Normalize a raw JSON cell.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::Array(items)) => {
                let kept: Vec<String> = items
                    .iter()
                    .filter_map(scalar_text)
                    .filter(|s| !is_placeholder(s))
                    .map(|s| s.trim().to_string())
                    .collect();
                if kept.is_empty() {
                    Self::Absent
                } else {
                    Self::List(kept)
                }
            }
            Some(other) => match scalar_text(other) {
                Some(s) if !is_placeholder(&s) => Self::Scalar(s.trim().to_string()),
                _ => Self::Absent,
            },
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Text form: scalars as-is, lists joined with commas.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::Scalar(s) => Some(s.clone()),
            Self::List(items) => Some(items.join(",")),
        }
    }

    /// JSON form: lists stay arrays, absent becomes null.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Scalar(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(o) if o.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// One field of a saved invoice template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    /// Logical field name (e.g. "invoiceXid").
    pub id: String,
    /// Fallback column name when no display text is set.
    #[serde(default)]
    pub name: Option<String>,
    /// Column header the field maps to.
    #[serde(default)]
    pub display_text: Option<String>,
    /// Value used when submitting from the template without a file.
    #[serde(default)]
    pub default_value: Value,
}

impl TemplateField {
    fn column(&self) -> &str {
        self.display_text
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.name.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(&self.id)
    }
}

/// A saved field template: a reusable mapping plus default values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldTemplate {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub fields: Vec<TemplateField>,
}

impl FieldTemplate {
    /// Logical id to display text, for fields that have display text.
    pub fn mapping(&self) -> FieldMapping {
        self.fields
            .iter()
            .filter_map(|f| {
                f.display_text
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .map(|d| (f.id.clone(), d.to_string()))
            })
            .collect()
    }

    /// A single synthetic row built from the template defaults.
    ///
    /// List defaults lose their blank elements but stay lists.
    pub fn virtual_row(&self) -> Result<Row, InvoiceError> {
        if self.fields.is_empty() {
            return Err(InvoiceError::EmptyBatch);
        }
        let mut row = Row::new();
        for field in &self.fields {
            let value = match &field.default_value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter(|v| scalar_text(v).is_some_and(|s| !s.trim().is_empty()))
                        .cloned()
                        .collect(),
                ),
                other => other.clone(),
            };
            row.insert(field.column().to_string(), value);
        }
        Ok(row)
    }
}
