use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{
    ALIAS_QUALIFIER, COST_REF_QUALIFIER, DEFAULT_COST_TYPE, INVOICE_SOURCE, INVOICE_TYPE,
    REFNUM_QUALIFIER, RESERVED_KEYS,
};
use crate::core::{CanonicalInvoice, InvoiceError, LineItem};

/// Render the invoice as a REST resource document, stamped with the
/// current time.
pub fn to_resource_json(invoice: &CanonicalInvoice) -> Result<Value, InvoiceError> {
    to_resource_json_at(invoice, Utc::now())
}

/// Render the invoice as a REST resource document with `invoiceDate` and
/// `dateReceived` set to `now`.
pub fn to_resource_json_at(
    invoice: &CanonicalInvoice,
    now: DateTime<Utc>,
) -> Result<Value, InvoiceError> {
    if invoice.invoice_xid.trim().is_empty() {
        return Err(InvoiceError::Builder(
            "invoice xid must be set before serialization".into(),
        ));
    }

    let domain = &invoice.domain;
    let stamp = json!({
        "value": now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        "timezone": "UTC",
    });

    let lines: Vec<Value> = invoice
        .line_items()
        .iter()
        .map(|line| line_json(line, domain))
        .collect();

    let doc = json!({
        "domainName": domain,
        "invoiceXid": invoice.invoice_xid,
        "invoiceNumber": invoice.invoice_number,
        "invoiceType": INVOICE_TYPE,
        "invoiceSource": INVOICE_SOURCE,
        "servprovAliasQualGid": ALIAS_QUALIFIER,
        "servprovAliasValue": invoice.service_provider_xid,
        "currencyGid": invoice.currency_code,
        "invoiceDate": stamp.clone(),
        "dateReceived": stamp,
        "refnums": {
            "items": [{
                "invoiceRefnumQualGid": REFNUM_QUALIFIER,
                "invoiceRefnumValue": invoice.invoice_number,
                "domainName": domain,
            }]
        },
        "lineItems": { "items": lines },
    });

    let Value::Object(mut doc) = doc else {
        return Err(InvoiceError::Json("resource document is not an object".into()));
    };
    merge_extra_fields(&mut doc, &invoice.extra_fields);

    Ok(drop_empty(Value::Object(doc)).unwrap_or_else(|| Value::Object(Map::new())))
}

fn line_json(line: &LineItem, domain: &str) -> Value {
    let cost_type = line
        .cost_type_xid
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(DEFAULT_COST_TYPE);

    json!({
        "lineitemSeqNo": line.sequence_number,
        "freightCharge": {
            "value": line.amount.to_f64().unwrap_or(0.0),
            "currency": line.currency_code,
        },
        "processAsFlowThru": false,
        "costTypeGid": cost_type,
        "domainName": domain,
        "costRefs": {
            "items": [{
                "shipmentCostQualGid": COST_REF_QUALIFIER,
                "domainName": domain,
            }]
        },
    })
}

/// Pass unknown input keys through, never replacing a generated key or a
/// reserved identity key.
fn merge_extra_fields(doc: &mut Map<String, Value>, extra: &Map<String, Value>) {
    for (key, value) in extra {
        if RESERVED_KEYS.contains(&key.as_str()) || doc.contains_key(key) {
            debug!(key = %key, "pass-through field shadowed by generated field");
            continue;
        }
        doc.insert(key.clone(), value.clone());
    }
}

/// Recursively drop `""`, `null`, `[]` and `{}`; containers left empty by
/// the pruning are dropped too. Returns `None` if nothing remains.
pub fn drop_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let kept: Vec<Value> = items.into_iter().filter_map(drop_empty).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| drop_empty(v).map(|v| (k, v)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldValue, InvoiceOrigin};
    use rust_decimal_macros::dec;

    #[test]
    fn drop_empty_prunes_recursively() {
        let v = json!({"a": "", "b": null, "c": [], "d": {}, "e": {"f": ""}, "g": 0, "h": false});
        assert_eq!(drop_empty(v), Some(json!({"g": 0, "h": false})));
        assert_eq!(drop_empty(json!({"x": [null, ""]})), None);
    }

    #[test]
    fn empty_xid_is_rejected() {
        let inv = CanonicalInvoice::new("INTL", "", "1", "SP", "INR", Utc::now(), InvoiceOrigin::Rows);
        assert!(matches!(to_resource_json(&inv), Err(InvoiceError::Builder(_))));
    }

    #[test]
    fn line_defaults() {
        let mut inv =
            CanonicalInvoice::new("INTL", "X", "1", "SP", "INR", Utc::now(), InvoiceOrigin::Rows);
        inv.push_line(FieldValue::Absent, None, dec!(2.5), None);
        let doc = to_resource_json(&inv).unwrap();
        let line = &doc["lineItems"]["items"][0];
        assert_eq!(line["lineitemSeqNo"], 1);
        assert_eq!(line["costTypeGid"], "GENERIC");
        assert_eq!(line["processAsFlowThru"], false);
        assert_eq!(line["freightCharge"]["value"], 2.5);
        assert_eq!(line["freightCharge"]["currency"], "INR");
        assert_eq!(line["costRefs"]["items"][0]["shipmentCostQualGid"], "SHIPMENT_COST");
    }
}
