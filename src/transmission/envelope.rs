use chrono::{DateTime, Utc};
use tracing::debug;

use super::xml_utils::{XmlWriter, blank_placeholder, format_amount};
use super::{
    ALIAS_QUALIFIER, ELEMENT_NAME, INVOICE_REFNUM_QUALIFIER, LINE_REFNUM_QUALIFIER, NS,
    TRANSACTION_CODE, VERSION,
};
use crate::core::{CanonicalInvoice, InvoiceError, LineItem};

/// A rendered transmission: the bytes to post and the same document as
/// text for audit and resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionXml {
    /// UTF-8 encoded document including the XML declaration.
    pub bytes: Vec<u8>,
    /// Decoded form of `bytes`.
    pub text: String,
}

/// Render the invoice as a namespaced XML transmission, stamped with the
/// current time.
pub fn to_transmission_xml(invoice: &CanonicalInvoice) -> Result<TransmissionXml, InvoiceError> {
    to_transmission_xml_at(invoice, Utc::now())
}

/// Render the invoice as a namespaced XML transmission created at `created`.
pub fn to_transmission_xml_at(
    invoice: &CanonicalInvoice,
    created: DateTime<Utc>,
) -> Result<TransmissionXml, InvoiceError> {
    if invoice.invoice_xid.trim().is_empty() {
        return Err(InvoiceError::Builder(
            "invoice xid must be set before serialization".into(),
        ));
    }

    let domain = blank_placeholder(&invoice.domain);
    let provider = blank_placeholder(&invoice.service_provider_xid);
    let currency = blank_placeholder(&invoice.currency_code);
    let number = blank_placeholder(&invoice.invoice_number);

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs("otm:Transmission", &[("xmlns:otm", NS)])?;

    // Header
    w.start_element("otm:TransmissionHeader")?;
    w.text_element("otm:Version", VERSION)?;
    write_glog_date(&mut w, "otm:TransmissionCreateDt", created)?;
    w.text_element("otm:GLogXMLElementName", ELEMENT_NAME)?;
    w.end_element("otm:TransmissionHeader")?;

    // Body
    w.start_element("otm:TransmissionBody")?;
    w.start_element("otm:GLogXMLElement")?;
    w.start_element("otm:Invoice")?;
    w.start_element("otm:Payment")?;

    w.start_element("otm:PaymentHeader")?;
    w.text_element("otm:DomainName", domain)?;
    write_gid(&mut w, "otm:InvoiceGid", Some(domain), blank_placeholder(&invoice.invoice_xid))?;
    w.text_element("otm:TransactionCode", TRANSACTION_CODE)?;
    w.text_element("otm:InvoiceNum", number)?;
    write_glog_date(&mut w, "otm:InvoiceDate", invoice.invoice_date)?;

    w.start_element("otm:InvoiceRefnum")?;
    write_gid(&mut w, "otm:InvoiceRefnumQualifierGid", None, INVOICE_REFNUM_QUALIFIER)?;
    w.text_element("otm:InvoiceRefnumValue", number)?;
    w.end_element("otm:InvoiceRefnum")?;

    write_gid(&mut w, "otm:ServiceProviderGid", Some(domain), provider)?;

    w.start_element("otm:ServiceProviderAlias")?;
    write_gid(&mut w, "otm:ServiceProviderAliasQualifierGid", None, ALIAS_QUALIFIER)?;
    let alias = if provider.is_empty() {
        String::new()
    } else {
        format!("{domain}.{provider}")
    };
    w.text_element("otm:ServiceProviderAliasValue", &alias)?;
    w.end_element("otm:ServiceProviderAlias")?;

    w.text_element("otm:GlobalCurrencyCode", currency)?;
    w.end_element("otm:PaymentHeader")?;

    // Lines
    w.start_element("otm:PaymentModeDetail")?;
    w.start_element("otm:GenericDetail")?;
    for line in invoice.line_items() {
        write_line(&mut w, line)?;
    }
    w.end_element("otm:GenericDetail")?;
    w.end_element("otm:PaymentModeDetail")?;

    // Summary
    w.start_element("otm:PaymentSummary")?;
    w.start_element("otm:FreightCharge")?;
    w.start_element("otm:FinancialAmount")?;
    w.text_element("otm:GlobalCurrencyCode", currency)?;
    w.text_element("otm:MonetaryAmount", &format_amount(invoice.total_amount()))?;
    w.end_element("otm:FinancialAmount")?;
    w.end_element("otm:FreightCharge")?;
    w.text_element("otm:InvoiceTotal", "1")?;
    w.end_element("otm:PaymentSummary")?;

    w.end_element("otm:Payment")?;
    w.end_element("otm:Invoice")?;
    w.end_element("otm:GLogXMLElement")?;
    w.end_element("otm:TransmissionBody")?;
    w.end_element("otm:Transmission")?;

    let text = w.into_string()?;
    debug!(
        invoice_gid = %invoice.invoice_gid(),
        lines = invoice.line_items().len(),
        bytes = text.len(),
        "rendered transmission"
    );
    Ok(TransmissionXml {
        bytes: text.clone().into_bytes(),
        text,
    })
}

fn write_line(w: &mut XmlWriter, line: &LineItem) -> Result<(), InvoiceError> {
    let cost_type = blank_placeholder(line.cost_type_xid.as_deref().unwrap_or(""));
    let shipment = line.shipment_ref.as_text().unwrap_or_default();
    let currency = blank_placeholder(&line.currency_code);

    w.start_element("otm:GenericLineItem")?;
    w.text_element("otm:AssignedNum", &line.sequence_number.to_string())?;

    w.start_element("otm:LineItemRefNum")?;
    w.text_element("otm:LineItemRefNumValue", blank_placeholder(&shipment))?;
    write_gid(w, "otm:LineItemRefNumQualifierGid", None, LINE_REFNUM_QUALIFIER)?;
    w.end_element("otm:LineItemRefNum")?;

    w.start_element("otm:CommonInvoiceLineElements")?;
    w.start_element("otm:Commodity")?;
    w.text_element("otm:Description", cost_type)?;
    w.end_element("otm:Commodity")?;
    w.start_element("otm:FreightRate")?;
    w.start_element("otm:FreightCharge")?;
    w.start_element("otm:FinancialAmount")?;
    w.text_element("otm:GlobalCurrencyCode", currency)?;
    w.text_element("otm:MonetaryAmount", &format_amount(line.amount))?;
    w.text_element("otm:RateToBase", "1.0")?;
    w.text_element("otm:FuncCurrencyAmount", "0.0")?;
    w.end_element("otm:FinancialAmount")?;
    w.end_element("otm:FreightCharge")?;
    w.end_element("otm:FreightRate")?;
    w.end_element("otm:CommonInvoiceLineElements")?;

    write_gid(w, "otm:CostTypeGid", None, cost_type)?;
    w.end_element("otm:GenericLineItem")?;
    Ok(())
}

/// `<wrapper><Gid>[<DomainName/>]<Xid/></Gid></wrapper>`
fn write_gid(
    w: &mut XmlWriter,
    wrapper: &str,
    domain: Option<&str>,
    xid: &str,
) -> Result<(), InvoiceError> {
    w.start_element(wrapper)?;
    w.start_element("otm:Gid")?;
    if let Some(domain) = domain {
        w.text_element("otm:DomainName", domain)?;
    }
    w.text_element("otm:Xid", xid)?;
    w.end_element("otm:Gid")?;
    w.end_element(wrapper)?;
    Ok(())
}

/// GLog timestamp block, always UTC.
fn write_glog_date(
    w: &mut XmlWriter,
    wrapper: &str,
    at: DateTime<Utc>,
) -> Result<(), InvoiceError> {
    w.start_element(wrapper)?;
    w.text_element("otm:GLogDate", &at.format("%Y%m%d%H%M%S").to_string())?;
    w.text_element("otm:TZId", "UTC")?;
    w.text_element("otm:TZOffset", "+00:00")?;
    w.end_element(wrapper)?;
    Ok(())
}
