//! Integration tests for the XML transmission channel.
//!
//! Run with: `cargo test --features xml --test transmission_tests`

#![cfg(feature = "xml")]

use chrono::{TimeZone, Utc};
use otm_invoice::core::*;
use otm_invoice::transmission::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn invoice() -> CanonicalInvoice {
    let date = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap();
    let mut inv = CanonicalInvoice::new("INTL", "INV1", "100", "CARRIER", "INR", date, InvoiceOrigin::Rows);
    inv.push_line(FieldValue::Scalar("SH-1".into()), Some("FREIGHT".into()), dec!(50.5), None);
    inv.push_line(
        FieldValue::List(vec!["SH-2".into(), "SH-3".into()]),
        None,
        dec!(0.12346),
        Some("USD".into()),
    );
    inv
}

#[test]
fn envelope_structure() {
    let created = Utc.with_ymd_and_hms(2024, 6, 16, 8, 0, 5).unwrap();
    let xml = to_transmission_xml_at(&invoice(), created).unwrap();
    let text = &xml.text;

    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert_eq!(xml.bytes, text.as_bytes());
    assert!(text.contains(r#"<otm:Transmission xmlns:otm="http://xmlns.oracle.com/apps/otm/transmission/v6.4">"#));
    assert!(text.contains("<otm:Version>25c</otm:Version>"));
    assert!(text.contains("<otm:GLogDate>20240616080005</otm:GLogDate>"));
    assert!(text.contains("<otm:GLogDate>20240615103000</otm:GLogDate>"));
    assert!(text.contains("<otm:GLogXMLElementName>INVOICE</otm:GLogXMLElementName>"));
    assert!(text.contains("<otm:TransactionCode>IU</otm:TransactionCode>"));
    assert!(text.contains("<otm:ServiceProviderAliasValue>INTL.CARRIER</otm:ServiceProviderAliasValue>"));
    assert!(text.contains("<otm:InvoiceTotal>1</otm:InvoiceTotal>"));
    assert_eq!(text.matches("<otm:GenericLineItem>").count(), 2);
    assert!(text.contains("<otm:AssignedNum>2</otm:AssignedNum>"));
    assert!(text.contains("<otm:LineItemRefNumValue>SH-2,SH-3</otm:LineItemRefNumValue>"));
}

#[test]
fn envelope_document() {
    let created = Utc.with_ymd_and_hms(2024, 6, 16, 8, 0, 5).unwrap();
    let xml = to_transmission_xml_at(&invoice(), created).unwrap();
    insta::assert_snapshot!(xml.text, @r###"
    <?xml version="1.0" encoding="UTF-8"?>
    <otm:Transmission xmlns:otm="http://xmlns.oracle.com/apps/otm/transmission/v6.4">
      <otm:TransmissionHeader>
        <otm:Version>25c</otm:Version>
        <otm:TransmissionCreateDt>
          <otm:GLogDate>20240616080005</otm:GLogDate>
          <otm:TZId>UTC</otm:TZId>
          <otm:TZOffset>+00:00</otm:TZOffset>
        </otm:TransmissionCreateDt>
        <otm:GLogXMLElementName>INVOICE</otm:GLogXMLElementName>
      </otm:TransmissionHeader>
      <otm:TransmissionBody>
        <otm:GLogXMLElement>
          <otm:Invoice>
            <otm:Payment>
              <otm:PaymentHeader>
                <otm:DomainName>INTL</otm:DomainName>
                <otm:InvoiceGid>
                  <otm:Gid>
                    <otm:DomainName>INTL</otm:DomainName>
                    <otm:Xid>INV1</otm:Xid>
                  </otm:Gid>
                </otm:InvoiceGid>
                <otm:TransactionCode>IU</otm:TransactionCode>
                <otm:InvoiceNum>100</otm:InvoiceNum>
                <otm:InvoiceDate>
                  <otm:GLogDate>20240615103000</otm:GLogDate>
                  <otm:TZId>UTC</otm:TZId>
                  <otm:TZOffset>+00:00</otm:TZOffset>
                </otm:InvoiceDate>
                <otm:InvoiceRefnum>
                  <otm:InvoiceRefnumQualifierGid>
                    <otm:Gid>
                      <otm:Xid>BM</otm:Xid>
                    </otm:Gid>
                  </otm:InvoiceRefnumQualifierGid>
                  <otm:InvoiceRefnumValue>100</otm:InvoiceRefnumValue>
                </otm:InvoiceRefnum>
                <otm:ServiceProviderGid>
                  <otm:Gid>
                    <otm:DomainName>INTL</otm:DomainName>
                    <otm:Xid>CARRIER</otm:Xid>
                  </otm:Gid>
                </otm:ServiceProviderGid>
                <otm:ServiceProviderAlias>
                  <otm:ServiceProviderAliasQualifierGid>
                    <otm:Gid>
                      <otm:Xid>GLOG</otm:Xid>
                    </otm:Gid>
                  </otm:ServiceProviderAliasQualifierGid>
                  <otm:ServiceProviderAliasValue>INTL.CARRIER</otm:ServiceProviderAliasValue>
                </otm:ServiceProviderAlias>
                <otm:GlobalCurrencyCode>INR</otm:GlobalCurrencyCode>
              </otm:PaymentHeader>
              <otm:PaymentModeDetail>
                <otm:GenericDetail>
                  <otm:GenericLineItem>
                    <otm:AssignedNum>1</otm:AssignedNum>
                    <otm:LineItemRefNum>
                      <otm:LineItemRefNumValue>SH-1</otm:LineItemRefNumValue>
                      <otm:LineItemRefNumQualifierGid>
                        <otm:Gid>
                          <otm:Xid>GLOG</otm:Xid>
                        </otm:Gid>
                      </otm:LineItemRefNumQualifierGid>
                    </otm:LineItemRefNum>
                    <otm:CommonInvoiceLineElements>
                      <otm:Commodity>
                        <otm:Description>FREIGHT</otm:Description>
                      </otm:Commodity>
                      <otm:FreightRate>
                        <otm:FreightCharge>
                          <otm:FinancialAmount>
                            <otm:GlobalCurrencyCode>INR</otm:GlobalCurrencyCode>
                            <otm:MonetaryAmount>50.5000</otm:MonetaryAmount>
                            <otm:RateToBase>1.0</otm:RateToBase>
                            <otm:FuncCurrencyAmount>0.0</otm:FuncCurrencyAmount>
                          </otm:FinancialAmount>
                        </otm:FreightCharge>
                      </otm:FreightRate>
                    </otm:CommonInvoiceLineElements>
                    <otm:CostTypeGid>
                      <otm:Gid>
                        <otm:Xid>FREIGHT</otm:Xid>
                      </otm:Gid>
                    </otm:CostTypeGid>
                  </otm:GenericLineItem>
                  <otm:GenericLineItem>
                    <otm:AssignedNum>2</otm:AssignedNum>
                    <otm:LineItemRefNum>
                      <otm:LineItemRefNumValue>SH-2,SH-3</otm:LineItemRefNumValue>
                      <otm:LineItemRefNumQualifierGid>
                        <otm:Gid>
                          <otm:Xid>GLOG</otm:Xid>
                        </otm:Gid>
                      </otm:LineItemRefNumQualifierGid>
                    </otm:LineItemRefNum>
                    <otm:CommonInvoiceLineElements>
                      <otm:Commodity>
                        <otm:Description></otm:Description>
                      </otm:Commodity>
                      <otm:FreightRate>
                        <otm:FreightCharge>
                          <otm:FinancialAmount>
                            <otm:GlobalCurrencyCode>USD</otm:GlobalCurrencyCode>
                            <otm:MonetaryAmount>0.1235</otm:MonetaryAmount>
                            <otm:RateToBase>1.0</otm:RateToBase>
                            <otm:FuncCurrencyAmount>0.0</otm:FuncCurrencyAmount>
                          </otm:FinancialAmount>
                        </otm:FreightCharge>
                      </otm:FreightRate>
                    </otm:CommonInvoiceLineElements>
                    <otm:CostTypeGid>
                      <otm:Gid>
                        <otm:Xid></otm:Xid>
                      </otm:Gid>
                    </otm:CostTypeGid>
                  </otm:GenericLineItem>
                </otm:GenericDetail>
              </otm:PaymentModeDetail>
              <otm:PaymentSummary>
                <otm:FreightCharge>
                  <otm:FinancialAmount>
                    <otm:GlobalCurrencyCode>INR</otm:GlobalCurrencyCode>
                    <otm:MonetaryAmount>50.6235</otm:MonetaryAmount>
                  </otm:FinancialAmount>
                </otm:FreightCharge>
                <otm:InvoiceTotal>1</otm:InvoiceTotal>
              </otm:PaymentSummary>
            </otm:Payment>
          </otm:Invoice>
        </otm:GLogXMLElement>
      </otm:TransmissionBody>
    </otm:Transmission>
    "###);
}

#[test]
fn amounts_have_four_decimals() {
    let text = to_transmission_xml(&invoice()).unwrap().text;
    assert!(text.contains("<otm:MonetaryAmount>50.5000</otm:MonetaryAmount>"));
    assert!(text.contains("<otm:MonetaryAmount>0.1235</otm:MonetaryAmount>"));
    // Summary carries the total.
    assert!(text.contains("<otm:MonetaryAmount>50.6235</otm:MonetaryAmount>"));
}

#[test]
fn overflowing_amounts_still_render() {
    let mut inv = CanonicalInvoice::new("INTL", "BIG", "1", "SP", "INR", Utc::now(), InvoiceOrigin::Rows);
    inv.push_line(FieldValue::Absent, None, Decimal::MAX, None);
    inv.push_line(FieldValue::Absent, None, dec!(1), None);
    let text = to_transmission_xml(&inv).unwrap().text;

    assert_eq!(
        text.matches("<otm:MonetaryAmount>79228162514264337593543950335.0000</otm:MonetaryAmount>").count(),
        2
    );
    assert!(text.contains("<otm:MonetaryAmount>0.0000</otm:MonetaryAmount>"));
}

#[test]
fn placeholders_are_blanked() {
    let mut inv = CanonicalInvoice::new("INTL", "INV1", "None", "missing", "INR", Utc::now(), InvoiceOrigin::Rows);
    inv.push_line(FieldValue::Absent, Some("NONE".into()), dec!(1), None);
    let text = to_transmission_xml(&inv).unwrap().text;

    assert!(!text.to_lowercase().contains(">none<"));
    assert!(!text.to_lowercase().contains(">missing<"));
    assert!(text.contains("<otm:InvoiceNum></otm:InvoiceNum>"));
}

#[test]
fn empty_xid_is_rejected() {
    let inv = CanonicalInvoice::new("INTL", " ", "1", "SP", "INR", Utc::now(), InvoiceOrigin::Rows);
    assert!(matches!(to_transmission_xml(&inv), Err(InvoiceError::Builder(_))));
}

#[test]
fn empty_invoice_has_zero_total() {
    let inv = CanonicalInvoice::new("INTL", "E", "1", "SP", "INR", Utc::now(), InvoiceOrigin::Rows);
    let xml = to_transmission_xml(&inv).unwrap();
    let summary = read_invoice_summary(&xml.text).unwrap();
    assert_eq!(summary.line_count, 0);
    assert_eq!(summary.total, Some(Decimal::ZERO));
}

#[test]
fn summary_reads_back_identity() {
    let xml = to_transmission_xml(&invoice()).unwrap();
    let summary = read_invoice_summary(&xml.text).unwrap();
    assert_eq!(summary.domain.as_deref(), Some("INTL"));
    assert_eq!(summary.invoice_xid.as_deref(), Some("INV1"));
    assert_eq!(summary.invoice_number.as_deref(), Some("100"));
    assert_eq!(summary.currency_code.as_deref(), Some("INR"));
    assert_eq!(summary.total, Some(dec!(50.6235)));
    assert_eq!(summary.line_count, 2);
}

#[test]
fn status_query_text() {
    let xml = status_query(4711).unwrap();
    insta::assert_snapshot!(xml, @r###"
    <?xml version="1.0" encoding="UTF-8"?>
    <sql2xml>
      <Query>
        <RootName>I_Transmission</RootName>
        <Statement>SELECT STATUS FROM I_TRANSMISSION WHERE I_TRANSMISSION_NO = 4711</Statement>
      </Query>
    </sql2xml>
    "###);
}

#[test]
fn ack_status_and_log_parsing() {
    let ack = r#"<?xml version="1.0"?>
        <otm:TransmissionAck xmlns:otm="http://xmlns.oracle.com/apps/otm/transmission/v6.4">
          <otm:EchoedTransmissionHeader><otm:TransmissionHeader>
            <otm:ReferenceTransmissionNo>123456</otm:ReferenceTransmissionNo>
          </otm:TransmissionHeader></otm:EchoedTransmissionHeader>
        </otm:TransmissionAck>"#;
    assert_eq!(parse_transmission_ack(ack).unwrap().as_deref(), Some("123456"));

    let status = r#"<sql2xml><I_Transmission><I_Transmission STATUS="PROCESSED"/></I_Transmission></sql2xml>"#;
    assert_eq!(parse_status(status).unwrap().as_deref(), Some("PROCESSED"));

    let log = r#"<sql2xml><I_LOG><I_LOG I_LOG_SEQNO="2" I_MESSAGE_CODE="E" I_MESSAGE_TEXT="x"/></I_LOG></sql2xml>"#;
    assert_eq!(parse_log_rows(log).unwrap().len(), 1);
}

fn line() -> impl Strategy<Value = (String, Decimal)> {
    ("[A-Z0-9]{1,8}", 0i64..10_000_000i64, 0u32..6u32)
        .prop_map(|(shipment, mantissa, scale)| (shipment, Decimal::new(mantissa, scale)))
}

proptest! {
    #[test]
    fn xml_round_trip_preserves_identity_and_total(
        xid in "[A-Z][A-Z0-9_-]{0,15}".prop_filter("placeholder text is blanked", |x| {
            !x.eq_ignore_ascii_case("none") && !x.eq_ignore_ascii_case("missing")
        }),
        number in "[0-9]{1,8}",
        lines in prop::collection::vec(line(), 0..12),
    ) {
        let mut inv = CanonicalInvoice::new("INTL", xid.clone(), number.clone(), "SP", "USD", Utc::now(), InvoiceOrigin::Rows);
        for (shipment, amount) in &lines {
            inv.push_line(FieldValue::Scalar(shipment.clone()), None, *amount, None);
        }

        let xml = to_transmission_xml(&inv).unwrap();
        let summary = read_invoice_summary(&xml.text).unwrap();

        prop_assert_eq!(summary.invoice_xid, Some(xid));
        prop_assert_eq!(summary.invoice_number, Some(number));
        prop_assert_eq!(summary.currency_code.as_deref(), Some("USD"));
        prop_assert_eq!(summary.line_count, lines.len());
        prop_assert_eq!(summary.total, Some(inv.total_amount().round_dp(4)));
    }
}
