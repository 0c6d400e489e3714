//! `sql2xml` requests for the backend's query-over-XML bridge.

use super::LOG_WRITTEN_BY;
use super::xml_utils::{XmlResult, XmlWriter};
use crate::core::InvoiceError;

/// Query the processing status of one transmission.
pub fn status_query(transmission_no: u64) -> Result<String, InvoiceError> {
    sql2xml(
        "I_Transmission",
        &format!("SELECT STATUS FROM I_TRANSMISSION WHERE I_TRANSMISSION_NO = {transmission_no}"),
    )
}

/// Query the integration log rows of one transmission, newest first.
pub fn log_query(transmission_no: u64) -> Result<String, InvoiceError> {
    sql2xml(
        "I_LOG",
        &format!(
            "SELECT I_LOG_SEQNO, I_MESSAGE_CODE, I_MESSAGE_TEXT FROM I_LOG \
             WHERE I_TRANSMISSION_NO = {transmission_no} AND WRITTEN_BY = '{LOG_WRITTEN_BY}' \
             ORDER BY I_LOG_SEQNO DESC"
        ),
    )
}

fn sql2xml(root_name: &str, statement: &str) -> XmlResult {
    let mut w = XmlWriter::new()?;
    w.start_element("sql2xml")?;
    w.start_element("Query")?;
    w.text_element("RootName", root_name)?;
    w.text_element("Statement", statement)?;
    w.end_element("Query")?;
    w.end_element("sql2xml")?;
    w.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_query_names_transmission() {
        let xml = status_query(4711).unwrap();
        assert!(xml.contains("<RootName>I_Transmission</RootName>"));
        assert!(xml.contains("WHERE I_TRANSMISSION_NO = 4711"));
    }

    #[test]
    fn log_query_filters_source_and_orders_descending() {
        let xml = log_query(4711).unwrap();
        assert!(xml.contains("I_TRANSMISSION_NO = 4711"));
        assert!(xml.contains("WRITTEN_BY"));
        assert!(xml.contains("ORDER BY I_LOG_SEQNO DESC"));
    }
}
