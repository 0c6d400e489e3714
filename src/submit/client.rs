use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{Result, SubmitError};
use super::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::core::{InvoiceError, OtmConfig};
use crate::transmission::{
    LogRow, log_query, parse_log_rows, parse_status, parse_transmission_ack, status_query,
};

/// Content type of the XML intake and the query bridge.
pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Content type of a single REST resource.
pub const JSON_CONTENT_TYPE: &str = "application/vnd.oracle.resource+json;type=singular";

/// Accept header of the REST channel.
pub const JSON_ACCEPT: &str = "application/vnd.oracle.resource+json";

/// Status reported when there is no transmission to ask about.
pub const NO_TRANSMISSION: &str = "NO_TRANSMISSION";

/// Status reported when the bridge answers without a status.
pub const UNKNOWN: &str = "UNKNOWN";

/// Acknowledgment of an XML submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAck {
    /// Response body as received.
    pub raw: String,
    /// `None` means accepted but uncorrelated.
    pub transmission_ref: Option<String>,
}

/// Acknowledgment of a REST submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonAck {
    pub status: u16,
    pub raw: String,
    /// Parsed body; `Null` when the body was not JSON.
    pub body: Value,
    /// `transmissionNo`, else `id`, of the acknowledgment.
    pub transmission_ref: Option<String>,
    /// `links[0].href` of the created resource.
    pub resource_link: Option<String>,
}

/// Format-agnostic transport to the backend.
///
/// Every operation is one bounded blocking HTTP call; the timeouts come
/// from the injected [`OtmConfig`].
pub struct SubmissionClient<T = ReqwestTransport> {
    config: OtmConfig,
    transport: T,
}

impl SubmissionClient<ReqwestTransport> {
    /// Client over a reqwest transport using the configured credentials.
    pub fn from_config(config: OtmConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, transport))
    }
}

impl<T: HttpTransport> SubmissionClient<T> {
    pub fn new(config: OtmConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &OtmConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Post a transmission document to the XML intake.
    pub fn submit_xml(&self, bytes: &[u8]) -> Result<XmlAck> {
        let response = self.transport.send(HttpRequest {
            method: Method::POST,
            url: self.config.xml_url.clone(),
            content_type: XML_CONTENT_TYPE.into(),
            accept: None,
            body: bytes.to_vec(),
            timeout: self.config.xml_timeout(),
        })?;
        let response = reject_unless_success("xml", response)?;

        let transmission_ref = match parse_transmission_ack(&response.body) {
            Ok(Some(no)) => {
                info!(transmission_no = %no, "transmission accepted");
                Some(no)
            }
            Ok(None) => {
                let e = SubmitError::MalformedAcknowledgment(
                    "no ReferenceTransmissionNo in acknowledgment".into(),
                );
                warn!(error = %e, "accepted without transmission reference");
                None
            }
            Err(parse) => {
                let e = SubmitError::MalformedAcknowledgment(parse.to_string());
                warn!(error = %e, "accepted without transmission reference");
                None
            }
        };

        Ok(XmlAck {
            raw: response.body,
            transmission_ref,
        })
    }

    /// Post a resource document to the REST invoices endpoint.
    pub fn submit_json(&self, payload: &Value) -> Result<JsonAck> {
        let body = serde_json::to_vec(payload).map_err(InvoiceError::from)?;
        let response = self.transport.send(HttpRequest {
            method: Method::POST,
            url: self.config.invoices_url(),
            content_type: JSON_CONTENT_TYPE.into(),
            accept: Some(JSON_ACCEPT.into()),
            body,
            timeout: self.config.rest_timeout(),
        })?;
        let response = reject_unless_success("json", response)?;

        let body: Value = match serde_json::from_str(&response.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "acknowledgment body is not JSON");
                Value::Null
            }
        };
        let transmission_ref = ["transmissionNo", "id"]
            .iter()
            .find_map(|key| body.get(*key).and_then(scalar_text));
        let resource_link = body
            .pointer("/links/0/href")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(
            status = response.status,
            transmission_ref = transmission_ref.as_deref().unwrap_or(""),
            "resource accepted"
        );
        Ok(JsonAck {
            status: response.status,
            raw: response.body,
            body,
            transmission_ref,
            resource_link,
        })
    }

    /// The invoice resource as the backend currently holds it.
    pub fn fetch_resource(&self, gid: &str) -> Result<Value> {
        let response = self.transport.send(HttpRequest {
            method: Method::GET,
            url: self.resource_url(gid),
            content_type: JSON_CONTENT_TYPE.into(),
            accept: Some(JSON_ACCEPT.into()),
            body: Vec::new(),
            timeout: self.config.rest_timeout(),
        })?;
        let response = resource_unless_failed(gid, response)?;
        debug!(gid, "resource fetched");
        serde_json::from_str(&response.body)
            .map_err(|e| SubmitError::MalformedAcknowledgment(e.to_string()))
    }

    /// Patch fields of an invoice resource.
    ///
    /// Returns the updated resource, or `None` when the backend answers
    /// without a body.
    pub fn update_resource(&self, gid: &str, patch: &Value) -> Result<Option<Value>> {
        let body = serde_json::to_vec(patch).map_err(InvoiceError::from)?;
        let response = self.transport.send(HttpRequest {
            method: Method::PATCH,
            url: self.resource_url(gid),
            content_type: JSON_CONTENT_TYPE.into(),
            accept: Some(JSON_ACCEPT.into()),
            body,
            timeout: self.config.rest_timeout(),
        })?;
        let response = resource_unless_failed(gid, response)?;
        info!(gid, status = response.status, "resource updated");
        if response.body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| SubmitError::MalformedAcknowledgment(e.to_string()))
    }

    /// Backend processing status of a transmission.
    ///
    /// Returns [`NO_TRANSMISSION`] without a network call when there is no
    /// reference, and [`UNKNOWN`] when the bridge answers without a status.
    pub fn fetch_status(&self, transmission_ref: Option<&str>) -> Result<String> {
        let Some(no) = transmission_number(transmission_ref)? else {
            return Ok(NO_TRANSMISSION.into());
        };
        let response = self.query(status_query(no)?)?;
        let status = parse_status(&response.body)
            .map_err(|e| SubmitError::StatusQuery(e.to_string()))?
            .unwrap_or_else(|| UNKNOWN.into());
        info!(transmission_no = no, status = %status, "transmission status");
        Ok(status)
    }

    /// Integration log of a transmission, most recent entry first, one
    /// `CODE : TEXT` line per entry.
    ///
    /// Returns `None` without a network call when there is no reference,
    /// and `None` when the log has no rows yet.
    pub fn fetch_error_report(&self, transmission_ref: Option<&str>) -> Result<Option<String>> {
        let Some(no) = transmission_number(transmission_ref)? else {
            return Ok(None);
        };
        let response = self.query(log_query(no)?)?;
        let mut rows = parse_log_rows(&response.body)
            .map_err(|e| SubmitError::StatusQuery(e.to_string()))?;
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));

        let report: Vec<String> = rows.iter().filter_map(render_log_row).collect();
        debug!(transmission_no = no, rows = report.len(), "error log fetched");
        Ok((!report.is_empty()).then(|| report.join("\n")))
    }

    fn resource_url(&self, gid: &str) -> String {
        format!("{}/{}", self.config.invoices_url(), gid)
    }

    fn query(&self, sql2xml: String) -> Result<HttpResponse> {
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::POST,
                url: self.config.query_url.clone(),
                content_type: XML_CONTENT_TYPE.into(),
                accept: None,
                body: sql2xml.into_bytes(),
                timeout: self.config.query_timeout(),
            })
            .map_err(|e| SubmitError::StatusQuery(e.to_string()))?;
        if !response.is_success() {
            return Err(SubmitError::StatusQuery(format!(
                "bridge answered HTTP {}",
                response.status
            )));
        }
        Ok(response)
    }
}

fn reject_unless_success(channel: &str, response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    warn!(channel, status = response.status, "submission rejected");
    Err(SubmitError::SubmissionRejected {
        status: response.status,
        body: response.body,
    })
}

fn resource_unless_failed(gid: &str, response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    warn!(gid, status = response.status, "resource request failed");
    Err(SubmitError::ResourceRequest {
        status: response.status,
        body: response.body,
    })
}

/// Bridge queries take the numeric transmission number only.
fn transmission_number(transmission_ref: Option<&str>) -> Result<Option<u64>> {
    let Some(r) = transmission_ref.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    r.parse::<u64>().map(Some).map_err(|_| {
        SubmitError::StatusQuery(format!("transmission reference {r:?} is not numeric"))
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn render_log_row(row: &LogRow) -> Option<String> {
    let text = row.text.as_deref().map(decode_message);
    match (row.code.as_deref(), text) {
        (Some(code), Some(text)) => Some(format!("{code} : {text}")),
        (Some(code), None) => Some(code.to_string()),
        (None, Some(text)) => Some(text),
        (None, None) => None,
    }
}

/// Log text is stored either plain or base64 encoded; decode only when the
/// result is printable UTF-8.
fn decode_message(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() < 4 || trimmed.len() % 4 != 0 {
        return trimmed.to_string();
    }
    STANDARD
        .decode(trimmed)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| {
            !s.trim().is_empty()
                && s.chars()
                    .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        })
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OtmConfigBuilder;
    use std::sync::Mutex;

    struct Recorder {
        response: HttpResponse,
        calls: Mutex<Vec<HttpRequest>>,
    }

    impl Recorder {
        fn answering(status: u16, body: &str) -> Self {
            Self {
                response: HttpResponse::new(status, body),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<HttpRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HttpTransport for Recorder {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.calls.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn client(status: u16, body: &str) -> SubmissionClient<Recorder> {
        let config = OtmConfigBuilder::new("https://otm.test", "INTL.U", "pw").build();
        SubmissionClient::new(config, Recorder::answering(status, body))
    }

    #[test]
    fn status_without_reference_makes_no_call() {
        let c = client(200, "");
        assert_eq!(c.fetch_status(None).unwrap(), NO_TRANSMISSION);
        assert_eq!(c.fetch_status(Some("  ")).unwrap(), NO_TRANSMISSION);
        assert!(c.transport().calls().is_empty());
    }

    #[test]
    fn non_numeric_reference_fails_without_call() {
        let c = client(200, "");
        assert!(matches!(
            c.fetch_status(Some("INTL.INV1")),
            Err(SubmitError::StatusQuery(_))
        ));
        assert!(c.transport().calls().is_empty());
    }

    #[test]
    fn status_defaults_to_unknown() {
        let c = client(200, "<sql2xml/>");
        assert_eq!(c.fetch_status(Some("42")).unwrap(), UNKNOWN);
        let calls = c.transport().calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].url.ends_with("command=xmlExport"));
        assert_eq!(calls[0].timeout, std::time::Duration::from_secs(60));
    }

    #[test]
    fn json_rejection_carries_status_and_body() {
        let c = client(500, "boom");
        let err = c.submit_json(&serde_json::json!({"invoiceXid": "X"})).unwrap_err();
        match err {
            SubmitError::SubmissionRejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn json_ack_extracts_reference_and_link() {
        let c = client(
            201,
            r#"{"id": 77, "links": [{"href": "https://otm.test/v2/invoices/INTL.X_abc123"}]}"#,
        );
        let ack = c.submit_json(&serde_json::json!({})).unwrap();
        assert_eq!(ack.transmission_ref.as_deref(), Some("77"));
        assert_eq!(
            ack.resource_link.as_deref(),
            Some("https://otm.test/v2/invoices/INTL.X_abc123")
        );
        let call = &c.transport().calls()[0];
        assert_eq!(call.content_type, JSON_CONTENT_TYPE);
        assert_eq!(call.accept.as_deref(), Some(JSON_ACCEPT));
        assert!(call.url.ends_with("/invoices"));
    }

    #[test]
    fn resource_fetch_is_a_get_on_the_gid() {
        let c = client(200, r#"{"invoiceXid": "X_abc123", "invoiceNumber": "7"}"#);
        let doc = c.fetch_resource("INTL.X_abc123").unwrap();
        assert_eq!(doc["invoiceNumber"], "7");
        let call = &c.transport().calls()[0];
        assert_eq!(call.method, Method::GET);
        assert!(call.url.ends_with("/invoices/INTL.X_abc123"));
        assert!(call.body.is_empty());
        assert_eq!(call.accept.as_deref(), Some(JSON_ACCEPT));
    }

    #[test]
    fn resource_update_is_a_singular_patch() {
        let c = client(204, "");
        let updated = c
            .update_resource("INTL.X_abc123", &serde_json::json!({"invoiceNumber": "8"}))
            .unwrap();
        assert_eq!(updated, None);
        let call = &c.transport().calls()[0];
        assert_eq!(call.method, Method::PATCH);
        assert_eq!(call.content_type, JSON_CONTENT_TYPE);
        assert_eq!(call.body, br#"{"invoiceNumber":"8"}"#.to_vec());
    }

    #[test]
    fn missing_resource_is_reported() {
        let c = client(404, "not found");
        assert!(matches!(
            c.fetch_resource("INTL.GONE"),
            Err(SubmitError::ResourceRequest { status: 404, .. })
        ));
    }

    #[test]
    fn xml_ack_without_reference_is_uncorrelated() {
        let c = client(200, "<html>gateway</html>");
        let ack = c.submit_xml(b"<x/>").unwrap();
        assert_eq!(ack.transmission_ref, None);
        assert_eq!(ack.raw, "<html>gateway</html>");
    }

    #[test]
    fn log_text_is_decoded_when_base64() {
        // "Invalid cost type"
        assert_eq!(decode_message("SW52YWxpZCBjb3N0IHR5cGU="), "Invalid cost type");
        assert_eq!(decode_message("plain text message"), "plain text message");
        assert_eq!(decode_message("ABCD"), "ABCD");
    }

    #[test]
    fn report_orders_newest_first() {
        let c = client(
            200,
            r#"<sql2xml><I_LOG>
                <I_LOG I_LOG_SEQNO="1" I_MESSAGE_CODE="W1" I_MESSAGE_TEXT="older"/>
                <I_LOG I_LOG_SEQNO="3" I_MESSAGE_CODE="E9" I_MESSAGE_TEXT="SW52YWxpZCBjb3N0IHR5cGU="/>
            </I_LOG></sql2xml>"#,
        );
        let report = c.fetch_error_report(Some("5")).unwrap().unwrap();
        assert_eq!(report, "E9 : Invalid cost type\nW1 : older");
    }
}
