use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use super::error::{Result, SubmitError};
use crate::core::OtmConfig;

/// One outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Content type of `body`; ignored when the body is empty.
    pub content_type: String,
    pub accept: Option<String>,
    pub body: Vec<u8>,
    /// Hard client-side timeout of this call.
    pub timeout: Duration,
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The single blocking call the submission client needs.
///
/// A non-2xx status is a response, not an error; `Err` means no response
/// was obtained at all.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] over a blocking reqwest client with basic auth.
pub struct ReqwestTransport {
    client: Client,
    username: String,
    password: String,
}

impl ReqwestTransport {
    /// Create a transport authenticating with the configured credentials.
    pub fn new(config: &OtmConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, bytes = request.body.len(), "request");

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(request.timeout);
        if !request.body.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, request.content_type.as_str())
                .body(request.body);
        }
        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }

        let response = builder
            .send()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        debug!(url = %request.url, status, "response received");
        Ok(HttpResponse { status, body })
    }
}
