use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Domain used when the input names none.
pub const DEFAULT_DOMAIN: &str = "INTL";

/// Currency used when the input names none.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Connection settings for the transportation-management backend.
///
/// Injected into the submission client at construction; builders and
/// serializers only ever see [`InvoiceDefaults`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtmConfig {
    /// XML intake servlet (`.../GC3/glog.integration.servlet.WMServlet`).
    pub xml_url: String,
    /// REST resource base (`.../logisticsRestApi/resources-int/v2`).
    pub rest_url: String,
    /// SQL-over-XML bridge (`.../glog.integration.servlet.DBXMLServlet?command=xmlExport`).
    pub query_url: String,
    /// Basic-auth user, usually `DOMAIN.USER`.
    pub username: String,
    pub password: String,
    pub default_domain: String,
    pub default_currency: String,
    /// Timeout of the XML intake call, seconds.
    pub xml_timeout_secs: u64,
    /// Timeout of REST calls, seconds.
    pub rest_timeout_secs: u64,
    /// Timeout of status and log queries, seconds.
    pub query_timeout_secs: u64,
}

impl Default for OtmConfig {
    fn default() -> Self {
        Self {
            xml_url: String::new(),
            rest_url: String::new(),
            query_url: String::new(),
            username: String::new(),
            password: String::new(),
            default_domain: DEFAULT_DOMAIN.into(),
            default_currency: DEFAULT_CURRENCY.into(),
            xml_timeout_secs: 120,
            rest_timeout_secs: 120,
            query_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for OtmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtmConfig")
            .field("xml_url", &self.xml_url)
            .field("rest_url", &self.rest_url)
            .field("query_url", &self.query_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("default_domain", &self.default_domain)
            .field("default_currency", &self.default_currency)
            .field("xml_timeout_secs", &self.xml_timeout_secs)
            .field("rest_timeout_secs", &self.rest_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

impl OtmConfig {
    /// REST endpoint invoices are posted to.
    pub fn invoices_url(&self) -> String {
        format!("{}/invoices", self.rest_url.trim_end_matches('/'))
    }

    pub fn xml_timeout(&self) -> Duration {
        Duration::from_secs(self.xml_timeout_secs)
    }

    pub fn rest_timeout(&self) -> Duration {
        Duration::from_secs(self.rest_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Header defaults for the invoice builder.
    pub fn invoice_defaults(&self) -> InvoiceDefaults {
        InvoiceDefaults {
            domain: self.default_domain.clone(),
            currency: self.default_currency.clone(),
        }
    }
}

/// Builder for [`OtmConfig`].
///
/// # Example
///
/// ```
/// use otm_invoice::core::OtmConfigBuilder;
///
/// let config = OtmConfigBuilder::new("https://otm.example.com", "INTL.INT01", "secret")
///     .default_currency("USD")
///     .build();
/// assert_eq!(config.invoices_url(), "https://otm.example.com/logisticsRestApi/resources-int/v2/invoices");
/// ```
pub struct OtmConfigBuilder {
    config: OtmConfig,
}

impl OtmConfigBuilder {
    /// Derive all endpoints from the backend host URL.
    pub fn new(
        host: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let host = host.as_ref().trim_end_matches('/');
        Self {
            config: OtmConfig {
                xml_url: format!("{host}/GC3/glog.integration.servlet.WMServlet"),
                rest_url: format!("{host}/logisticsRestApi/resources-int/v2"),
                query_url: format!(
                    "{host}/GC3/glog.integration.servlet.DBXMLServlet?command=xmlExport"
                ),
                username: username.into(),
                password: password.into(),
                ..Default::default()
            },
        }
    }

    pub fn xml_url(mut self, url: impl Into<String>) -> Self {
        self.config.xml_url = url.into();
        self
    }

    pub fn rest_url(mut self, url: impl Into<String>) -> Self {
        self.config.rest_url = url.into();
        self
    }

    pub fn query_url(mut self, url: impl Into<String>) -> Self {
        self.config.query_url = url.into();
        self
    }

    pub fn default_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.default_domain = domain.into();
        self
    }

    pub fn default_currency(mut self, currency: impl Into<String>) -> Self {
        self.config.default_currency = currency.into();
        self
    }

    pub fn xml_timeout(mut self, timeout: Duration) -> Self {
        self.config.xml_timeout_secs = timeout.as_secs();
        self
    }

    pub fn rest_timeout(mut self, timeout: Duration) -> Self {
        self.config.rest_timeout_secs = timeout.as_secs();
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout_secs = timeout.as_secs();
        self
    }

    pub fn build(self) -> OtmConfig {
        self.config
    }
}

/// Header values the builder falls back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDefaults {
    pub domain: String,
    pub currency: String,
}

impl Default for InvoiceDefaults {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.into(),
            currency: DEFAULT_CURRENCY.into(),
        }
    }
}
