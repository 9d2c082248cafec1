use std::time::Duration;

use reqwest::Client;

use crate::error::{Error, Result};
use crate::libxml2::XmlDocument;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: format!("drupal-info/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Per-request options, forwarded to the transport without interpretation.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra request headers as name/value pairs
    pub headers: Vec<(String, String)>,
    /// Query string pairs appended to the URL
    pub query: Vec<(String, String)>,
    /// Per-request timeout overriding the client-wide one
    pub timeout: Option<Duration>,
}

/// HTTP client whose GET responses are parsed as XML.
///
/// Composes over a `reqwest::Client` rather than extending it: the
/// transport decides what counts as a transport failure, this type only
/// layers the body-to-document step on top.
pub struct XmlHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl XmlHttpClient {
    /// Create a new client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(Error::from)?;

        Ok(Self { client, config })
    }

    /// Wrap an already-configured transport.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            config: HttpClientConfig::default(),
        }
    }

    /// GET `url` and parse the response body as XML.
    ///
    /// An empty body is normalized to `<root />` so that it parses to a
    /// single empty root element. Transport errors and non-success
    /// statuses surface unchanged; a body that does not parse fails with
    /// [`Error::XmlParse`].
    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<XmlDocument> {
        let mut request = self.client.get(url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            });
        }

        let body = response.text().await?;
        let body = if body.is_empty() { "<root />" } else { body.as_str() };
        XmlDocument::parse(body)
    }

    /// Get the underlying reqwest client (for advanced usage)
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
