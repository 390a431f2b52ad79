use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;
use reqwest::Client;
use spchain_core::protocol::{Transport, TransportError, WireRequest, WireResponse};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `Transport` over a shared reqwest client. HTTP error statuses come back as
/// responses; only failures to obtain a response are errors.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        HttpTransport { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let WireRequest {
            method,
            url,
            headers,
            body,
        } = request;

        debug!(%method, %url, "sending HTTP request");
        let response = self
            .client
            .request(method.clone(), &url)
            .headers(header_map(&headers)?)
            .body(body)
            .send()
            .await
            .map_err(map_error)?;

        let status = response.status();
        debug!(%method, %url, %status, "received HTTP response");

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect::<IndexMap<_, _>>();
        let body: Bytes = response.bytes().await.map_err(map_error)?;

        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

fn header_map(headers: &IndexMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Other(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Other(format!("invalid value for header '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::Io(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            default_headers: Vec::new(),
        }
    }
}

impl HttpTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let mut builder = Client::builder().timeout(self.timeout);

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if !self.default_headers.is_empty() {
            let headers: IndexMap<String, String> = self.default_headers.into_iter().collect();
            builder = builder.default_headers(header_map(&headers)?);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpTransport { client })
    }
}
