use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use indexmap::IndexMap;
use std::fmt;

pub use crate::error::TransportError;

/// One HTTP request as handed to the transport collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
}

impl WireRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        WireRequest {
            method,
            url: url.into(),
            headers: IndexMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The raw HTTP response; an error status is still a response.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        WireResponse {
            status,
            headers: IndexMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}

/// Sends one request. Network failures and timeouts are `TransportError`s;
/// HTTP error statuses are returned as responses.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;
}

/// Supplies request headers (tokens, digests) on demand.
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    async fn headers(&self) -> Result<Vec<(String, String)>, TransportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn headers(&self) -> Result<Vec<(String, String)>, TransportError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnreachableTransport;

#[cfg(test)]
#[async_trait]
impl Transport for UnreachableTransport {
    async fn send(&self, _request: WireRequest) -> Result<WireResponse, TransportError> {
        Err(TransportError::Connect("no network in unit tests".into()))
    }
}
