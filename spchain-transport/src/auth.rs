use async_trait::async_trait;
use spchain_core::protocol::{AuthProvider, TransportError};

/// Sends no credentials.
pub type AnonymousProvider = spchain_core::protocol::NoAuth;

/// Adds `Authorization: Bearer <token>` to every request. Token acquisition
/// and refresh happen elsewhere.
#[derive(Clone)]
pub struct BearerTokenProvider {
    token: String,
}

impl BearerTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        BearerTokenProvider { token: token.into() }
    }
}

impl std::fmt::Debug for BearerTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenProvider").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl AuthProvider for BearerTokenProvider {
    async fn headers(&self) -> Result<Vec<(String, String)>, TransportError> {
        if self.token.trim().is_empty() {
            return Err(TransportError::Auth("bearer token is empty".into()));
        }
        Ok(vec![("Authorization".to_string(), format!("Bearer {}", self.token))])
    }
}

/// Fixed headers, e.g. a request digest or a cookie obtained out of band.
#[derive(Debug, Clone, Default)]
pub struct StaticHeadersProvider {
    headers: Vec<(String, String)>,
}

impl StaticHeadersProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl AuthProvider for StaticHeadersProvider {
    async fn headers(&self) -> Result<Vec<(String, String)>, TransportError> {
        Ok(self.headers.clone())
    }
}
