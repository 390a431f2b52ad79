// spchain client
// Entry point binding a service context to the typed resource graph:
// - REST chains start at `web()` / `site()`
// - taxonomy chains speak client-svc
// - `create_batch` opens a deferred batch for either protocol

use crate::config::ClientConfig;
use crate::resources::{Site, Taxonomy, Web};
use anyhow::{Context, Result};
use spchain_core::protocol::{AuthProvider, Transport};
use spchain_core::{Batch, Protocol, ResourceNode, ServiceContext};
use spchain_transport::{AnonymousProvider, BearerTokenProvider, HttpTransport};
use std::sync::Arc;
use tracing::debug;

/// Main client for one web.
#[derive(Debug, Clone)]
pub struct SpClient {
    config: ClientConfig,
    context: Arc<ServiceContext>,
}

impl SpClient {
    /// Create a client talking HTTP with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().context("Invalid client configuration")?;

        let transport = HttpTransport::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP transport")?;

        let auth: Arc<dyn AuthProvider> = match &config.bearer_token {
            Some(token) => Arc::new(BearerTokenProvider::new(token.clone())),
            None => Arc::new(AnonymousProvider::default()),
        };

        Ok(Self::with_transport(config, Arc::new(transport), auth))
    }

    /// Create a client with default configuration for `url`
    pub fn new_with_url(url: &str) -> Result<Self> {
        Self::new(ClientConfig::new_with_url(url))
    }

    /// Create a client on top of caller-supplied collaborators.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>, auth: Arc<dyn AuthProvider>) -> Self {
        let context = ServiceContext::new(config.url.clone(), transport)
            .with_auth(auth)
            .with_max_batch_size(config.max_batch_size);
        debug!(url = %context.base_url(), "Client created");

        Self {
            config,
            context: Arc::new(context),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    /// `<web>/_api/web`
    pub fn web(&self) -> Web {
        Web::from_node(self.rest_root().path("web"))
    }

    /// `<web>/_api/site`
    pub fn site(&self) -> Site {
        Site::from_node(self.rest_root().path("site"))
    }

    /// Taxonomy entry point over client-svc.
    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::from_node(self.client_svc_root())
    }

    /// Open a deferred batch. Attach chains with `in_batch`, then `execute`.
    pub fn create_batch(&self, protocol: Protocol) -> Batch {
        self.context.batch(protocol)
    }

    pub fn rest_root(&self) -> ResourceNode {
        self.context.rest_root()
    }

    pub fn client_svc_root(&self) -> ResourceNode {
        self.context.client_svc_root()
    }
}
