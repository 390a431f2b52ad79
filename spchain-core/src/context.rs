use crate::batch::Batch;
use crate::node::ResourceNode;
use crate::protocol::transport::{AuthProvider, NoAuth, Transport};
use crate::protocol::Protocol;
use std::sync::Arc;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Everything a batch needs to reach the service: the web url, the transport
/// collaborator and the authentication provider.
#[derive(Debug)]
pub struct ServiceContext {
    base_url: String,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    max_batch_size: usize,
}

impl ServiceContext {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        ServiceContext {
            base_url,
            transport,
            auth: Arc::new(NoAuth),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<web>/_api`
    pub fn api_root(&self) -> String {
        format!("{}/_api", self.base_url)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Root node of the REST surface.
    pub fn rest_root(self: &Arc<Self>) -> ResourceNode {
        ResourceNode::root(self.clone(), Protocol::Rest)
    }

    /// Root node of the client-svc surface.
    pub fn client_svc_root(self: &Arc<Self>) -> ResourceNode {
        ResourceNode::root(self.clone(), Protocol::ClientSvc)
    }

    /// Open a deferred batch against this context.
    pub fn batch(self: &Arc<Self>, protocol: Protocol) -> Batch {
        Batch::open(self.clone(), protocol)
    }
}
