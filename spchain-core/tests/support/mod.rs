#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use spchain_core::protocol::{Transport, TransportError, WireRequest, WireResponse};
use spchain_core::ServiceContext;
use std::collections::VecDeque;
use std::sync::Arc;

pub const SITE: &str = "https://contoso.example/sites/dev";

/// Transport that replays queued outcomes and records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<WireResponse, TransportError>>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: WireResponse) {
        self.outcomes.lock().push_back(Ok(response));
    }

    pub fn fail(&self, err: TransportError) {
        self.outcomes.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        self.requests.lock().push(request);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response".into())))
    }
}

/// Transport whose requests never complete.
#[derive(Debug, Default)]
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn send(&self, _request: WireRequest) -> Result<WireResponse, TransportError> {
        std::future::pending().await
    }
}

pub fn context(transport: &Arc<ScriptedTransport>) -> Arc<ServiceContext> {
    Arc::new(ServiceContext::new(SITE, transport.clone()))
}

/// Multipart `$batch` response body with one part per `(status, body)`.
pub fn multipart(parts: &[(u16, &str)]) -> String {
    let mut out = String::new();
    for (status, body) in parts {
        out.push_str("--batchresponse_test\r\n");
        out.push_str("Content-Type: application/http\r\n");
        out.push_str("Content-Transfer-Encoding: binary\r\n\r\n");
        out.push_str(&format!("HTTP/1.1 {} {}\r\n", status, reason(*status)));
        out.push_str("CONTENT-TYPE: application/json;odata=verbose;charset=utf-8\r\n\r\n");
        out.push_str(body);
        out.push_str("\r\n");
    }
    out.push_str("--batchresponse_test--\r\n");
    out
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        404 => "Not Found",
        _ => "Status",
    }
}
