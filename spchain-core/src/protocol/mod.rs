//! Execution protocol adapters: turn an ordered list of resolved actions into
//! one wire request and the response back into sub-results in the same order.

pub mod client_svc;
pub mod rest_batch;
pub mod transport;

pub use client_svc::ClientSvcAdapter;
pub use rest_batch::RestBatchAdapter;
pub use transport::{AuthProvider, NoAuth, Transport, TransportError, WireRequest, WireResponse};

use crate::error::{BusinessError, SpError};
use crate::ids::ActionId;
use crate::resolver::ResolvedBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The remote surface a chain or batch speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// `<web>/_api/...` with `$batch` composites
    Rest,
    /// `<web>/_vti_bin/client.svc/ProcessQuery` XML action arrays
    ClientSvc,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rest => "rest",
            Protocol::ClientSvc => "client_svc",
        }
    }

    pub fn adapter(&self) -> &'static dyn ProtocolAdapter {
        match self {
            Protocol::Rest => &RestBatchAdapter,
            Protocol::ClientSvc => &ClientSvcAdapter,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immediate batches hold the single action of a non-batched terminal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Immediate,
    Deferred,
}

/// Outcome of one action as read from the composite response.
pub type SubResult = Result<Value, BusinessError>;

/// Where the result of one action is expected in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSlot {
    pub action: ActionId,
    /// Label the wire format echoes back with the result, if it has one.
    pub label: Option<u32>,
    /// Label of a bookkeeping entry that precedes the result, such as the
    /// instantiation of a created object.
    pub internal: Option<u32>,
    /// The service may omit the result entirely; it then reads as `null`.
    pub optional: bool,
}

impl ResponseSlot {
    /// Result found by position alone.
    pub fn positional(action: ActionId) -> Self {
        ResponseSlot {
            action,
            label: None,
            internal: None,
            optional: false,
        }
    }

    pub fn labelled(action: ActionId, label: u32) -> Self {
        ResponseSlot {
            label: Some(label),
            ..Self::positional(action)
        }
    }
}

/// A serialized batch together with the slots its response must fill.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub request: WireRequest,
    pub slots: Vec<ResponseSlot>,
}

pub trait ProtocolAdapter: Send + Sync {
    fn serialize(
        &self,
        base_url: &str,
        batch: ResolvedBatch,
        mode: ExecutionMode,
    ) -> Result<EncodedBatch, SpError>;

    /// Must return exactly one sub-result per slot, in slot order, or fail
    /// the whole batch.
    fn deserialize(
        &self,
        response: WireResponse,
        slots: &[ResponseSlot],
        mode: ExecutionMode,
    ) -> Result<Vec<SubResult>, SpError>;
}

/// Pull a business error out of a JSON error payload in any of the shapes the
/// service uses (`odata.error`, `error`, client-svc `ErrorInfo`).
pub(crate) fn business_error_from_json(status: Option<u16>, body: &Value) -> Option<BusinessError> {
    let error = body
        .get("odata.error")
        .or_else(|| body.get("error"))
        .or_else(|| body.get("ErrorInfo"))
        .filter(|e| !e.is_null())?;

    let message = error
        .get("message")
        .and_then(|m| m.get("value").or(Some(m)))
        .and_then(Value::as_str)
        .or_else(|| error.get("ErrorMessage").and_then(Value::as_str))
        .unwrap_or("Unknown error");
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .or_else(|| error.get("ErrorTypeName").and_then(Value::as_str));

    let mut err = BusinessError::new(message);
    err.status = status;
    err.code = code.map(str::to_string);
    err.data = Some(error.clone());
    Some(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_odata_error_shapes() {
        let verbose = json!({"odata.error": {"code": "-1, System.ArgumentException", "message": {"lang": "en-US", "value": "bad arg"}}});
        let err = business_error_from_json(Some(400), &verbose).unwrap();
        assert_eq!(err.message, "bad arg");
        assert_eq!(err.code.as_deref(), Some("-1, System.ArgumentException"));
        assert_eq!(err.status, Some(400));

        let plain = json!({"error": {"code": "itemNotFound", "message": "gone"}});
        assert_eq!(business_error_from_json(Some(404), &plain).unwrap().message, "gone");

        let csom = json!({"ErrorInfo": {"ErrorMessage": "Term not found", "ErrorTypeName": "Microsoft.SharePoint.Taxonomy.TermStoreOperationException"}});
        let err = business_error_from_json(None, &csom).unwrap();
        assert_eq!(err.message, "Term not found");
        assert!(err.code.unwrap().ends_with("TermStoreOperationException"));

        assert!(business_error_from_json(None, &json!({"ErrorInfo": null})).is_none());
        assert!(business_error_from_json(None, &json!({"Title": "x"})).is_none());
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::Rest.to_string(), "rest");
        assert_eq!(serde_json::to_string(&Protocol::ClientSvc).unwrap(), "\"client_svc\"");
    }
}
