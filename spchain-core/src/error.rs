use crate::ids::{ActionId, BatchId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A failure reported by the remote service for one specific action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessError {
    /// HTTP status of the sub-response, when the wire format carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Service error code (`-2147024894, System.IO.FileNotFoundException`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl BusinessError {
    pub fn new(message: impl Into<String>) -> Self {
        BusinessError {
            status: None,
            code: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        BusinessError {
            status: Some(status),
            ..Self::new(message)
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(404, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "[{} {}] {}", status, code, self.message),
            (Some(status), None) => write!(f, "[{}] {}", status, self.message),
            (None, Some(code)) => write!(f, "[{}] {}", code, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BusinessError {}

/// Errors raised while composing actions, before anything reaches the network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("{batch} is {state} and no longer accepts actions")]
    BatchClosed { batch: BatchId, state: &'static str },
    #[error("{batch} already holds {limit} actions")]
    BatchFull { batch: BatchId, limit: usize },
    #[error("action {action} references {referenced}, which does not precede it in {batch}")]
    DependencyOrder {
        batch: BatchId,
        action: ActionId,
        referenced: ActionId,
    },
    #[error("object produced by {action} of {batch} has no resolved identity yet")]
    UnresolvedReference { batch: BatchId, action: ActionId },
    #[error("protocol mismatch: node speaks {node}, batch speaks {batch}")]
    ProtocolMismatch {
        node: &'static str,
        batch: &'static str,
    },
    #[error("invalid modifier: {0}")]
    InvalidModifier(String),
}

/// Failures of the transport collaborator: the request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

/// Every way an action can fail. Cloneable because a batch-fatal failure is
/// delivered to each pending continuation of that batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpError {
    #[error("composition error: {0}")]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("request failed: {0}")]
    Business(BusinessError),
    #[error("service rejected the batch: {0}")]
    Service(BusinessError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("action was canceled before a result was delivered")]
    Canceled,
    #[error("failed to parse result: {0}")]
    Parse(String),
}

impl SpError {
    pub fn protocol(message: impl Into<String>) -> Self {
        SpError::Protocol(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        SpError::Configuration(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        SpError::Parse(message.into())
    }

    pub fn is_composition(&self) -> bool {
        matches!(self, SpError::Composition(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SpError::Transport(_))
    }

    /// The business error attributed to this action, if that is what failed it.
    pub fn business(&self) -> Option<&BusinessError> {
        match self {
            SpError::Business(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BusinessError> for SpError {
    fn from(err: BusinessError) -> Self {
        SpError::Business(err)
    }
}

impl From<serde_json::Error> for SpError {
    fn from(err: serde_json::Error) -> Self {
        SpError::Parse(format!("JSON error: {}", err))
    }
}
