//! Batch coordinator: accumulates actions from any number of nodes sharing a
//! batch scope, sends them as one composite request, and routes sub-result
//! `i` to the continuation of action `i`.

use crate::action::{ActionHandle, ActionRequest, Operation, PendingAction};
use crate::context::ServiceContext;
use crate::error::{CompositionError, SpError};
use crate::ids::{next_batch_id, ActionId, BatchId};
use crate::node::ResourceNode;
use crate::protocol::{ExecutionMode, Protocol, SubResult};
use crate::resolver::{PathAnchor, ReferenceResolver};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Open,
    Executing,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Open => "open",
            BatchStatus::Executing => "executing",
            BatchStatus::Completed => "completed",
        }
    }
}

enum BatchState {
    Open(Vec<PendingAction>),
    Executing,
    Completed,
}

impl BatchState {
    fn status(&self) -> BatchStatus {
        match self {
            BatchState::Open(_) => BatchStatus::Open,
            BatchState::Executing => BatchStatus::Executing,
            BatchState::Completed => BatchStatus::Completed,
        }
    }
}

struct BatchInner {
    id: BatchId,
    protocol: Protocol,
    mode: ExecutionMode,
    context: Arc<ServiceContext>,
    state: Mutex<BatchState>,
}

/// An ordered group of actions submitted as one composite request.
/// Single-use: open → executing → completed.
#[derive(Clone)]
pub struct Batch {
    inner: Arc<BatchInner>,
}

/// Marks the batch completed however `execute` ends, including when its
/// future is dropped mid-flight.
struct CompletionGuard<'a>(&'a BatchInner);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        *self.0.state.lock() = BatchState::Completed;
    }
}

impl Batch {
    pub fn open(context: Arc<ServiceContext>, protocol: Protocol) -> Batch {
        Self::with_mode(context, protocol, ExecutionMode::Deferred)
    }

    pub(crate) fn immediate(context: Arc<ServiceContext>, protocol: Protocol) -> Batch {
        Self::with_mode(context, protocol, ExecutionMode::Immediate)
    }

    fn with_mode(context: Arc<ServiceContext>, protocol: Protocol, mode: ExecutionMode) -> Batch {
        Batch {
            inner: Arc::new(BatchInner {
                id: next_batch_id(),
                protocol,
                mode,
                context,
                state: Mutex::new(BatchState::Open(Vec::new())),
            }),
        }
    }

    pub fn id(&self) -> BatchId {
        self.inner.id
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.protocol
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.mode
    }

    pub fn status(&self) -> BatchStatus {
        self.inner.state.lock().status()
    }

    /// Number of actions waiting; zero once execution has started.
    pub fn len(&self) -> usize {
        match &*self.inner.state.lock() {
            BatchState::Open(actions) => actions.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn limit(&self) -> usize {
        match self.inner.mode {
            ExecutionMode::Immediate => 1,
            ExecutionMode::Deferred => self.inner.context.max_batch_size(),
        }
    }

    /// Fails with `BatchFull` unless `count` more actions fit right now.
    ///
    /// Lets a caller that enqueues several related actions refuse up front
    /// instead of leaving some of them queued. A closed batch passes; the
    /// following `add` reports it.
    pub fn ensure_room(&self, count: usize) -> Result<(), SpError> {
        let state = self.inner.state.lock();
        let BatchState::Open(actions) = &*state else {
            return Ok(());
        };
        let limit = self.limit();
        if actions.len() + count > limit {
            return Err(CompositionError::BatchFull {
                batch: self.inner.id,
                limit,
            }
            .into());
        }
        Ok(())
    }

    /// Append an action targeting `node`. Nothing is sent.
    pub fn add(&self, node: &ResourceNode, request: ActionRequest) -> Result<ActionHandle<Value>, SpError> {
        let mut state = self.inner.state.lock();
        let actions = match &mut *state {
            BatchState::Open(actions) => actions,
            other => {
                return Err(CompositionError::BatchClosed {
                    batch: self.inner.id,
                    state: other.status().as_str(),
                }
                .into())
            }
        };

        let limit = self.limit();
        if actions.len() >= limit {
            return Err(CompositionError::BatchFull {
                batch: self.inner.id,
                limit,
            }
            .into());
        }

        let id = ActionId::new(actions.len() as u32);
        self.check_target(id, node, &request)?;

        let (action, receiver) = PendingAction::new(self.inner.id, id, node.clone(), request);
        let produced = action.produced().cloned();
        actions.push(action);
        trace!(batch = %self.inner.id, action = %id, "Action enqueued");

        Ok(ActionHandle::new(id, self.clone(), self.inner.mode, produced, receiver))
    }

    /// Composition-time checks, so nothing invalid ever reaches the network.
    fn check_target(&self, id: ActionId, node: &ResourceNode, request: &ActionRequest) -> Result<(), SpError> {
        let operation_protocol = match request.operation {
            Operation::Rest(_) => Protocol::Rest,
            Operation::ClientSvc(_) => Protocol::ClientSvc,
        };
        for protocol in [node.protocol(), operation_protocol] {
            if protocol != self.inner.protocol {
                return Err(CompositionError::ProtocolMismatch {
                    node: protocol.as_str(),
                    batch: self.inner.protocol.as_str(),
                }
                .into());
            }
        }

        match self.inner.protocol {
            Protocol::Rest => node.resolve_address().map(|_| ()),
            Protocol::ClientSvc => match node.object_path()?.anchor {
                PathAnchor::Root => Ok(()),
                PathAnchor::Produced { batch, action } if batch == self.inner.id && action < id => Ok(()),
                PathAnchor::Produced { action, .. } => Err(CompositionError::DependencyOrder {
                    batch: self.inner.id,
                    action: id,
                    referenced: action,
                }
                .into()),
            },
        }
    }

    /// Send every queued action as one composite request and deliver each
    /// result to its continuation in submission order.
    ///
    /// Batch-fatal failures (reference resolution, transport, protocol) are
    /// delivered to every continuation and also returned. Otherwise the
    /// per-action outcomes are returned in submission order.
    pub async fn execute(&self) -> Result<Vec<Result<Value, SpError>>, SpError> {
        let actions = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, BatchState::Executing) {
                BatchState::Open(actions) => actions,
                other => {
                    let status = other.status();
                    *state = other;
                    return Err(SpError::InvalidState(format!(
                        "{} is {} and cannot execute again",
                        self.inner.id,
                        status.as_str()
                    )));
                }
            }
        };
        let _guard = CompletionGuard(&self.inner);

        if actions.is_empty() {
            debug!(batch = %self.inner.id, "Empty batch, nothing to send");
            return Ok(Vec::new());
        }

        debug!(
            batch = %self.inner.id,
            protocol = %self.inner.protocol,
            actions = actions.len(),
            "Executing batch"
        );

        match self.dispatch(&actions).await {
            Ok(results) => Ok(actions
                .into_iter()
                .zip(results)
                .map(|(action, result)| action.complete(result))
                .collect()),
            Err(err) => {
                warn!(batch = %self.inner.id, error = %err, "Batch failed as a whole");
                for action in actions {
                    action.fail(err.clone());
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, actions: &[PendingAction]) -> Result<Vec<SubResult>, SpError> {
        let context = &self.inner.context;
        let resolved = ReferenceResolver::resolve(self.inner.id, self.inner.protocol, actions)?;

        let adapter = self.inner.protocol.adapter();
        let mut encoded = adapter.serialize(context.base_url(), resolved, self.inner.mode)?;
        for (name, value) in context.auth().headers().await? {
            encoded.request.headers.insert(name, value);
        }

        debug!(
            batch = %self.inner.id,
            method = %encoded.request.method,
            url = %encoded.request.url,
            "Sending request"
        );
        trace!("Request body:\n{}", encoded.request.body_text());

        let response = context.transport().send(encoded.request).await?;
        debug!(batch = %self.inner.id, status = %response.status, "Received response");
        trace!("Response body:\n{}", String::from_utf8_lossy(&response.body));

        let results = adapter.deserialize(response, &encoded.slots, self.inner.mode)?;
        if results.len() != actions.len() {
            return Err(SpError::protocol(format!(
                "expected {} sub-results, received {}",
                actions.len(),
                results.len()
            )));
        }
        Ok(results)
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.inner.id)
            .field("protocol", &self.inner.protocol)
            .field("mode", &self.inner.mode)
            .field("status", &self.status())
            .finish()
    }
}
