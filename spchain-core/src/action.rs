//! Pending actions, their continuations, and the queue that routes a terminal
//! operation either into an open batch or into a single-action batch.

use crate::batch::Batch;
use crate::error::SpError;
use crate::ids::{ActionId, BatchId};
use crate::node::{Arg, ProducedRef, ResourceNode};
use crate::protocol::{ExecutionMode, SubResult};
use futures::future::BoxFuture;
use http::Method;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Read,
    Create,
    Update,
    Delete,
    Invoke,
}

/// A REST sub-request. The url comes from the target node.
#[derive(Debug, Clone, PartialEq)]
pub struct RestOperation {
    pub method: Method,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
}

impl RestOperation {
    pub fn get() -> Self {
        RestOperation {
            method: Method::GET,
            headers: IndexMap::new(),
            body: None,
        }
    }

    pub fn post(body: Option<Value>) -> Self {
        RestOperation {
            method: Method::POST,
            headers: IndexMap::new(),
            body,
        }
    }

    /// `POST` tunnelled as `MERGE`, matching any etag.
    pub fn merge(body: Value) -> Self {
        Self::post(Some(body))
            .header("IF-MATCH", "*")
            .header("X-HTTP-Method", "MERGE")
    }

    /// `POST` tunnelled as `DELETE`, matching any etag.
    pub fn delete() -> Self {
        Self::post(None)
            .header("IF-MATCH", "*")
            .header("X-HTTP-Method", "DELETE")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

/// A client-svc action against the target object path.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientSvcOperation {
    /// Load the object, all scalar properties or the listed ones.
    Query { properties: Vec<String> },
    /// Call a method on the object; its return value is the result.
    Method { name: String, params: Vec<Arg> },
    SetProperty { name: String, value: Arg },
    /// Instantiate the object the target's last step creates, then load it.
    /// The created object receives an in-batch token later actions can target.
    Create { properties: Vec<String> },
}

impl ClientSvcOperation {
    pub fn query() -> Self {
        ClientSvcOperation::Query {
            properties: Vec::new(),
        }
    }

    pub fn method<I, A>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        ClientSvcOperation::Method {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn set_property(name: impl Into<String>, value: impl Into<Arg>) -> Self {
        ClientSvcOperation::SetProperty {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Rest(RestOperation),
    ClientSvc(ClientSvcOperation),
}

/// Maps the result of a successful create to a stable node addressing the
/// created object.
pub type IdentityFn = Arc<dyn Fn(&Value) -> Option<ResourceNode> + Send + Sync>;

/// What a terminal operation asks the queue to run.
#[derive(Clone)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub operation: Operation,
    pub identity: Option<IdentityFn>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, operation: Operation) -> Self {
        ActionRequest {
            kind,
            operation,
            identity: None,
        }
    }

    pub fn rest(kind: ActionKind, operation: RestOperation) -> Self {
        Self::new(kind, Operation::Rest(operation))
    }

    pub fn client_svc(kind: ActionKind, operation: ClientSvcOperation) -> Self {
        Self::new(kind, Operation::ClientSvc(operation))
    }

    pub fn with_identity<F>(mut self, identity: F) -> Self
    where
        F: Fn(&Value) -> Option<ResourceNode> + Send + Sync + 'static,
    {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Whether the action brings a new remote object into existence.
    pub fn produces_object(&self) -> bool {
        self.kind == ActionKind::Create
    }
}

impl fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRequest")
            .field("kind", &self.kind)
            .field("operation", &self.operation)
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

type Continuation = oneshot::Sender<Result<Value, SpError>>;

/// An enqueued action waiting for its batch to execute.
#[derive(Debug)]
pub struct PendingAction {
    id: ActionId,
    target: ResourceNode,
    request: ActionRequest,
    produced: Option<ProducedRef>,
    continuation: Continuation,
}

impl PendingAction {
    /// Build an action and the handle its result will be delivered to.
    pub fn new(
        batch: BatchId,
        id: ActionId,
        target: ResourceNode,
        request: ActionRequest,
    ) -> (PendingAction, oneshot::Receiver<Result<Value, SpError>>) {
        let produced = request.produces_object().then(|| {
            ProducedRef::new(batch, id, target.protocol(), target.context())
        });
        let (tx, rx) = oneshot::channel();
        let action = PendingAction {
            id,
            // the target must not keep its batch alive from inside that batch
            target: target.unbatched(),
            request,
            produced,
            continuation: tx,
        };
        (action, rx)
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn target(&self) -> &ResourceNode {
        &self.target
    }

    pub fn request(&self) -> &ActionRequest {
        &self.request
    }

    pub fn produced(&self) -> Option<&ProducedRef> {
        self.produced.as_ref()
    }

    /// Deliver the sub-result for this action, writing back the identity of a
    /// created object first. Returns what was delivered.
    pub(crate) fn complete(self, result: SubResult) -> Result<Value, SpError> {
        let outcome = match result {
            Ok(value) => {
                if let (Some(produced), Some(identity)) = (&self.produced, &self.request.identity) {
                    if let Some(node) = identity(&value) {
                        produced.resolve(node);
                    }
                }
                Ok(value)
            }
            Err(err) => Err(SpError::Business(err)),
        };
        self.deliver(outcome.clone());
        outcome
    }

    /// Fail this action with a batch-wide error.
    pub(crate) fn fail(self, err: SpError) {
        self.deliver(Err(err));
    }

    fn deliver(self, outcome: Result<Value, SpError>) {
        if self.continuation.send(outcome).is_err() {
            trace!(action = %self.id, "Continuation dropped before delivery");
        }
    }
}

type ParseFn<T> = Box<dyn FnOnce(Value) -> Result<T, SpError> + Send>;

/// Caller-side continuation of one action.
///
/// Resolves exactly once with the parsed result or the failure attributed to
/// the action. In immediate mode awaiting the handle is what sends the request.
pub struct ActionHandle<T = Value> {
    action: ActionId,
    batch: Batch,
    mode: ExecutionMode,
    produced: Option<ProducedRef>,
    receiver: oneshot::Receiver<Result<Value, SpError>>,
    parse: ParseFn<T>,
}

impl ActionHandle<Value> {
    pub(crate) fn new(
        action: ActionId,
        batch: Batch,
        mode: ExecutionMode,
        produced: Option<ProducedRef>,
        receiver: oneshot::Receiver<Result<Value, SpError>>,
    ) -> Self {
        ActionHandle {
            action,
            batch,
            mode,
            produced,
            receiver,
            parse: Box::new(Ok),
        }
    }
}

impl<T: Send + 'static> ActionHandle<T> {
    pub fn action(&self) -> ActionId {
        self.action
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch.id()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Node standing for the object this action creates. In deferred mode it
    /// joins the same batch, so later actions can target it before it exists.
    pub fn produced(&self) -> Option<ResourceNode> {
        let node = ResourceNode::produced(self.produced.clone()?);
        Some(match self.mode {
            ExecutionMode::Deferred => node.in_batch(&self.batch),
            ExecutionMode::Immediate => node,
        })
    }

    /// Attach a transform applied to the successful result.
    pub fn map<U, F>(self, f: F) -> ActionHandle<U>
    where
        F: FnOnce(T) -> Result<U, SpError> + Send + 'static,
    {
        let parse = self.parse;
        ActionHandle {
            action: self.action,
            batch: self.batch,
            mode: self.mode,
            produced: self.produced,
            receiver: self.receiver,
            parse: Box::new(move |value| parse(value).and_then(f)),
        }
    }

    /// Wait for the result. Immediate-mode handles execute their batch here.
    pub async fn result(self) -> Result<T, SpError> {
        if self.mode == ExecutionMode::Immediate {
            // the outcome, failures included, also arrives through the receiver
            let _ = self.batch.execute().await;
        }
        let value = self.receiver.await.map_err(|_| SpError::Canceled)??;
        (self.parse)(value)
    }
}

impl<T: Send + 'static> IntoFuture for ActionHandle<T> {
    type Output = Result<T, SpError>;
    type IntoFuture = BoxFuture<'static, Result<T, SpError>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.result())
    }
}

impl<T> fmt::Debug for ActionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("action", &self.action)
            .field("batch", &self.batch.id())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Routes terminal operations: into the node's open batch, or into a fresh
/// single-action batch that runs when the handle is awaited.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionQueue;

impl ActionQueue {
    pub fn enqueue(node: &ResourceNode, request: ActionRequest) -> Result<ActionHandle<Value>, SpError> {
        match node.batch() {
            Some(batch) => batch.add(node, request),
            None => {
                let context = node.context().ok_or_else(|| {
                    SpError::configuration("resource chain is not attached to a service endpoint")
                })?;
                Batch::immediate(context, node.protocol()).add(node, request)
            }
        }
    }
}
