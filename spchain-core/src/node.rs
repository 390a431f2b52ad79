//! Resource nodes: immutable links of a composition chain.
//!
//! A node never changes after construction. `descend`, `with_modifier` and
//! `in_batch` return new nodes that share their ancestors through `Arc`, so
//! chains built concurrently from a common prefix never observe each other.

use crate::action::{ActionHandle, ActionQueue, ActionRequest};
use crate::batch::Batch;
use crate::context::ServiceContext;
use crate::error::{CompositionError, SpError};
use crate::ids::{ActionId, BatchId};
use crate::protocol::Protocol;
use crate::query::{Modifier, OrderField, QueryModifiers};
use crate::resolver::{ObjectPathChain, PathAnchor};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// A typed argument of a method segment or client-svc operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Guid(Uuid),
    Null,
}

impl Arg {
    /// OData literal form used inside REST path segments.
    pub fn to_odata_literal(&self) -> String {
        match self {
            Arg::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Arg::Int(n) => n.to_string(),
            Arg::Float(n) => n.to_string(),
            Arg::Bool(b) => b.to_string(),
            Arg::Guid(id) => format!("'{}'", id),
            Arg::Null => "null".to_string(),
        }
    }

    /// Literal form inside a request URL. String content is percent-encoded,
    /// quotes are doubled and kept literal along with the delimiters.
    pub fn to_rest_literal(&self) -> String {
        match self {
            Arg::Str(s) => format!("'{}'", urlencoding::encode(s).replace("%27", "''")),
            other => other.to_odata_literal(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Arg::Str(s) => Value::String(s.clone()),
            Arg::Int(n) => Value::from(*n),
            Arg::Float(n) => Value::from(*n),
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Guid(id) => Value::String(id.to_string()),
            Arg::Null => Value::Null,
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<Uuid> for Arg {
    fn from(value: Uuid) -> Self {
        Arg::Guid(value)
    }
}

/// One step of a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// REST path segment; a `Property` object path on client-svc.
    Path(String),
    /// REST `name(arg,...)`; a `Method` object path on client-svc.
    Method { name: String, args: Vec<Arg> },
    /// Client-svc entry point such as `TaxonomySession.GetTaxonomySession`.
    StaticMethod {
        type_id: String,
        name: String,
        args: Vec<Arg>,
    },
    /// Client-svc static property entry point.
    StaticProperty { type_id: String, name: String },
    /// Pre-rendered REST path text, used verbatim.
    Raw(String),
}

impl Segment {
    pub fn path(name: impl Into<String>) -> Self {
        Segment::Path(name.into())
    }

    pub fn method<I, A>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        Segment::Method {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Render as a REST path segment.
    pub fn to_rest(&self) -> Result<String, SpError> {
        match self {
            Segment::Path(name) | Segment::Raw(name) => Ok(name.clone()),
            Segment::Method { name, args } => {
                let rendered: Vec<String> = args.iter().map(Arg::to_rest_literal).collect();
                Ok(format!("{}({})", name, rendered.join(",")))
            }
            Segment::StaticMethod { name, .. } | Segment::StaticProperty { name, .. } => {
                Err(SpError::configuration(format!(
                    "static entry point '{}' is only addressable through client-svc",
                    name
                )))
            }
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Path(name) | Segment::Raw(name) => write!(f, "{}", name),
            Segment::Method { name, args } | Segment::StaticMethod { name, args, .. } => {
                let rendered: Vec<String> = args.iter().map(Arg::to_odata_literal).collect();
                write!(f, "{}({})", name, rendered.join(","))
            }
            Segment::StaticProperty { type_id, name } => write!(f, "{}:{}", type_id, name),
        }
    }
}

/// Handle on the object an earlier action creates.
///
/// The identity cell is written once, after the producing action succeeds,
/// with a stable node addressing the created object.
#[derive(Clone)]
pub struct ProducedRef {
    batch: BatchId,
    action: ActionId,
    protocol: Protocol,
    context: Option<Arc<ServiceContext>>,
    identity: Arc<OnceLock<ResourceNode>>,
}

impl ProducedRef {
    pub fn new(
        batch: BatchId,
        action: ActionId,
        protocol: Protocol,
        context: Option<Arc<ServiceContext>>,
    ) -> Self {
        ProducedRef {
            batch,
            action,
            protocol,
            context,
            identity: Arc::new(OnceLock::new()),
        }
    }

    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn action(&self) -> ActionId {
        self.action
    }

    /// The stable node of the created object, once known.
    pub fn identity(&self) -> Option<&ResourceNode> {
        self.identity.get()
    }

    /// Returns false if an identity was already recorded.
    pub(crate) fn resolve(&self, node: ResourceNode) -> bool {
        self.identity.set(node).is_ok()
    }
}

impl fmt::Debug for ProducedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducedRef")
            .field("batch", &self.batch)
            .field("action", &self.action)
            .field("protocol", &self.protocol)
            .field("resolved", &self.identity.get().is_some())
            .finish()
    }
}

/// Where a chain starts.
#[derive(Debug, Clone)]
pub enum Anchor {
    Endpoint {
        context: Arc<ServiceContext>,
        protocol: Protocol,
    },
    Detached {
        protocol: Protocol,
    },
    Produced(ProducedRef),
}

impl Anchor {
    fn protocol(&self) -> Protocol {
        match self {
            Anchor::Endpoint { protocol, .. } | Anchor::Detached { protocol } => *protocol,
            Anchor::Produced(produced) => produced.protocol,
        }
    }
}

#[derive(Debug)]
enum NodeKind {
    Root(Anchor),
    Child { parent: ResourceNode, segment: Segment },
}

#[derive(Debug)]
struct NodeInner {
    kind: NodeKind,
    modifiers: QueryModifiers,
    batch: Option<Batch>,
}

/// One addressable remote resource.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    inner: Arc<NodeInner>,
}

impl ResourceNode {
    /// Root of a chain bound to a service endpoint.
    pub fn root(context: Arc<ServiceContext>, protocol: Protocol) -> Self {
        Self::from_kind(NodeKind::Root(Anchor::Endpoint { context, protocol }), None)
    }

    /// Root with no endpoint; resolving any address below it is a configuration error.
    pub fn detached(protocol: Protocol) -> Self {
        Self::from_kind(NodeKind::Root(Anchor::Detached { protocol }), None)
    }

    /// Root standing for the object an earlier action produces.
    pub fn produced(produced: ProducedRef) -> Self {
        Self::from_kind(NodeKind::Root(Anchor::Produced(produced)), None)
    }

    fn from_kind(kind: NodeKind, batch: Option<Batch>) -> Self {
        ResourceNode {
            inner: Arc::new(NodeInner {
                kind,
                modifiers: QueryModifiers::new(),
                batch,
            }),
        }
    }

    /// Child node one segment deeper. The child inherits this node's batch,
    /// not its query modifiers.
    pub fn descend(&self, segment: Segment) -> ResourceNode {
        Self::from_kind(
            NodeKind::Child {
                parent: self.clone(),
                segment,
            },
            self.inner.batch.clone(),
        )
    }

    /// Shorthand for `descend(Segment::Path(name))`.
    pub fn path(&self, name: impl Into<String>) -> ResourceNode {
        self.descend(Segment::Path(name.into()))
    }

    /// Shorthand for `descend(Segment::Method { .. })`.
    pub fn invoke<I, A>(&self, name: impl Into<String>, args: I) -> ResourceNode
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.descend(Segment::method(name, args))
    }

    /// Copy of this node with `modifier` merged after the existing modifiers.
    pub fn with_modifier(&self, modifier: Modifier) -> Result<ResourceNode, SpError> {
        let added = QueryModifiers::from_modifier(modifier)?;
        Ok(self.with_modifiers(&added))
    }

    pub fn with_modifiers(&self, modifiers: &QueryModifiers) -> ResourceNode {
        ResourceNode {
            inner: Arc::new(NodeInner {
                kind: self.copy_kind(),
                modifiers: self.inner.modifiers.merge(modifiers),
                batch: self.inner.batch.clone(),
            }),
        }
    }

    pub fn select<I, S>(&self, fields: I) -> Result<ResourceNode, SpError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_modifier(Modifier::select(fields))
    }

    pub fn expand<I, S>(&self, paths: I) -> Result<ResourceNode, SpError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_modifier(Modifier::expand(paths))
    }

    pub fn filter(&self, expr: impl Into<String>) -> Result<ResourceNode, SpError> {
        self.with_modifier(Modifier::Filter(expr.into()))
    }

    pub fn order_by(&self, fields: Vec<OrderField>) -> Result<ResourceNode, SpError> {
        self.with_modifier(Modifier::OrderBy(fields))
    }

    pub fn top(&self, n: u32) -> Result<ResourceNode, SpError> {
        self.with_modifier(Modifier::Top(n))
    }

    pub fn skip(&self, n: u32) -> Result<ResourceNode, SpError> {
        self.with_modifier(Modifier::Skip(n))
    }

    pub fn param(&self, key: impl Into<String>, value: impl Into<String>) -> Result<ResourceNode, SpError> {
        self.with_modifier(Modifier::param(key, value))
    }

    /// Copy of this node whose terminal operations join `batch`.
    pub fn in_batch(&self, batch: &Batch) -> ResourceNode {
        self.with_batch(Some(batch.clone()))
    }

    /// Copy of this node with no batch association (immediate mode).
    pub fn unbatched(&self) -> ResourceNode {
        self.with_batch(None)
    }

    fn with_batch(&self, batch: Option<Batch>) -> ResourceNode {
        ResourceNode {
            inner: Arc::new(NodeInner {
                kind: self.copy_kind(),
                modifiers: self.inner.modifiers.clone(),
                batch,
            }),
        }
    }

    fn copy_kind(&self) -> NodeKind {
        match &self.inner.kind {
            NodeKind::Root(anchor) => NodeKind::Root(anchor.clone()),
            NodeKind::Child { parent, segment } => NodeKind::Child {
                parent: parent.clone(),
                segment: segment.clone(),
            },
        }
    }

    pub fn parent(&self) -> Option<&ResourceNode> {
        match &self.inner.kind {
            NodeKind::Root(_) => None,
            NodeKind::Child { parent, .. } => Some(parent),
        }
    }

    pub fn segment(&self) -> Option<&Segment> {
        match &self.inner.kind {
            NodeKind::Root(_) => None,
            NodeKind::Child { segment, .. } => Some(segment),
        }
    }

    pub fn modifiers(&self) -> &QueryModifiers {
        &self.inner.modifiers
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.inner.batch.as_ref()
    }

    pub fn anchor(&self) -> &Anchor {
        let mut node = self;
        loop {
            match &node.inner.kind {
                NodeKind::Root(anchor) => return anchor,
                NodeKind::Child { parent, .. } => node = parent,
            }
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.anchor().protocol()
    }

    /// The service context this chain talks to, if it has one.
    pub fn context(&self) -> Option<Arc<ServiceContext>> {
        match self.anchor() {
            Anchor::Endpoint { context, .. } => Some(context.clone()),
            Anchor::Detached { .. } => None,
            Anchor::Produced(produced) => produced.context.clone(),
        }
    }

    /// Segments from the anchor down to this node.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut node = self;
        while let NodeKind::Child { parent, segment } = &node.inner.kind {
            segments.push(segment.clone());
            node = parent;
        }
        segments.reverse();
        segments
    }

    /// Remote path without the query string.
    pub fn resolve_path(&self) -> Result<String, SpError> {
        let base = match self.anchor() {
            Anchor::Endpoint { context, .. } => context.api_root(),
            Anchor::Detached { .. } => {
                return Err(SpError::configuration(
                    "resource chain is not attached to a service endpoint",
                ))
            }
            Anchor::Produced(produced) => match produced.identity() {
                Some(node) => node.resolve_path()?,
                None => {
                    return Err(CompositionError::UnresolvedReference {
                        batch: produced.batch,
                        action: produced.action,
                    }
                    .into())
                }
            },
        };

        let mut address = base;
        for segment in self.segments() {
            address.push('/');
            address.push_str(&segment.to_rest()?);
        }
        Ok(address)
    }

    /// Full remote address: the path of the chain followed by this node's
    /// query modifiers in their fixed rendering order.
    pub fn resolve_address(&self) -> Result<String, SpError> {
        let mut address = self.resolve_path()?;
        let query = self.inner.modifiers.to_query_string();
        if !query.is_empty() {
            address.push('?');
            address.push_str(&query);
        }
        Ok(address)
    }

    /// Client-svc view of the chain. Produced anchors that already carry an
    /// identity are replaced by the stable chain of that identity.
    pub fn object_path(&self) -> Result<ObjectPathChain, SpError> {
        let steps = self.segments();
        match self.anchor() {
            Anchor::Endpoint { .. } => Ok(ObjectPathChain {
                anchor: PathAnchor::Root,
                steps,
            }),
            Anchor::Detached { .. } => Err(SpError::configuration(
                "resource chain is not attached to a service endpoint",
            )),
            Anchor::Produced(produced) => match produced.identity() {
                Some(node) => {
                    let mut chain = node.object_path()?;
                    chain.steps.extend(steps);
                    Ok(chain)
                }
                None => Ok(ObjectPathChain {
                    anchor: PathAnchor::Produced {
                        batch: produced.batch,
                        action: produced.action,
                    },
                    steps,
                }),
            },
        }
    }

    /// Enqueue a terminal operation against this node.
    pub fn enqueue(&self, request: ActionRequest) -> Result<ActionHandle<Value>, SpError> {
        ActionQueue::enqueue(self, request)
    }
}
