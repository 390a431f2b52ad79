//! Reference resolution for a batch about to be serialized.
//!
//! Client-svc requests address objects by in-request identifiers. Objects with
//! a stable identity are interned into the object reference table; an object
//! created earlier in the same batch is reached through the token assigned to
//! its creating action. Resolution is a single forward pass, so an action can
//! only ever reference tokens of strictly earlier actions.

use crate::action::{ActionKind, ClientSvcOperation, Operation, PendingAction};
use crate::error::{CompositionError, SpError};
use crate::ids::{ActionId, BatchId, ObjectToken, TokenAllocator};
use crate::node::Segment;
use crate::protocol::Protocol;
use std::collections::{BTreeMap, HashMap};

/// Where a client-svc object path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAnchor {
    /// A static entry point; the whole path is stable.
    Root,
    /// The object created by `action` of `batch`, identity not yet known.
    Produced { batch: BatchId, action: ActionId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPathChain {
    pub anchor: PathAnchor,
    pub steps: Vec<Segment>,
}

/// Resolved target of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// REST address
    Url(String),
    /// Object path with a stable identity
    Stable(ObjectToken),
    /// Object path rooted at the object `origin` creates in this batch
    Forward { token: ObjectToken, origin: ActionId },
}

impl TargetRef {
    pub fn url(&self) -> Option<&str> {
        match self {
            TargetRef::Url(url) => Some(url),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<ObjectToken> {
        match self {
            TargetRef::Url(_) => None,
            TargetRef::Stable(token) | TargetRef::Forward { token, .. } => Some(*token),
        }
    }
}

/// How an object path is reached: one step below `parent`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub parent: Option<ObjectToken>,
    pub step: Segment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenBinding {
    /// Identity derivable without running any action of the batch.
    Stable(PathEntry),
    /// Identity depends on the result of `action` (the object it creates, or
    /// a path below that object).
    Forward { action: ActionId, entry: PathEntry },
}

impl TokenBinding {
    pub fn entry(&self) -> &PathEntry {
        match self {
            TokenBinding::Stable(entry) | TokenBinding::Forward { entry, .. } => entry,
        }
    }
}

/// Token → binding map for one batch. Identical stable paths share a token;
/// every created object gets a token of its own.
#[derive(Debug, Default)]
pub struct ObjectReferenceTable {
    allocator: TokenAllocator,
    bindings: BTreeMap<ObjectToken, TokenBinding>,
    interned: HashMap<(Option<ObjectToken>, String), ObjectToken>,
}

impl ObjectReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the path `step` below `parent`, reusing an existing one.
    pub fn intern(&mut self, parent: Option<ObjectToken>, step: &Segment, origin: Option<ActionId>) -> ObjectToken {
        let key = (parent, format!("{:?}", step));
        if let Some(token) = self.interned.get(&key) {
            return *token;
        }

        let token = self.allocator.allocate();
        let entry = PathEntry {
            parent,
            step: step.clone(),
        };
        let binding = match origin {
            Some(action) => TokenBinding::Forward { action, entry },
            None => TokenBinding::Stable(entry),
        };
        self.bindings.insert(token, binding);
        self.interned.insert(key, token);
        token
    }

    /// Fresh token for the object `action` creates through `step`.
    pub fn produce(&mut self, parent: Option<ObjectToken>, step: Segment, action: ActionId) -> ObjectToken {
        let token = self.allocator.allocate();
        self.bindings.insert(
            token,
            TokenBinding::Forward {
                action,
                entry: PathEntry { parent, step },
            },
        );
        token
    }

    /// Identifier that binds to no object path (client-svc action ids).
    pub fn allocate(&mut self) -> ObjectToken {
        self.allocator.allocate()
    }

    pub fn get(&self, token: ObjectToken) -> Option<&TokenBinding> {
        self.bindings.get(&token)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&ObjectToken, &TokenBinding)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// An action ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub operation: Operation,
    pub target: TargetRef,
    /// Token of the object this action creates.
    pub produces: Option<ObjectToken>,
    /// `$select` of the target node, used by client-svc queries.
    pub select: Vec<String>,
}

#[derive(Debug)]
pub struct ResolvedBatch {
    pub batch: BatchId,
    pub protocol: Protocol,
    pub actions: Vec<PreparedAction>,
    pub table: ObjectReferenceTable,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceResolver;

impl ReferenceResolver {
    /// Finalize every target of `actions` (in submission order).
    pub fn resolve(batch: BatchId, protocol: Protocol, actions: &[PendingAction]) -> Result<ResolvedBatch, SpError> {
        let mut table = ObjectReferenceTable::new();
        let mut produced: HashMap<ActionId, ObjectToken> = HashMap::new();
        let mut prepared = Vec::with_capacity(actions.len());

        for action in actions {
            let request = action.request();
            let select = action.target().modifiers().select.iter().cloned().collect();

            let (target, produces) = match protocol {
                Protocol::Rest => (TargetRef::Url(action.target().resolve_address()?), None),
                Protocol::ClientSvc => {
                    Self::resolve_object_path(batch, action, &mut table, &mut produced)?
                }
            };

            prepared.push(PreparedAction {
                id: action.id(),
                kind: request.kind,
                operation: request.operation.clone(),
                target,
                produces,
                select,
            });
        }

        Ok(ResolvedBatch {
            batch,
            protocol,
            actions: prepared,
            table,
        })
    }

    fn resolve_object_path(
        batch: BatchId,
        action: &PendingAction,
        table: &mut ObjectReferenceTable,
        produced: &mut HashMap<ActionId, ObjectToken>,
    ) -> Result<(TargetRef, Option<ObjectToken>), SpError> {
        let id = action.id();
        let chain = action.target().object_path()?;

        let (mut parent, origin) = match chain.anchor {
            PathAnchor::Root => (None, None),
            PathAnchor::Produced {
                batch: owner,
                action: referenced,
            } => {
                let token = if owner == batch && referenced < id {
                    produced.get(&referenced).copied()
                } else {
                    None
                };
                match token {
                    Some(token) => (Some(token), Some(referenced)),
                    None => {
                        return Err(CompositionError::DependencyOrder {
                            batch,
                            action: id,
                            referenced,
                        }
                        .into())
                    }
                }
            }
        };

        let creates = action.request().kind == ActionKind::Create
            && matches!(
                action.request().operation,
                Operation::ClientSvc(ClientSvcOperation::Create { .. })
            );

        let (path, creator) = match (creates, chain.steps.split_last()) {
            (true, Some((creator, prefix))) => (prefix, Some(creator)),
            (true, None) => {
                return Err(SpError::configuration(format!(
                    "{} creates an object but its target has no creating step",
                    id
                )))
            }
            (false, _) => (chain.steps.as_slice(), None),
        };

        for step in path {
            check_step(step, parent)?;
            parent = Some(table.intern(parent, step, origin));
        }

        if let Some(creator) = creator {
            check_step(creator, parent)?;
            let token = table.produce(parent, creator.clone(), id);
            produced.insert(id, token);
            return Ok((TargetRef::Forward { token, origin: id }, Some(token)));
        }

        let token = parent.ok_or_else(|| {
            SpError::configuration(format!("{} targets an empty object path", id))
        })?;
        let target = match origin {
            Some(origin) => TargetRef::Forward { token, origin },
            None => TargetRef::Stable(token),
        };
        Ok((target, None))
    }
}

/// Static entry points only start a path; every other step needs a parent.
fn check_step(step: &Segment, parent: Option<ObjectToken>) -> Result<(), SpError> {
    match (step, parent) {
        (Segment::Raw(text), _) => Err(SpError::configuration(format!(
            "raw segment '{}' has no client-svc object path form",
            text
        ))),
        (Segment::StaticMethod { name, .. } | Segment::StaticProperty { name, .. }, Some(_)) => {
            Err(SpError::configuration(format!(
                "static entry point '{}' cannot follow another step",
                name
            )))
        }
        (Segment::Path(name) | Segment::Method { name, .. }, None) => Err(SpError::configuration(
            format!("client-svc path must start at a static entry point, found '{}'", name),
        )),
        _ => Ok(()),
    }
}
