// Composition layer
pub mod node;
pub mod query;
pub mod action;

// Execution layer
pub mod batch;
pub mod context;
pub mod resolver;
pub mod protocol;

pub mod error;
pub mod ids;

pub use action::{
    ActionHandle, ActionKind, ActionQueue, ActionRequest, ClientSvcOperation, IdentityFn, Operation,
    PendingAction, RestOperation,
};
pub use batch::{Batch, BatchStatus};
pub use context::{ServiceContext, DEFAULT_MAX_BATCH_SIZE};
pub use error::{BusinessError, CompositionError, SpError, TransportError};
pub use ids::{ActionId, BatchId, ObjectToken};
pub use node::{Anchor, Arg, ProducedRef, ResourceNode, Segment};
pub use protocol::{
    AuthProvider, ExecutionMode, NoAuth, Protocol, ProtocolAdapter, SubResult, Transport, WireRequest,
    WireResponse,
};
pub use query::{Modifier, OrderField, QueryModifiers};
pub use resolver::{ObjectPathChain, ObjectReferenceTable, PathAnchor, ReferenceResolver, TargetRef};

/// Result alias used across the engine.
pub type Result<T, E = SpError> = std::result::Result<T, E>;
