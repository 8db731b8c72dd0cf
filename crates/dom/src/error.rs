use bridge::NodeKey;
use thiserror::Error;

/// Structural invariant violations. These are caller bugs and are returned to
/// the caller unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} does not exist or was destroyed")]
    UnknownNode(NodeKey),
    #[error("cannot place {child} under {parent}: {reason}")]
    HierarchyRequest {
        parent: NodeKey,
        child: NodeKey,
        reason: &'static str,
    },
    #[error("inserting {child} under {parent} would make it its own ancestor")]
    Cycle { parent: NodeKey, child: NodeKey },
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeKey, child: NodeKey },
    #[error("node {key} is not {expected}")]
    WrongKind { key: NodeKey, expected: &'static str },
    #[error("node {0} is still attached to a parent")]
    StillAttached(NodeKey),
}

/// Errors surfaced by event dispatch and other document services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomError {
    /// An inbound host event named a node this document does not know.
    #[error("inbound `{event_type}` event targets unknown node {target}")]
    EventTargetMissing { target: NodeKey, event_type: String },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Errors raised while building or hydrating from templates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HydrationError {
    #[error("component expansion exceeded the depth limit of {limit}")]
    RecursionLimit { limit: usize },
    /// The document was flushed after the ticket was taken.
    #[error("hydration ticket from generation {ticket} is stale (document is at {current})")]
    Stale { ticket: u64, current: u64 },
    #[error("no renderer can expand component `{name}`")]
    UnknownComponent { name: String },
    #[error("component `{name}` failed to render: {message}")]
    Render { name: String, message: String },
    #[error(transparent)]
    Tree(#[from] TreeError),
}
