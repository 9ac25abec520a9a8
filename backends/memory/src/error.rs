use crate::host::NodeId;

/// Errors returned by [`MemoryHost`](crate::MemoryHost) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryHostError {
    /// The handle does not name a node of this document.
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    /// Text nodes cannot hold children.
    #[error("node {0} cannot have children")]
    NotAParent(NodeId),
    /// The reference node of an insert or remove is not where the caller expected it.
    #[error("node {child} is not a child of {parent}")]
    NotAChild {
        /// The expected parent.
        parent: NodeId,
        /// The node that was looked up.
        child: NodeId,
    },
    /// A text update targeted an element, or the other way around.
    #[error("node {id} is not {expected}")]
    KindMismatch {
        /// The updated node.
        id: NodeId,
        /// What the update expected to find.
        expected: &'static str,
    },
    /// Creating elements of this tag was refused with [`MemoryHost::reject_tag`](crate::MemoryHost::reject_tag).
    #[error("elements of type `{0}` are rejected")]
    RejectedTag(String),
}
