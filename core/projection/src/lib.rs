//! Projection of a credential store onto a virtual filesystem tree.
//!
//! Groups become directories, titled entries become directories inside
//! their group, and the standard attributes of each entry become read-only
//! files. The tree is built once, on first access, and never changes.

pub mod node;
pub mod projection;
pub mod projector;
pub mod tree;

pub use node::{
    AccessMode, DirRole, NodeAttr, NodeError, NodeId, NodeKind, NodeResult, NodeTimes, OpenReply,
    Permissions, VirtualNode, BLOCK_SIZE,
};
pub use projection::{DirEntry, Projection, ProjectionOptions, ProjectionStats};
pub use projector::{sanitize_name, CollisionPolicy, TreeProjector};
pub use tree::ProjectedTree;
