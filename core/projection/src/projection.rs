//! The projection handed to a mount adapter.
//!
//! A [`Projection`] owns the unlocked credential store until the first
//! filesystem access populates the tree. Population runs exactly once;
//! afterwards the store is locked and dropped and every operation is a
//! lock-free read of the immutable tree.

use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::SystemTime;
use tracing::{debug, info, Span};

use crate::node::{AccessMode, NodeAttr, NodeId, NodeKind, NodeResult, OpenReply, Permissions};
use crate::projector::{CollisionPolicy, TreeProjector};
use crate::tree::ProjectedTree;
use kdfs_common::{Error, Result};
use kdfs_vault::CredentialStore;

/// Options controlling how the tree is built and presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionOptions {
    pub permissions: Permissions,
    pub collision: CollisionPolicy,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry<'a> {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: &'a str,
}

/// Filesystem statistics of a populated projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionStats {
    pub nodes: u64,
    pub files: u64,
}

/// Lazily populated, read-only view of a credential store.
pub struct Projection {
    pending: Mutex<Option<Box<dyn CredentialStore>>>,
    tree: OnceLock<ProjectedTree>,
    options: ProjectionOptions,
    created: SystemTime,
    span: Span,
}

impl Projection {
    /// Take ownership of an unlocked store.
    ///
    /// # Errors
    /// - [`Error::NotPermitted`] if the store is still locked
    pub fn new(
        store: Box<dyn CredentialStore>,
        options: ProjectionOptions,
        span: Span,
    ) -> Result<Self> {
        if store.is_locked() {
            return Err(Error::NotPermitted(
                "Store must be unlocked before projection".to_string(),
            ));
        }
        Ok(Self {
            pending: Mutex::new(Some(store)),
            tree: OnceLock::new(),
            options,
            created: SystemTime::now(),
            span,
        })
    }

    pub fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    pub fn is_populated(&self) -> bool {
        self.tree.get().is_some()
    }

    /// Build the tree on first call; later calls return the same tree.
    ///
    /// Concurrent first callers block until the single build completes.
    pub fn populate(&self) -> &ProjectedTree {
        self.tree.get_or_init(|| {
            let store = self.pending.lock().take();
            let projector = TreeProjector::new(self.options.collision, self.span.clone());
            let groups = store.as_ref().map(|s| s.root()).unwrap_or_default();
            let tree = projector.project(groups, self.created);

            if let Some(mut store) = store {
                store.lock();
                debug!(parent: &self.span, "Credential store locked and released");
            }
            info!(
                parent: &self.span,
                nodes = tree.len(),
                files = tree.file_count(),
                "Projection populated"
            );
            tree
        })
    }

    pub fn attr(&self, id: NodeId) -> NodeResult<NodeAttr> {
        let node = self.populate().get_node(id)?;
        Ok(node.attr(&self.options.permissions))
    }

    /// Resolve `name` in directory `parent` and return its attributes.
    pub fn lookup(&self, parent: NodeId, name: &str) -> NodeResult<(NodeId, NodeAttr)> {
        let tree = self.populate();
        let id = tree.lookup(parent, name)?;
        let attr = tree.get_node(id)?.attr(&self.options.permissions);
        Ok((id, attr))
    }

    pub fn open(&self, id: NodeId, access: AccessMode) -> NodeResult<OpenReply> {
        self.populate().get_node(id)?.open(access)
    }

    pub fn read(&self, id: NodeId, offset: u64, size: u32) -> NodeResult<&[u8]> {
        self.populate().get_node(id)?.read(offset, size)
    }

    /// Parent of `id`; the root is its own parent.
    pub fn parent(&self, id: NodeId) -> NodeResult<NodeId> {
        let node = self.populate().get_node(id)?;
        Ok(node.parent().unwrap_or(NodeId::ROOT))
    }

    /// Children of directory `id`, in insertion order.
    pub fn list(&self, id: NodeId) -> NodeResult<Vec<DirEntry<'_>>> {
        let tree = self.populate();
        tree.get_node(id)?
            .children()?
            .iter()
            .map(|child| {
                let node = tree.get_node(*child)?;
                Ok(DirEntry {
                    id: *child,
                    kind: node.kind(),
                    name: node.name(),
                })
            })
            .collect()
    }

    pub fn stats(&self) -> ProjectionStats {
        let tree = self.populate();
        ProjectionStats {
            nodes: tree.len() as u64,
            files: tree.file_count() as u64,
        }
    }
}
