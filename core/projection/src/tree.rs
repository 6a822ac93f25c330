//! Arena holding the projected filesystem tree.
//!
//! Nodes are appended during population and never removed or modified
//! afterwards, so a populated tree can be shared freely across threads.

use std::time::SystemTime;

use crate::node::{DirRole, Directory, File, NodeError, NodeId, NodeResult, NodeTimes, VirtualNode};
use kdfs_common::{SensitiveBytes, TreePath};

/// Virtual filesystem tree built from a credential store.
#[derive(Debug)]
pub struct ProjectedTree {
    nodes: Vec<VirtualNode>,
    file_count: usize,
}

impl ProjectedTree {
    /// Create a tree holding only the root directory.
    pub fn new(created: SystemTime) -> Self {
        let root = Directory::new(
            "/".to_string(),
            None,
            DirRole::Group,
            NodeTimes::uniform(created),
        );
        Self {
            nodes: vec![VirtualNode::Directory(root)],
            file_count: 0,
        }
    }

    pub fn root(&self) -> &VirtualNode {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn get_node(&self, id: NodeId) -> NodeResult<&VirtualNode> {
        self.nodes.get(id.index()).ok_or(NodeError::NotFound)
    }

    /// Look up `name` in directory `parent`.
    pub fn lookup(&self, parent: NodeId, name: &str) -> NodeResult<NodeId> {
        self.get_node(parent)?.lookup(name)
    }

    /// Navigate to a node by path.
    pub fn resolve(&self, path: &TreePath) -> NodeResult<NodeId> {
        path.components()
            .try_fold(NodeId::ROOT, |current, name| self.lookup(current, name))
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    /// Count of file nodes.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Existing directory named `name` under `parent` if `reuse` accepts its
    /// role, otherwise a new one.
    ///
    /// A file or a refused directory holding the name is left alone and the
    /// new directory gets a suffixed name instead.
    pub(crate) fn lookup_or_create_dir(
        &mut self,
        parent: NodeId,
        name: &str,
        role: DirRole,
        times: NodeTimes,
        reuse: impl Fn(DirRole) -> bool,
    ) -> NodeId {
        match self.lookup(parent, name) {
            Ok(existing) => match self.nodes[existing.index()].role() {
                Some(existing_role) if reuse(existing_role) => existing,
                _ => self.create_unique_dir(parent, name, role, times),
            },
            Err(_) => self.attach(parent, name.to_string(), |name, parent| {
                VirtualNode::Directory(Directory::new(name, Some(parent), role, times))
            }),
        }
    }

    /// New directory under `parent`, named `name` or `name (n)` for the
    /// smallest `n` that is free.
    pub(crate) fn create_unique_dir(
        &mut self,
        parent: NodeId,
        name: &str,
        role: DirRole,
        times: NodeTimes,
    ) -> NodeId {
        let mut candidate = name.to_string();
        let mut n = 1;
        while self.lookup(parent, &candidate).is_ok() {
            candidate = format!("{} ({})", name, n);
            n += 1;
        }
        self.attach(parent, candidate, |name, parent| {
            VirtualNode::Directory(Directory::new(name, Some(parent), role, times))
        })
    }

    /// New file under `parent`. Returns `None` and leaves the tree unchanged
    /// if the name is already taken.
    pub(crate) fn create_file(
        &mut self,
        parent: NodeId,
        name: &str,
        data: SensitiveBytes,
        times: NodeTimes,
    ) -> Option<NodeId> {
        if self.lookup(parent, name).is_ok() {
            return None;
        }
        let id = self.attach(parent, name.to_string(), |name, parent| {
            VirtualNode::File(File {
                name,
                parent,
                data,
                times,
            })
        });
        self.file_count += 1;
        Some(id)
    }

    /// Append a node and link it into `parent`. `parent` must be a directory
    /// without a child called `name`.
    fn attach(
        &mut self,
        parent: NodeId,
        name: String,
        make: impl FnOnce(String, NodeId) -> VirtualNode,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        let node = make(name.clone(), parent);
        let is_dir = node.is_dir();
        self.nodes.push(node);

        if let Some(VirtualNode::Directory(dir)) = self.nodes.get_mut(parent.index()) {
            dir.children.push(id);
            dir.index.insert(name, id);
            if is_dir {
                dir.subdirs += 1;
            }
        }
        id
    }
}
