//! Virtual filesystem nodes.
//!
//! A [`VirtualNode`] is either a directory (root, group or entry) or a file
//! (one attribute value). Nodes are stored in the arena of a
//! [`crate::ProjectedTree`] and refer to each other by [`NodeId`].

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use kdfs_common::SensitiveBytes;
use kdfs_vault::Times;

/// Block size reported for every node.
pub const BLOCK_SIZE: u32 = 512;

/// Index of a node in the projection arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root directory.
    pub const ROOT: NodeId = NodeId(0);

    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }

    /// Inode number of the node. The root is inode 1.
    pub fn ino(self) -> u64 {
        self.0 as u64 + 1
    }

    /// Node for an inode number, if the number is valid at all.
    pub fn from_ino(ino: u64) -> Option<Self> {
        ino.checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .map(NodeId)
    }
}

/// Failure of a node operation. Mapped to an errno by the mount adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    NotFound,
    NotADirectory,
    IsADirectory,
    ReadOnly,
    NotSupported,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NodeError::NotFound => "no such node",
            NodeError::NotADirectory => "not a directory",
            NodeError::IsADirectory => "is a directory",
            NodeError::ReadOnly => "read-only filesystem",
            NodeError::NotSupported => "operation not supported",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for NodeError {}

pub type NodeResult<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// Access mode requested when opening a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

/// Reply to a successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenReply {
    /// Page cache may be kept across opens; content never changes.
    pub keep_cache: bool,
}

/// What a directory was projected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRole {
    /// The root or a group.
    Group,
    /// A titled entry holding attribute files.
    Entry,
}

/// Timestamps carried by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTimes {
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
}

impl NodeTimes {
    pub fn uniform(at: SystemTime) -> Self {
        Self {
            created: at,
            modified: at,
            accessed: at,
        }
    }
}

impl From<&Times> for NodeTimes {
    fn from(times: &Times) -> Self {
        Self {
            created: SystemTime::from(times.created),
            modified: SystemTime::from(times.modified),
            accessed: SystemTime::from(times.accessed),
        }
    }
}

/// Permission bits applied to projected nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub file_mode: u16,
    pub dir_mode: u16,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            file_mode: 0o400,
            dir_mode: 0o500,
        }
    }
}

/// Attributes of a node, independent of any kernel protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    pub size: u64,
    pub blocks: u64,
    pub perm: u16,
    pub nlink: u32,
    pub blksize: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
}

#[derive(Debug)]
pub struct Directory {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) index: HashMap<String, NodeId>,
    pub(crate) subdirs: u32,
    pub(crate) role: DirRole,
    pub(crate) times: NodeTimes,
}

impl Directory {
    pub(crate) fn new(
        name: String,
        parent: Option<NodeId>,
        role: DirRole,
        times: NodeTimes,
    ) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            index: HashMap::new(),
            subdirs: 0,
            role,
            times,
        }
    }
}

#[derive(Debug)]
pub struct File {
    pub(crate) name: String,
    pub(crate) parent: NodeId,
    pub(crate) data: SensitiveBytes,
    pub(crate) times: NodeTimes,
}

/// A node of the projected tree.
#[derive(Debug)]
pub enum VirtualNode {
    Directory(Directory),
    File(File),
}

impl VirtualNode {
    pub fn name(&self) -> &str {
        match self {
            VirtualNode::Directory(dir) => &dir.name,
            VirtualNode::File(file) => &file.name,
        }
    }

    /// Parent node; `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            VirtualNode::Directory(dir) => dir.parent,
            VirtualNode::File(file) => Some(file.parent),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            VirtualNode::Directory(_) => NodeKind::Directory,
            VirtualNode::File(_) => NodeKind::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, VirtualNode::Directory(_))
    }

    /// Role of a directory; `None` for files.
    pub fn role(&self) -> Option<DirRole> {
        match self {
            VirtualNode::Directory(dir) => Some(dir.role),
            VirtualNode::File(_) => None,
        }
    }

    /// Attributes of the node.
    ///
    /// `ctime` carries the creation time of the group or entry, since
    /// Linux never shows `crtime`.
    pub fn attr(&self, permissions: &Permissions) -> NodeAttr {
        match self {
            VirtualNode::Directory(dir) => NodeAttr {
                kind: NodeKind::Directory,
                size: 0,
                blocks: 0,
                perm: permissions.dir_mode,
                nlink: 2 + dir.subdirs,
                blksize: BLOCK_SIZE,
                atime: dir.times.accessed,
                mtime: dir.times.modified,
                ctime: dir.times.created,
                crtime: dir.times.created,
            },
            VirtualNode::File(file) => {
                let size = file.data.len() as u64;
                NodeAttr {
                    kind: NodeKind::File,
                    size,
                    blocks: size.div_ceil(BLOCK_SIZE as u64),
                    perm: permissions.file_mode,
                    nlink: 1,
                    blksize: BLOCK_SIZE,
                    atime: file.times.accessed,
                    mtime: file.times.modified,
                    ctime: file.times.created,
                    crtime: file.times.created,
                }
            }
        }
    }

    /// # Errors
    /// - [`NodeError::IsADirectory`] for directories
    /// - [`NodeError::ReadOnly`] for any write access
    pub fn open(&self, access: AccessMode) -> NodeResult<OpenReply> {
        match self {
            VirtualNode::Directory(_) => Err(NodeError::IsADirectory),
            VirtualNode::File(_) if access != AccessMode::Read => Err(NodeError::ReadOnly),
            VirtualNode::File(_) => Ok(OpenReply { keep_cache: true }),
        }
    }

    /// Read up to `size` bytes at `offset`. Reads past the end are empty.
    pub fn read(&self, offset: u64, size: u32) -> NodeResult<&[u8]> {
        let data = match self {
            VirtualNode::Directory(_) => return Err(NodeError::IsADirectory),
            VirtualNode::File(file) => file.data.as_bytes(),
        };

        let len = data.len() as u64;
        if offset >= len {
            return Ok(&[]);
        }
        let end = offset.saturating_add(size as u64).min(len);
        Ok(&data[offset as usize..end as usize])
    }

    pub fn lookup(&self, name: &str) -> NodeResult<NodeId> {
        match self {
            VirtualNode::Directory(dir) => dir.index.get(name).copied().ok_or(NodeError::NotFound),
            VirtualNode::File(_) => Err(NodeError::NotADirectory),
        }
    }

    /// Children in insertion order.
    pub fn children(&self) -> NodeResult<&[NodeId]> {
        match self {
            VirtualNode::Directory(dir) => Ok(&dir.children),
            VirtualNode::File(_) => Err(NodeError::NotADirectory),
        }
    }
}
