//! FUSE filesystem over a projection.
//!
//! Implements the fuser::Filesystem trait by translating inode numbers to
//! projection node ids. The projection is immutable once populated, so no
//! request handler takes a lock or keeps per-handle state.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};
use tracing::{debug, info, trace, Span};

use kdfs_projection::{
    AccessMode, DirEntry, NodeAttr, NodeError, NodeId, NodeKind, Projection, BLOCK_SIZE,
};

/// Longest file name reported by statfs.
const NAME_MAX: u32 = 255;

/// Writes are refused outright, never accepted and dropped.
pub const WRITE_ERROR: NodeError = NodeError::NotSupported;

/// Map a node error to an errno.
pub fn errno(error: NodeError) -> c_int {
    match error {
        NodeError::NotFound => libc::ENOENT,
        NodeError::NotADirectory => libc::ENOTDIR,
        NodeError::IsADirectory => libc::EISDIR,
        NodeError::ReadOnly => libc::EROFS,
        NodeError::NotSupported => libc::ENOTSUP,
    }
}

/// Access mode encoded in open(2) flags.
pub fn access_mode(flags: i32) -> AccessMode {
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => AccessMode::Write,
        libc::O_RDWR => AccessMode::ReadWrite,
        _ => AccessMode::Read,
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

/// Open `id` with the access requested in `flags`; returns the open flags
/// for the reply.
pub fn open_node(projection: &Projection, id: NodeId, flags: i32) -> Result<u32, c_int> {
    let open = projection.open(id, access_mode(flags)).map_err(errno)?;
    Ok(if open.keep_cache {
        fuser::consts::FOPEN_KEEP_CACHE
    } else {
        0
    })
}

/// Outcome of access(2) on an existing node.
pub fn check_access(mask: i32) -> Result<(), c_int> {
    if mask & libc::W_OK != 0 {
        Err(libc::EROFS)
    } else {
        Ok(())
    }
}

/// One readdir record.
#[derive(Debug, Clone, PartialEq)]
pub struct Listed<'a> {
    pub ino: u64,
    /// Offset at which the following call resumes.
    pub next: i64,
    pub kind: FileType,
    pub name: &'a str,
}

/// Records of directory `id` from `offset` on: `.`, `..`, then the children.
pub fn listing<'a>(
    id: NodeId,
    parent: NodeId,
    children: &[DirEntry<'a>],
    offset: i64,
) -> Vec<Listed<'a>> {
    let entries = [
        (id, FileType::Directory, "."),
        (parent, FileType::Directory, ".."),
    ]
    .into_iter()
    .chain(
        children
            .iter()
            .map(|child| (child.id, file_type(child.kind), child.name)),
    );

    let skip = usize::try_from(offset).unwrap_or(0);
    entries
        .enumerate()
        .skip(skip)
        .map(|(i, (node, kind, name))| Listed {
            ino: node.ino(),
            next: (i + 1) as i64,
            kind,
            name,
        })
        .collect()
}

/// FUSE filesystem serving a [`Projection`].
pub struct ProjectionFs {
    projection: Arc<Projection>,
    uid: u32,
    gid: u32,
    ttl: Duration,
    span: Span,
}

impl ProjectionFs {
    /// Serve `projection` as the calling user.
    pub fn new(projection: Arc<Projection>, span: Span) -> Self {
        Self {
            projection,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            ttl: Duration::from_secs(1),
            span,
        }
    }

    fn file_attr(&self, id: NodeId, attr: NodeAttr) -> FileAttr {
        FileAttr {
            ino: id.ino(),
            size: attr.size,
            blocks: attr.blocks,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.crtime,
            kind: file_type(attr.kind),
            perm: attr.perm,
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: attr.blksize,
            flags: 0,
        }
    }
}

impl Filesystem for ProjectionFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        let stats = self.projection.stats();
        info!(parent: &self.span, files = stats.files, "FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!(parent: &self.span, "FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let (Some(parent), Some(name)) = (NodeId::from_ino(parent), name.to_str()) else {
            reply.error(libc::ENOENT);
            return;
        };
        trace!(parent: &self.span, parent_ino = parent.ino(), name, "lookup");

        match self.projection.lookup(parent, name) {
            Ok((id, attr)) => reply.entry(&self.ttl, &self.file_attr(id, attr), 0),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(id) = NodeId::from_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.projection.attr(id) {
            Ok(attr) => reply.attr(&self.ttl, &self.file_attr(id, attr)),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(id) = NodeId::from_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match open_node(&self.projection, id, flags) {
            Ok(open_flags) => reply.opened(0, open_flags),
            Err(code) => {
                debug!(parent: &self.span, ino, flags, code, "open rejected");
                reply.error(code);
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(id) = NodeId::from_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.projection.read(id, offset, size) {
            Ok(data) => reply.data(data),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!(parent: &self.span, ino, "write rejected");
        reply.error(errno(WRITE_ERROR));
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(id) = NodeId::from_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.projection.attr(id) {
            Ok(attr) if attr.kind == NodeKind::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(id) = NodeId::from_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let (children, parent) = match (self.projection.list(id), self.projection.parent(id)) {
            (Ok(children), Ok(parent)) => (children, parent),
            (Err(e), _) | (_, Err(e)) => {
                reply.error(errno(e));
                return;
            }
        };

        for record in listing(id, parent, &children, offset) {
            if reply.add(record.ino, record.next, record.kind, record.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.projection.stats();
        reply.statfs(0, 0, 0, stats.files, 0, BLOCK_SIZE, NAME_MAX, BLOCK_SIZE);
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(id) = NodeId::from_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.projection.attr(id).map_err(errno).and_then(|_| check_access(mask)) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }
}
