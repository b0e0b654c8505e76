//! Generic backend instance.
//!
//! [`Instance`] implements the whole [`Filesystem`] operation table once:
//! the node table, the resolver walk, cookies, mounts and reclamation. A
//! concrete backend only supplies a [`Backend`], which says what a file
//! payload is and how bytes move in and out of it.
//!
//! # Locking
//!
//! Each instance has one `parking_lot::Mutex` around its tree. Every
//! operation holds it from handle validation to return, walk included, so
//! two operations on the same instance never interleave. Mount targets are
//! read under this lock only; the target instance is locked when the caller
//! re-issues the operation there.

use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use super::dir::{self, detach_child, find_child, insert_child, make_root};
use super::error::{VfsError, VfsResult};
use super::mount;
use super::node::{MountTarget, Stream};
use super::ops::{Filesystem, Lookup, Opened};
use super::resolve::{ContainerWalk, Walk, match_stream, resolve, resolve_container};
use super::table::NodeTable;
use super::types::{
    Cookie, InstanceId, MountFlags, NAME_MAX, NodeHandle, NodeIndex, NodeKind, Stat, StreamRequest,
};

/// Mount epochs, unique for the life of the process.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Backend-specific half of an instance.
pub trait Backend: Send + Sync + 'static {
    /// File payload stored in `Stream::File`.
    type File: Send + Sync + 'static;

    /// Driver name reported by [`Filesystem::fs_type`].
    fn fs_type(&self) -> &'static str;

    /// Whether the backend can create nodes and write files at all.
    /// A writable backend can still be mounted read-only.
    fn writable(&self) -> bool {
        false
    }

    /// Length of a file payload in bytes.
    fn file_len(&self, file: &Self::File) -> u64;

    /// Read file bytes at `pos`.
    fn read_file(&self, file: &Self::File, pos: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write file bytes at `pos`.
    fn write_file(&self, file: &mut Self::File, pos: u64, buf: &[u8]) -> VfsResult<usize> {
        let _ = (file, pos, buf);
        Err(VfsError::ReadOnlyFilesystem)
    }

    /// Payload for a freshly created file.
    fn new_file(&self) -> VfsResult<Self::File> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    /// Called once the instance's tree has been torn down.
    fn unmounted(&self) {}
}

struct Tree<F> {
    table: NodeTable<F>,
    mounted: bool,
}

/// A mounted instance of backend `B`.
pub struct Instance<B: Backend> {
    id: InstanceId,
    epoch: u64,
    flags: MountFlags,
    covered: Option<NodeHandle>,
    root: NodeIndex,
    backend: B,
    tree: Mutex<Tree<B::File>>,
}

impl<B: Backend> std::fmt::Debug for Instance<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("fs_type", &self.backend.fs_type())
            .field("epoch", &self.epoch)
            .field("flags", &self.flags)
            .finish()
    }
}

impl<B: Backend> Instance<B> {
    /// Build an instance around `table`.
    ///
    /// `populate` fills the tree eagerly under the new root. If it fails,
    /// every node inserted so far is dropped and the mount is aborted.
    pub fn mount_with(
        id: InstanceId,
        flags: MountFlags,
        covered: Option<NodeHandle>,
        backend: B,
        mut table: NodeTable<B::File>,
        populate: impl FnOnce(&B, &mut NodeTable<B::File>, NodeIndex) -> VfsResult<()>,
    ) -> VfsResult<Arc<Self>> {
        let root = make_root(&mut table)?;
        if let Err(e) = populate(&backend, &mut table, root) {
            let dropped = table.clear();
            tracing::debug!(
                instance = %id,
                fs_type = backend.fs_type(),
                dropped,
                error = %e,
                "mount aborted, partial tree rolled back"
            );
            return Err(e);
        }

        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            instance = %id,
            fs_type = backend.fs_type(),
            nodes = table.len(),
            read_only = flags.read_only,
            "mounted filesystem"
        );
        Ok(Arc::new(Self {
            id,
            epoch,
            flags,
            covered,
            root,
            backend,
            tree: Mutex::new(Tree {
                table,
                mounted: true,
            }),
        }))
    }

    /// Backend half of this instance.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `f` on the tree under the instance lock.
    ///
    /// For backends that insert nodes outside the path operations (device
    /// registration).
    pub fn with_tree<R>(
        &self,
        f: impl FnOnce(&B, &mut NodeTable<B::File>, NodeIndex) -> VfsResult<R>,
    ) -> VfsResult<R> {
        let mut tree = self.lock()?;
        f(&self.backend, &mut tree.table, self.root)
    }

    fn handle(&self, index: NodeIndex) -> NodeHandle {
        NodeHandle::new(self.id, self.epoch, index)
    }

    fn index(&self, handle: NodeHandle) -> VfsResult<NodeIndex> {
        if handle.instance() != self.id {
            return Err(VfsError::invalid_args(format!(
                "handle belongs to {}, not {}",
                handle.instance(),
                self.id
            )));
        }
        if handle.epoch() != self.epoch {
            return Err(VfsError::StaleHandle);
        }
        Ok(handle.index())
    }

    fn lock(&self) -> VfsResult<MutexGuard<'_, Tree<B::File>>> {
        let tree = self.tree.lock();
        if !tree.mounted {
            return Err(VfsError::StaleHandle);
        }
        Ok(tree)
    }

    fn writable(&self) -> bool {
        !self.flags.read_only && self.backend.writable()
    }

    fn stat_node(&self, table: &NodeTable<B::File>, index: NodeIndex) -> VfsResult<Stat> {
        let node = table.get(index)?;
        let size = match &node.stream {
            Stream::File(file) => self.backend.file_len(file),
            Stream::Directory | Stream::Device(_) => 0,
        };
        Ok(Stat {
            id: node.id,
            name: node.name.clone(),
            kind: node.kind(),
            size,
            children: node.children.len(),
            mounted: node.mount.is_some(),
        })
    }

    /// Free a node that is out of the tree and no longer open.
    fn reclaim(&self, table: &mut NodeTable<B::File>, index: NodeIndex) -> VfsResult<bool> {
        let node = table.get(index)?;
        if node.is_linked() || node.opens > 0 {
            return Ok(false);
        }
        let node = table.delete(index, false)?;
        tracing::debug!(instance = %self.id, node = %node.id, name = %node.name, "reclaimed node");
        Ok(true)
    }
}

fn check_cookie(node: NodeHandle, kind: NodeKind, cookie: &Cookie) -> VfsResult<()> {
    if cookie.node() != node {
        return Err(VfsError::invalid_args(format!(
            "cookie was opened on another node of {}",
            cookie.node().instance()
        )));
    }
    if cookie.kind() != kind {
        return Err(VfsError::invalid_args(format!(
            "cookie opened a {} stream, node is a {}",
            cookie.kind(),
            kind
        )));
    }
    Ok(())
}

impl<B: Backend> Filesystem for Instance<B> {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn fs_type(&self) -> &'static str {
        self.backend.fs_type()
    }

    fn root(&self) -> NodeHandle {
        self.handle(self.root)
    }

    fn covered(&self) -> Option<NodeHandle> {
        self.covered
    }

    fn read_only(&self) -> bool {
        !self.writable()
    }

    fn unmount(&self) -> VfsResult<()> {
        let mut tree = self.lock()?;
        tree.mounted = false;
        let dropped = tree.table.clear();
        drop(tree);
        self.backend.unmounted();
        tracing::info!(
            instance = %self.id,
            fs_type = self.backend.fs_type(),
            dropped,
            "unmounted filesystem"
        );
        Ok(())
    }

    fn open(&self, base: NodeHandle, path: &str, stream: StreamRequest<'_>) -> VfsResult<Lookup<Opened>> {
        let base = self.index(base)?;
        let mut tree = self.lock()?;
        let index = match resolve(&tree.table, base, path)? {
            Walk::Redirect(r) => return Ok(Lookup::Redirect(r)),
            Walk::Found(index) => index,
        };
        let node = tree.table.get_mut(index)?;
        match_stream(node, stream, path)?;
        node.opens += 1;
        let handle = self.handle(index);
        Ok(Lookup::Found(Opened {
            node: handle,
            cookie: Cookie::new(handle, node.kind()),
        }))
    }

    fn create(&self, base: NodeHandle, path: &str, kind: NodeKind) -> VfsResult<Lookup<Opened>> {
        let base = self.index(base)?;
        let mut tree = self.lock()?;
        let (container, leaf) = match resolve_container(&tree.table, base, path)? {
            ContainerWalk::Redirect(r) => return Ok(Lookup::Redirect(r)),
            ContainerWalk::Found { container, leaf } => (container, leaf),
        };
        if !self.writable() {
            return Err(VfsError::ReadOnlyFilesystem);
        }
        if leaf.is_empty() || find_child(&tree.table, container, leaf)?.is_some() {
            return Err(VfsError::already_exists(path));
        }
        if leaf.len() > NAME_MAX {
            return Err(VfsError::invalid_args(format!("{path}: name longer than {NAME_MAX} bytes")));
        }
        let stream = match kind {
            NodeKind::Directory => Stream::Directory,
            NodeKind::File => Stream::File(self.backend.new_file()?),
            NodeKind::Device => {
                return Err(VfsError::not_allowed("device nodes come from the device registry"));
            }
        };
        let mut node = tree.table.create(leaf, stream)?;
        node.opens = 1;
        let index = tree.table.insert(node);
        insert_child(&mut tree.table, container, index)?;
        let handle = self.handle(index);
        Ok(Lookup::Found(Opened {
            node: handle,
            cookie: Cookie::new(handle, kind),
        }))
    }

    fn stat(&self, base: NodeHandle, path: &str, stream: StreamRequest<'_>) -> VfsResult<Lookup<Stat>> {
        let base = self.index(base)?;
        let tree = self.lock()?;
        let index = match resolve(&tree.table, base, path)? {
            Walk::Redirect(r) => return Ok(Lookup::Redirect(r)),
            Walk::Found(index) => index,
        };
        match_stream(tree.table.get(index)?, stream, path)?;
        self.stat_node(&tree.table, index).map(Lookup::Found)
    }

    fn remove(&self, base: NodeHandle, path: &str) -> VfsResult<Lookup<()>> {
        let base = self.index(base)?;
        let mut tree = self.lock()?;
        let (container, leaf) = match resolve_container(&tree.table, base, path)? {
            ContainerWalk::Redirect(r) => return Ok(Lookup::Redirect(r)),
            ContainerWalk::Found { container, leaf } => (container, leaf),
        };
        if !self.writable() {
            return Err(VfsError::ReadOnlyFilesystem);
        }
        if leaf.is_empty() {
            return Err(VfsError::invalid_args(format!("{path}: no final component")));
        }
        let index = find_child(&tree.table, container, leaf)?
            .ok_or_else(|| VfsError::not_found(path))?;
        let node = tree.table.get(index)?;
        if node.mount.is_some() {
            return Err(VfsError::not_allowed(format!("{path}: mount point is busy")));
        }
        if !node.children.is_empty() {
            return Err(VfsError::not_allowed(format!("{path}: directory not empty")));
        }
        detach_child(&mut tree.table, container, index)?;
        if !self.reclaim(&mut tree.table, index)? {
            tracing::debug!(instance = %self.id, path = %path, "removed node still open, reclaim deferred");
        }
        Ok(Lookup::Found(()))
    }

    fn path_of(&self, node: NodeHandle) -> VfsResult<String> {
        let index = self.index(node)?;
        let tree = self.lock()?;
        dir::path_of(&tree.table, index)
    }

    fn seek(&self, node: NodeHandle, cookie: &mut Cookie, pos: SeekFrom) -> VfsResult<u64> {
        let index = self.index(node)?;
        let tree = self.lock()?;
        let entry = tree.table.get(index)?;
        check_cookie(node, entry.kind(), cookie)?;
        let target = match &entry.stream {
            Stream::Directory => match pos {
                SeekFrom::Start(0) => 0,
                _ => return Err(VfsError::not_allowed("directories only rewind to the start")),
            },
            Stream::Device(dev) => {
                return Err(VfsError::not_allowed(format!("{} devices do not seek", dev.class())));
            }
            Stream::File(file) => {
                let (origin, delta) = match pos {
                    SeekFrom::Start(n) => (0, i128::from(n)),
                    SeekFrom::Current(d) => (cookie.position(), i128::from(d)),
                    SeekFrom::End(d) => (self.backend.file_len(file), i128::from(d)),
                };
                let target = i128::from(origin) + delta;
                u64::try_from(target)
                    .map_err(|_| VfsError::invalid_args(format!("seek to {target}")))?
            }
        };
        cookie.set_position(target);
        Ok(target)
    }

    fn read(&self, node: NodeHandle, cookie: &mut Cookie, buf: &mut [u8]) -> VfsResult<usize> {
        let index = self.index(node)?;
        let tree = self.lock()?;
        let entry = tree.table.get(index)?;
        check_cookie(node, entry.kind(), cookie)?;
        match &entry.stream {
            Stream::Directory => {
                // Counted from the oldest child: new entries go in front.
                let len = entry.children.len();
                let Some(child) = usize::try_from(cookie.position())
                    .ok()
                    .filter(|&pos| pos < len)
                    .and_then(|pos| entry.children.get(len - 1 - pos).copied())
                else {
                    return Ok(0);
                };
                let name = tree.table.get(child)?.name.as_bytes();
                if name.len() > buf.len() {
                    return Err(VfsError::invalid_args(format!(
                        "buffer of {} bytes cannot hold a {} byte name",
                        buf.len(),
                        name.len()
                    )));
                }
                buf[..name.len()].copy_from_slice(name);
                cookie.advance(1);
                Ok(name.len())
            }
            Stream::File(file) => {
                let n = self.backend.read_file(file, cookie.position(), buf)?;
                cookie.advance(n);
                Ok(n)
            }
            Stream::Device(dev) => {
                let n = dev.read(cookie.position(), buf)?;
                cookie.advance(n);
                Ok(n)
            }
        }
    }

    fn write(&self, node: NodeHandle, cookie: &mut Cookie, buf: &[u8]) -> VfsResult<usize> {
        let index = self.index(node)?;
        let writable = self.writable();
        let mut tree = self.lock()?;
        let entry = tree.table.get_mut(index)?;
        check_cookie(node, entry.kind(), cookie)?;
        let n = match &mut entry.stream {
            Stream::Directory => {
                return Err(VfsError::not_allowed("cannot write a directory stream"));
            }
            Stream::File(file) => {
                if !writable {
                    return Err(VfsError::ReadOnlyFilesystem);
                }
                self.backend.write_file(file, cookie.position(), buf)?
            }
            Stream::Device(dev) => dev.write(cookie.position(), buf)?,
        };
        cookie.advance(n);
        Ok(n)
    }

    fn ioctl(&self, node: NodeHandle, cookie: &mut Cookie, op: u32, arg: &mut [u8]) -> VfsResult<usize> {
        let index = self.index(node)?;
        let tree = self.lock()?;
        let entry = tree.table.get(index)?;
        check_cookie(node, entry.kind(), cookie)?;
        match &entry.stream {
            Stream::Device(dev) => dev.ioctl(op, arg),
            _ => Err(VfsError::not_allowed(format!("ioctl on a {} stream", entry.kind()))),
        }
    }

    fn close(&self, node: NodeHandle, cookie: Cookie) -> VfsResult<()> {
        let index = self.index(node)?;
        let mut tree = self.lock()?;
        let entry = tree.table.get_mut(index)?;
        check_cookie(node, entry.kind(), &cookie)?;
        entry.opens = entry.opens.saturating_sub(1);
        self.reclaim(&mut tree.table, index)?;
        Ok(())
    }

    fn register_mountpoint(&self, node: NodeHandle, target: MountTarget) -> VfsResult<()> {
        let index = self.index(node)?;
        if target.fs.id() == self.id && target.root.epoch() == self.epoch {
            return Err(VfsError::invalid_args("an instance cannot be mounted inside itself"));
        }
        let mut tree = self.lock()?;
        mount::register_mountpoint(&mut tree.table, index, target)
    }

    fn unregister_mountpoint(&self, node: NodeHandle) -> VfsResult<MountTarget> {
        let index = self.index(node)?;
        let mut tree = self.lock()?;
        mount::unregister_mountpoint(&mut tree.table, index)
    }

    fn mountpoints(&self) -> VfsResult<Vec<(NodeHandle, MountTarget)>> {
        let tree = self.lock()?;
        Ok(mount::mountpoints(&tree.table)
            .into_iter()
            .map(|(index, target)| (self.handle(index), target))
            .collect())
    }

    fn dispose_node(&self, node: NodeHandle) -> VfsResult<()> {
        let index = self.index(node)?;
        let mut tree = self.lock()?;
        self.reclaim(&mut tree.table, index)?;
        Ok(())
    }
}
