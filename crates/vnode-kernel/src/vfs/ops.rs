//! Backend operation table.
//!
//! [`FsDriver`] creates instances; [`Filesystem`] is one mounted instance.
//! Every path-taking operation performs a single resolver walk under the
//! instance lock and either succeeds, fails with a [`VfsError`], or returns
//! [`Lookup::Redirect`]. On a redirect the caller re-issues the same
//! operation against `redirect.target.fs`, starting at
//! `redirect.target.root` with `redirect.remaining`; it must not retry here.

use std::io::SeekFrom;
use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::node::MountTarget;
use super::resolve::Redirect;
use super::types::{Cookie, InstanceId, MountFlags, NAME_MAX, NodeHandle, NodeKind, Stat, StreamRequest};

/// Result of a path-taking operation.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    Redirect(Redirect),
}

impl<T> Lookup<T> {
    /// Returns true if resolution crossed into another instance.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Lookup::Redirect(_))
    }

    /// The local result, if any.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Redirect(_) => None,
        }
    }

    /// The redirect, if any.
    pub fn redirect(self) -> Option<Redirect> {
        match self {
            Lookup::Found(_) => None,
            Lookup::Redirect(r) => Some(r),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::Redirect(r) => Lookup::Redirect(r),
        }
    }
}

/// An opened stream: the node plus the caller-held cursor.
#[derive(Debug)]
pub struct Opened {
    pub node: NodeHandle,
    pub cookie: Cookie,
}

/// A filesystem driver: knows how to mount instances of itself.
pub trait FsDriver: Send + Sync {
    /// Driver name (e.g. "memfs").
    fn name(&self) -> &'static str;

    /// Mount a new instance.
    ///
    /// `id` is chosen by the caller. `covered` is the node this instance
    /// will hide in the parent namespace, kept for bookkeeping only.
    fn mount(
        &self,
        id: InstanceId,
        flags: MountFlags,
        covered: Option<NodeHandle>,
    ) -> VfsResult<Arc<dyn Filesystem>>;
}

/// One mounted filesystem instance.
pub trait Filesystem: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    fn id(&self) -> InstanceId;

    /// Name of the driver that mounted this instance.
    fn fs_type(&self) -> &'static str;

    /// Root node handle.
    fn root(&self) -> NodeHandle;

    /// Node covered in the parent namespace, if any.
    fn covered(&self) -> Option<NodeHandle>;

    /// Returns true if create/remove/file writes are refused.
    fn read_only(&self) -> bool;

    /// Tear down the whole node table. Every handle becomes stale.
    fn unmount(&self) -> VfsResult<()>;

    // ========================================================================
    // Path operations
    // ========================================================================

    /// Open the stream `stream` of the node at `path`.
    fn open(&self, base: NodeHandle, path: &str, stream: StreamRequest<'_>) -> VfsResult<Lookup<Opened>>;

    /// Create a node of `kind` at `path` and open it.
    fn create(&self, base: NodeHandle, path: &str, kind: NodeKind) -> VfsResult<Lookup<Opened>>;

    /// Describe the node at `path`.
    fn stat(&self, base: NodeHandle, path: &str, stream: StreamRequest<'_>) -> VfsResult<Lookup<Stat>>;

    /// Unlink the node at `path`.
    ///
    /// Non-empty directories and mount points are refused with `NotAllowed`.
    fn remove(&self, base: NodeHandle, path: &str) -> VfsResult<Lookup<()>>;

    /// Path of `node` from this instance's root.
    fn path_of(&self, node: NodeHandle) -> VfsResult<String>;

    // ========================================================================
    // Stream operations
    // ========================================================================

    /// Reposition the cursor.
    ///
    /// Directory streams only support rewinding (`SeekFrom::Start(0)`);
    /// device streams do not seek.
    fn seek(&self, node: NodeHandle, cookie: &mut Cookie, pos: SeekFrom) -> VfsResult<u64>;

    /// Read from the stream.
    ///
    /// On a directory each call yields one child name and `Ok(0)` at the end.
    fn read(&self, node: NodeHandle, cookie: &mut Cookie, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write to the stream.
    fn write(&self, node: NodeHandle, cookie: &mut Cookie, buf: &[u8]) -> VfsResult<usize>;

    /// Device control request.
    fn ioctl(&self, node: NodeHandle, cookie: &mut Cookie, op: u32, arg: &mut [u8]) -> VfsResult<usize>;

    /// Release an open cookie.
    fn close(&self, node: NodeHandle, cookie: Cookie) -> VfsResult<()>;

    // ========================================================================
    // Mounts and reclamation
    // ========================================================================

    /// Make `node` redirect to `target`.
    fn register_mountpoint(&self, node: NodeHandle, target: MountTarget) -> VfsResult<()>;

    /// Remove the redirect on `node`.
    fn unregister_mountpoint(&self, node: NodeHandle) -> VfsResult<MountTarget>;

    /// Every mount point in this instance.
    fn mountpoints(&self) -> VfsResult<Vec<(NodeHandle, MountTarget)>>;

    /// The dispatcher dropped its last reference to `node`.
    ///
    /// Removed nodes with no open cookies are reclaimed; nodes still linked
    /// into the tree live as long as the instance.
    fn dispose_node(&self, node: NodeHandle) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Rewind a directory stream and collect every child name.
    fn read_dir(&self, node: NodeHandle, cookie: &mut Cookie) -> VfsResult<Vec<String>> {
        if !cookie.kind().is_dir() {
            return Err(VfsError::not_a_directory(format!("{node:?}")));
        }
        self.seek(node, cookie, SeekFrom::Start(0))?;
        let mut names = Vec::new();
        let mut buf = [0u8; NAME_MAX];
        loop {
            let n = self.read(node, cookie, &mut buf)?;
            if n == 0 {
                return Ok(names);
            }
            names.push(String::from_utf8_lossy(&buf[..n]).into_owned());
        }
    }

    /// Read a file stream from the cursor to its end.
    fn read_to_end(&self, node: NodeHandle, cookie: &mut Cookie) -> VfsResult<Vec<u8>> {
        if !cookie.kind().is_file() {
            return Err(VfsError::invalid_args(format!(
                "read_to_end on a {} stream",
                cookie.kind()
            )));
        }
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(node, cookie, &mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}
