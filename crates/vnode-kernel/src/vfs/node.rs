//! Node and stream model.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::device::Device;
use super::ops::Filesystem;
use super::types::{NodeHandle, NodeId, NodeIndex, NodeKind, StreamKind};

/// Typed payload attached to a node.
///
/// `F` is the owning backend's file payload. Directory listings come from
/// the node's `children`, so the directory variant carries nothing.
pub enum Stream<F> {
    Directory,
    File(F),
    Device(Arc<dyn Device>),
}

impl<F> Stream<F> {
    /// Kind of this stream.
    pub fn kind(&self) -> StreamKind {
        match self {
            Stream::Directory => NodeKind::Directory,
            Stream::File(_) => NodeKind::File,
            Stream::Device(_) => NodeKind::Device,
        }
    }
}

impl<F> fmt::Debug for Stream<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Directory => f.write_str("Directory"),
            Stream::File(_) => f.write_str("File"),
            Stream::Device(dev) => f.debug_tuple("Device").field(&dev.class()).finish(),
        }
    }
}

/// Where a mount point hands resolution over to.
#[derive(Clone)]
pub struct MountTarget {
    /// The mounted instance.
    pub fs: Arc<dyn Filesystem>,
    /// Root node of `fs`.
    pub root: NodeHandle,
}

impl MountTarget {
    /// Target the root of a mounted instance.
    pub fn root_of(fs: Arc<dyn Filesystem>) -> Self {
        let root = fs.root();
        Self { fs, root }
    }
}

impl fmt::Debug for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountTarget")
            .field("fs", &self.fs.id())
            .field("fs_type", &self.fs.fs_type())
            .field("root", &self.root)
            .finish()
    }
}

/// One entry in an instance's namespace.
#[derive(Debug)]
pub struct Node<F> {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    /// `None` while detached; the root points at itself.
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: VecDeque<NodeIndex>,
    pub(crate) mount: Option<MountTarget>,
    pub(crate) stream: Stream<F>,
    /// Open cookies referring to this node.
    pub(crate) opens: u32,
}

impl<F> Node<F> {
    pub(crate) fn new(id: NodeId, name: String, stream: Stream<F>) -> Self {
        Self {
            id,
            name,
            parent: None,
            children: VecDeque::new(),
            mount: None,
            stream,
            opens: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.stream.kind()
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.children.iter().copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn mount(&self) -> Option<&MountTarget> {
        self.mount.as_ref()
    }

    pub fn stream(&self) -> &Stream<F> {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut Stream<F> {
        &mut self.stream
    }

    /// Returns true if the node is linked into a parent (the root counts,
    /// being its own parent).
    pub fn is_linked(&self) -> bool {
        self.parent.is_some()
    }
}
