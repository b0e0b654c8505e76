//! Core VFS types.
//!
//! Identifiers, handles and the small value types passed across the
//! [`Filesystem`](super::Filesystem) boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Path component separator.
pub const SEPARATOR: char = '/';

/// Longest name a directory read will hand out.
pub const NAME_MAX: usize = 255;

/// Node kind enumeration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Directory.
    Directory,
    /// Regular file.
    File,
    /// Device node.
    Device,
}

impl NodeKind {
    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    /// Returns true if this is a device node.
    pub fn is_device(&self) -> bool {
        matches!(self, NodeKind::Device)
    }
}

/// A stream's kind always mirrors the kind of the node carrying it.
pub type StreamKind = NodeKind;

/// Instance identifier, assigned by the caller at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fs{}", self.0)
    }
}

/// Node identifier, unique and monotonic within one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena position of a node inside one instance's table.
///
/// The generation changes every time the slot is reused, so an index kept
/// past a node's reclamation stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

/// Caller-visible node handle.
///
/// Carries the owning instance and its mount epoch: once the instance is
/// unmounted every handle it issued is stale, even if the caller mounts a
/// new instance under the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    instance: InstanceId,
    epoch: u64,
    index: NodeIndex,
}

impl NodeHandle {
    pub(crate) fn new(instance: InstanceId, epoch: u64, index: NodeIndex) -> Self {
        Self {
            instance,
            epoch,
            index,
        }
    }

    /// The instance that issued this handle.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Mount epoch of the issuing instance.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn index(&self) -> NodeIndex {
        self.index
    }
}

/// Which stream of a node an operation targets.
///
/// Nodes carry a single unnamed stream; a non-empty `name` never matches.
/// `kind: None` accepts whatever kind the node has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest<'a> {
    pub name: &'a str,
    pub kind: Option<StreamKind>,
}

impl<'a> StreamRequest<'a> {
    /// The unnamed stream, any kind.
    pub fn any() -> Self {
        Self {
            name: "",
            kind: None,
        }
    }

    /// The unnamed stream of the given kind.
    pub fn of(kind: StreamKind) -> Self {
        Self {
            name: "",
            kind: Some(kind),
        }
    }

    /// A named stream of the given kind.
    pub fn named(name: &'a str, kind: StreamKind) -> Self {
        Self {
            name,
            kind: Some(kind),
        }
    }

    /// Returns true if a node whose stream has `kind` satisfies this request.
    pub fn matches(&self, kind: StreamKind) -> bool {
        self.name.is_empty() && self.kind.is_none_or(|k| k == kind)
    }
}

/// Flags passed to [`FsDriver::mount`](super::FsDriver::mount).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountFlags {
    /// Refuse create/remove/file writes.
    #[serde(default)]
    pub read_only: bool,
}

impl MountFlags {
    /// Writable mount.
    pub fn read_write() -> Self {
        Self::default()
    }

    /// Read-only mount.
    pub fn read_only() -> Self {
        Self { read_only: true }
    }
}

/// Node metadata returned by `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Node id within its instance.
    pub id: NodeId,
    /// Entry name (empty for the root).
    pub name: String,
    /// Node kind.
    pub kind: NodeKind,
    /// File length in bytes; 0 for directories and devices.
    pub size: u64,
    /// Number of linked children.
    pub children: usize,
    /// True if the node is a mount point.
    pub mounted: bool,
}

impl Stat {
    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }
}

/// Per-open stream cursor.
///
/// Owned by the caller between calls and only valid for the node it was
/// opened on. For files and devices `pos` is a byte offset; for directories
/// it counts names already handed out.
#[derive(Debug, PartialEq, Eq)]
pub struct Cookie {
    node: NodeHandle,
    kind: StreamKind,
    pos: u64,
}

impl Cookie {
    pub(crate) fn new(node: NodeHandle, kind: StreamKind) -> Self {
        Self { node, kind, pos: 0 }
    }

    /// Node the stream was opened on.
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Kind of the opened stream.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub(crate) fn advance(&mut self, by: usize) {
        self.pos = self.pos.saturating_add(by as u64);
    }
}
