//! Virtual filesystem core.
//!
//! Every backend instance owns a private [`NodeTable`] of directories, files
//! and device nodes. Instances are stitched into one namespace by mount
//! points: a directory node that carries a [`MountTarget`]. Path resolution
//! never crosses an instance boundary on its own. It stops at a mount point
//! and returns a [`Redirect`] so the caller can re-issue the operation
//! against the mounted instance ([`follow`] does exactly that).
//!
//! - [`Filesystem`] - operation table every instance implements
//! - [`FsDriver`] - creates instances at mount time
//! - [`Instance`] - generic implementation over a [`Backend`]
//! - [`backends`] - memfs, devfs, bootfs and busfs
//!
//! ## Design Decisions
//!
//! - **Arena, not pointers**: nodes are addressed by slot and generation;
//!   handles also carry the mount epoch so they die with their instance.
//! - **One lock per instance**: held for a whole operation, walk included.
//! - **Redirects are values**: crossing a mount is a normal result, not an
//!   error.

pub mod backends;
mod device;
pub mod dir;
mod error;
mod follow;
mod instance;
pub mod mount;
mod node;
mod ops;
pub mod resolve;
pub mod table;
mod types;

pub use device::Device;
pub use error::{VfsError, VfsResult};
pub use follow::{MAX_REDIRECTS, follow, open_path, stat_path};
pub use instance::{Backend, Instance};
pub use node::{MountTarget, Node, Stream};
pub use ops::{Filesystem, FsDriver, Lookup, Opened};
pub use resolve::{ContainerWalk, Redirect, Walk};
pub use table::NodeTable;
pub use types::{
    Cookie, InstanceId, MountFlags, NAME_MAX, NodeHandle, NodeId, NodeIndex, NodeKind, SEPARATOR,
    Stat, StreamKind, StreamRequest,
};
