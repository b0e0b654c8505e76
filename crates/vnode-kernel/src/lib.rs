//! # vnode-kernel
//!
//! Kernel VFS core: a per-instance node arena, the path resolver with mount
//! redirection, the backend operation table and the stock backends.
//!
//! A namespace is a tree of instances. The root instance owns `/`; other
//! instances are attached at directory nodes with
//! [`Filesystem::register_mountpoint`]. Path operations return
//! [`Lookup::Redirect`] when they reach a mount point, and
//! [`follow`](vfs::follow) re-issues them against the mounted instance.
//!
//! ```text
//! memfs (/)
//!  ├── dev  ──▶ devfs   null, zero, console, input/keyboard
//!  ├── boot ──▶ bootfs  files from the boot image
//!  └── bus  ──▶ busfs   <bus>/<dev>.<fn>/{vendor,device,class,revision}
//! ```

pub mod config;
pub mod vfs;

pub use config::{ConfigError, FsKind, VnodeConfig};
pub use vfs::{
    Filesystem, FsDriver, InstanceId, Lookup, MountFlags, MountTarget, NodeHandle, NodeKind,
    Opened, Stat, StreamRequest, VfsError, VfsResult,
    backends::{BootFs, BusFs, DevFs, MemFs},
};
