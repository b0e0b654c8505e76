//! Filesystem drivers.
//!
//! Each driver builds on [`Instance`](crate::vfs::Instance) and differs only
//! in its file payload and how the tree is populated at mount.

mod bootfs;
mod busfs;
mod devfs;
pub mod devices;
mod memfs;

pub use bootfs::{BootEntry, BootExtents, BootFs, BootImage, BootImageBuilder, Extent};
pub use busfs::{BusAttributes, BusFs, BusTopology, PciFunction};
pub use devfs::{DevFs, DevStreams, StandardDevices};
pub use devices::{ConsoleDevice, KeyboardDevice, NullDevice, ZeroDevice};
pub use memfs::{DEFAULT_MAX_FILE_LEN, MemFs, MemStreams};
