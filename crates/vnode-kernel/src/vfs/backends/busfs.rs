//! PCI bus filesystem (busfs).
//!
//! Exposes an enumerated bus as a fixed, read-only tree:
//!
//! ```text
//! /00/1f.3/vendor     "0x8086\n"
//! /00/1f.3/device     "0x2668\n"
//! /00/1f.3/class      "0x040300\n"
//! /00/1f.3/revision   "0x01\n"
//! ```
//!
//! Enumeration happens elsewhere; this backend only lays out what it is
//! given in a [`BusTopology`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::vfs::dir::{create_dir_if_absent, find_child, insert_child};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::instance::{Backend, Instance};
use crate::vfs::node::Stream;
use crate::vfs::ops::{Filesystem, FsDriver};
use crate::vfs::table::NodeTable;
use crate::vfs::types::{InstanceId, MountFlags, NodeHandle, NodeIndex};

/// One enumerated PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciFunction {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    /// Class, subclass and programming interface packed as `0xCCSSPP`.
    pub class: u32,
    #[serde(default)]
    pub revision: u8,
}

impl PciFunction {
    /// Directory names for this function: bus, then `device.function`.
    pub fn location(&self) -> (String, String) {
        (
            format!("{:02x}", self.bus),
            format!("{:02x}.{}", self.device, self.function),
        )
    }

    fn attributes(&self) -> [(&'static str, String); 4] {
        [
            ("vendor", format!("{:#06x}\n", self.vendor_id)),
            ("device", format!("{:#06x}\n", self.device_id)),
            ("class", format!("{:#08x}\n", self.class & 0x00ff_ffff)),
            ("revision", format!("{:#04x}\n", self.revision)),
        ]
    }
}

/// Result of a bus scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTopology {
    pub functions: Vec<PciFunction>,
}

impl BusTopology {
    pub fn new(functions: Vec<PciFunction>) -> Self {
        Self { functions }
    }
}

/// Driver for the PCI tree.
#[derive(Debug, Clone)]
pub struct BusFs {
    topology: Arc<BusTopology>,
}

impl BusFs {
    pub fn new(topology: BusTopology) -> Self {
        Self {
            topology: Arc::new(topology),
        }
    }
}

impl FsDriver for BusFs {
    fn name(&self) -> &'static str {
        "busfs"
    }

    fn mount(
        &self,
        id: InstanceId,
        flags: MountFlags,
        covered: Option<NodeHandle>,
    ) -> VfsResult<Arc<dyn Filesystem>> {
        let topology = Arc::clone(&self.topology);
        let fs = Instance::mount_with(id, flags, covered, BusAttributes, NodeTable::new(), |_, table, root| {
            for function in &topology.functions {
                insert_function(table, root, function)?;
            }
            Ok(())
        })?;
        Ok(fs)
    }
}

/// File payloads for [`BusFs`]: rendered attribute text.
#[derive(Debug)]
pub struct BusAttributes;

impl Backend for BusAttributes {
    type File = String;

    fn fs_type(&self) -> &'static str {
        "busfs"
    }

    fn file_len(&self, file: &String) -> u64 {
        file.len() as u64
    }

    fn read_file(&self, file: &String, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let bytes = file.as_bytes();
        let start = usize::try_from(pos).unwrap_or(usize::MAX).min(bytes.len());
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        Ok(n)
    }
}

fn insert_function(table: &mut NodeTable<String>, root: NodeIndex, function: &PciFunction) -> VfsResult<()> {
    let (bus, slot) = function.location();
    let bus_dir = create_dir_if_absent(table, root, &bus)?;
    if find_child(table, bus_dir, &slot)?.is_some() {
        return Err(VfsError::already_exists(format!("/{bus}/{slot}")));
    }
    let dir = create_dir_if_absent(table, bus_dir, &slot)?;
    for (name, text) in function.attributes() {
        let node = table.create(name, Stream::File(text))?;
        let index = table.insert(node);
        insert_child(table, dir, index)?;
    }
    Ok(())
}
