//! Boot image filesystem (bootfs).
//!
//! A boot image is one contiguous blob handed over by the loader together
//! with a table of `{path, location, length}` entries. Mounting builds the
//! whole tree eagerly; file nodes are extents into the shared blob, so no
//! file bytes are copied. The tree is read-only.

use std::path::Path;
use std::sync::Arc;

use crate::vfs::dir::{create_dir_if_absent, find_child, insert_child};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::instance::{Backend, Instance};
use crate::vfs::node::Stream;
use crate::vfs::ops::{Filesystem, FsDriver};
use crate::vfs::table::NodeTable;
use crate::vfs::types::{InstanceId, MountFlags, NodeHandle, NodeIndex, SEPARATOR};

/// One file in the boot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    pub path: String,
    /// Byte offset into the image.
    pub location: u64,
    pub length: u64,
}

/// Boot image blob plus its entry table.
#[derive(Debug, Clone)]
pub struct BootImage {
    data: Arc<[u8]>,
    entries: Vec<BootEntry>,
}

impl BootImage {
    pub fn new(data: impl Into<Arc<[u8]>>, entries: Vec<BootEntry>) -> Self {
        Self {
            data: data.into(),
            entries,
        }
    }

    /// Pack host files into an image.
    ///
    /// Each item is `(path inside the image, host file)`; relative host
    /// paths are taken from `base`.
    pub fn from_manifest<'a>(
        base: &Path,
        files: impl IntoIterator<Item = (&'a str, &'a Path)>,
    ) -> std::io::Result<Self> {
        let mut builder = BootImageBuilder::new();
        for (path, source) in files {
            let bytes = std::fs::read(base.join(source))?;
            builder.add(path, &bytes);
        }
        Ok(builder.build())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn entries(&self) -> &[BootEntry] {
        &self.entries
    }
}

/// Packs named blobs back to back into a [`BootImage`].
#[derive(Debug, Default)]
pub struct BootImageBuilder {
    data: Vec<u8>,
    entries: Vec<BootEntry>,
}

impl BootImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, bytes: &[u8]) -> &mut Self {
        self.entries.push(BootEntry {
            path: path.into(),
            location: self.data.len() as u64,
            length: bytes.len() as u64,
        });
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> BootImage {
        BootImage::new(self.data, self.entries)
    }
}

/// Driver that mounts a [`BootImage`].
#[derive(Debug, Clone)]
pub struct BootFs {
    image: BootImage,
    max_nodes: Option<usize>,
}

impl BootFs {
    pub fn new(image: BootImage) -> Self {
        Self {
            image,
            max_nodes: None,
        }
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }
}

impl FsDriver for BootFs {
    fn name(&self) -> &'static str {
        "bootfs"
    }

    fn mount(
        &self,
        id: InstanceId,
        flags: MountFlags,
        covered: Option<NodeHandle>,
    ) -> VfsResult<Arc<dyn Filesystem>> {
        let table = match self.max_nodes {
            Some(limit) => NodeTable::with_limit(limit),
            None => NodeTable::new(),
        };
        let backend = BootExtents {
            data: Arc::clone(&self.image.data),
        };
        let entries = &self.image.entries;
        let fs = Instance::mount_with(id, flags, covered, backend, table, |backend, table, root| {
            for entry in entries {
                insert_entry(backend, table, root, entry)?;
            }
            Ok(())
        })?;
        Ok(fs)
    }
}

/// A file's bytes: an extent of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub location: u64,
    pub length: u64,
}

/// File payloads for [`BootFs`].
pub struct BootExtents {
    data: Arc<[u8]>,
}

impl BootExtents {
    fn check(&self, entry: &BootEntry) -> VfsResult<Extent> {
        let end = entry.location.checked_add(entry.length);
        if end.is_none_or(|end| end > self.data.len() as u64) {
            return Err(VfsError::invalid_args(format!(
                "{}: extent {}+{} outside a {} byte image",
                entry.path,
                entry.location,
                entry.length,
                self.data.len()
            )));
        }
        Ok(Extent {
            location: entry.location,
            length: entry.length,
        })
    }
}

impl Backend for BootExtents {
    type File = Extent;

    fn fs_type(&self) -> &'static str {
        "bootfs"
    }

    fn file_len(&self, file: &Extent) -> u64 {
        file.length
    }

    fn read_file(&self, file: &Extent, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        if pos >= file.length {
            return Ok(0);
        }
        let n = buf.len().min((file.length - pos) as usize);
        let start = (file.location + pos) as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

fn insert_entry(
    backend: &BootExtents,
    table: &mut NodeTable<Extent>,
    root: NodeIndex,
    entry: &BootEntry,
) -> VfsResult<()> {
    let extent = backend.check(entry)?;
    let mut parts: Vec<&str> = entry.path.split(SEPARATOR).filter(|p| !p.is_empty()).collect();
    let Some(name) = parts.pop() else {
        return Err(VfsError::invalid_args(format!("boot entry {:?} has no name", entry.path)));
    };
    let mut dir = root;
    for part in parts {
        dir = create_dir_if_absent(table, dir, part)?;
    }
    if find_child(table, dir, name)?.is_some() {
        return Err(VfsError::already_exists(entry.path.as_str()));
    }
    let node = table.create(name, Stream::File(extent))?;
    let index = table.insert(node);
    insert_child(table, dir, index)
}
