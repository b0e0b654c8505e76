//! In-memory filesystem.
//!
//! Starts empty and grows through `create`. File contents are owned byte
//! vectors; everything is dropped at unmount.

use std::sync::Arc;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::instance::{Backend, Instance};
use crate::vfs::ops::{Filesystem, FsDriver};
use crate::vfs::table::NodeTable;
use crate::vfs::types::{InstanceId, MountFlags, NodeHandle};

/// Largest file a memfs instance grows by default.
pub const DEFAULT_MAX_FILE_LEN: usize = 64 << 20;

/// Driver for in-memory trees.
#[derive(Debug, Clone)]
pub struct MemFs {
    max_nodes: Option<usize>,
    max_file_len: usize,
}

impl Default for MemFs {
    fn default() -> Self {
        Self {
            max_nodes: None,
            max_file_len: DEFAULT_MAX_FILE_LEN,
        }
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap each instance at `max_nodes` live nodes (root included).
    pub fn with_max_nodes(max_nodes: usize) -> Self {
        Self {
            max_nodes: Some(max_nodes),
            ..Self::default()
        }
    }

    /// Writes that would grow a file past `len` bytes fail with `OutOfMemory`.
    pub fn max_file_len(mut self, len: usize) -> Self {
        self.max_file_len = len;
        self
    }
}

impl FsDriver for MemFs {
    fn name(&self) -> &'static str {
        "memfs"
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
        let fs = Instance::mount_with(
            id,
            flags,
            covered,
            MemStreams {
                max_file_len: self.max_file_len,
            },
            table,
            |_, _, _| Ok(()),
        )?;
        Ok(fs)
    }
}

/// File payloads for [`MemFs`]: plain byte vectors.
#[derive(Debug)]
pub struct MemStreams {
    max_file_len: usize,
}

impl Backend for MemStreams {
    type File = Vec<u8>;

    fn fs_type(&self) -> &'static str {
        "memfs"
    }

    fn writable(&self) -> bool {
        true
    }

    fn file_len(&self, file: &Vec<u8>) -> u64 {
        file.len() as u64
    }

    fn read_file(&self, file: &Vec<u8>, pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let start = usize::try_from(pos).unwrap_or(usize::MAX).min(file.len());
        let n = buf.len().min(file.len() - start);
        buf[..n].copy_from_slice(&file[start..start + n]);
        Ok(n)
    }

    fn write_file(&self, file: &mut Vec<u8>, pos: u64, buf: &[u8]) -> VfsResult<usize> {
        let start = usize::try_from(pos)
            .map_err(|_| VfsError::invalid_args(format!("write offset {pos}")))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| VfsError::invalid_args(format!("write of {} bytes at {pos}", buf.len())))?;
        if end > self.max_file_len && end > file.len() {
            return Err(VfsError::OutOfMemory);
        }
        if file.len() < end {
            file.resize(end, 0);
        }
        file[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn new_file(&self) -> VfsResult<Vec<u8>> {
        Ok(Vec::new())
    }
}
