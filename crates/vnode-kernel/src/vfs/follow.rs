//! Re-issue an operation across mount redirects.
//!
//! This is the loop a dispatcher runs on top of [`Lookup::Redirect`]; it
//! keeps no references and does no counting of its own.

use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::ops::{Filesystem, Lookup, Opened};
use super::types::{NodeHandle, Stat, StreamRequest};

/// Redirect hops allowed before giving up with `MountLoop`.
pub const MAX_REDIRECTS: usize = 16;

/// Run `op` starting at `fs`/`base`, following redirects.
///
/// Returns the instance that produced the final result along with it.
pub fn follow<T>(
    fs: &Arc<dyn Filesystem>,
    base: NodeHandle,
    path: &str,
    mut op: impl FnMut(&dyn Filesystem, NodeHandle, &str) -> VfsResult<Lookup<T>>,
) -> VfsResult<(Arc<dyn Filesystem>, T)> {
    let mut fs = Arc::clone(fs);
    let mut base = base;
    let mut path = path.to_string();
    for _ in 0..=MAX_REDIRECTS {
        match op(fs.as_ref(), base, &path)? {
            Lookup::Found(value) => return Ok((fs, value)),
            Lookup::Redirect(r) => {
                fs = r.target.fs;
                base = r.target.root;
                path = r.remaining;
            }
        }
    }
    Err(VfsError::MountLoop)
}

/// Open `path` from the root of `fs`, crossing mounts as needed.
pub fn open_path(
    fs: &Arc<dyn Filesystem>,
    path: &str,
    stream: StreamRequest<'_>,
) -> VfsResult<(Arc<dyn Filesystem>, Opened)> {
    follow(fs, fs.root(), path, |fs, base, path| fs.open(base, path, stream))
}

/// Stat `path` from the root of `fs`, crossing mounts as needed.
pub fn stat_path(
    fs: &Arc<dyn Filesystem>,
    path: &str,
    stream: StreamRequest<'_>,
) -> VfsResult<(Arc<dyn Filesystem>, Stat)> {
    follow(fs, fs.root(), path, |fs, base, path| fs.stat(base, path, stream))
}
