//! Mount registry: marks nodes whose subtree belongs to another instance.
//!
//! The registry only records redirects; deciding when to mount and keeping
//! the mounted instance alive is the dispatcher's business.

use super::error::{VfsError, VfsResult};
use super::node::MountTarget;
use super::table::NodeTable;
use super::types::NodeIndex;

/// Make `node` a mount point redirecting to `target`.
pub fn register_mountpoint<F>(
    table: &mut NodeTable<F>,
    node: NodeIndex,
    target: MountTarget,
) -> VfsResult<()> {
    let entry = table.get_mut(node)?;
    if !entry.kind().is_dir() {
        return Err(VfsError::not_a_directory(format!(
            "mount point {} ({})",
            entry.name, entry.id
        )));
    }
    if entry.mount.is_some() {
        return Err(VfsError::already_exists(format!(
            "mount point {} ({})",
            entry.name, entry.id
        )));
    }
    tracing::debug!(
        node = %entry.id,
        target = %target.fs.id(),
        fs_type = target.fs.fs_type(),
        "registered mount point"
    );
    entry.mount = Some(target);
    Ok(())
}

/// Clear the redirect on `node`, returning what it pointed at.
pub fn unregister_mountpoint<F>(table: &mut NodeTable<F>, node: NodeIndex) -> VfsResult<MountTarget> {
    let entry = table.get_mut(node)?;
    let target = entry.mount.take().ok_or_else(|| {
        VfsError::invalid_args(format!("{} is not a mount point", entry.id))
    })?;
    tracing::debug!(node = %entry.id, target = %target.fs.id(), "unregistered mount point");
    Ok(target)
}

/// Every mount point in the table.
pub fn mountpoints<F>(table: &NodeTable<F>) -> Vec<(NodeIndex, MountTarget)> {
    let mut out = Vec::new();
    table.for_each(|index, node| {
        if let Some(target) = &node.mount {
            out.push((index, target.clone()));
        }
    });
    out
}
