//! Directory operations over a [`NodeTable`].

use super::error::{VfsError, VfsResult};
use super::node::Stream;
use super::table::NodeTable;
use super::types::{NodeIndex, SEPARATOR};

/// Create the nameless root directory. Its parent is itself.
pub fn make_root<F>(table: &mut NodeTable<F>) -> VfsResult<NodeIndex> {
    let node = table.create("", Stream::Directory)?;
    let root = table.insert(node);
    table.get_mut(root)?.parent = Some(root);
    Ok(root)
}

/// Find a child by exact name. First hit wins.
pub fn find_child<F>(
    table: &NodeTable<F>,
    dir: NodeIndex,
    name: &str,
) -> VfsResult<Option<NodeIndex>> {
    let dir = table.get(dir)?;
    for child in dir.children() {
        if table.get(child)?.name == name {
            return Ok(Some(child));
        }
    }
    Ok(None)
}

/// Link `child` into `dir`, in front of the existing children.
pub fn insert_child<F>(table: &mut NodeTable<F>, dir: NodeIndex, child: NodeIndex) -> VfsResult<()> {
    if !table.get(dir)?.kind().is_dir() {
        return Err(VfsError::invalid_args("insert into a non-directory"));
    }
    table.get_mut(child)?.parent = Some(dir);
    table.get_mut(dir)?.children.push_front(child);
    Ok(())
}

/// Unlink `child` from `dir`. The node stays in the table.
pub fn detach_child<F>(table: &mut NodeTable<F>, dir: NodeIndex, child: NodeIndex) -> VfsResult<()> {
    let parent = table.get_mut(dir)?;
    let Some(pos) = parent.children.iter().position(|&c| c == child) else {
        return Err(VfsError::invalid_args("node is not a child of this directory"));
    };
    parent.children.remove(pos);
    table.get_mut(child)?.parent = None;
    Ok(())
}

/// Return the directory child `name`, creating it if absent.
pub fn create_dir_if_absent<F>(
    table: &mut NodeTable<F>,
    dir: NodeIndex,
    name: &str,
) -> VfsResult<NodeIndex> {
    if let Some(existing) = find_child(table, dir, name)? {
        if !table.get(existing)?.kind().is_dir() {
            return Err(VfsError::not_a_directory(name));
        }
        return Ok(existing);
    }
    let node = table.create(name, Stream::Directory)?;
    let index = table.insert(node);
    if let Err(e) = insert_child(table, dir, index) {
        table.remove(index);
        return Err(e);
    }
    Ok(index)
}

/// Rebuild a node's path by walking parents back to the root.
pub fn path_of<F>(table: &NodeTable<F>, index: NodeIndex) -> VfsResult<String> {
    let mut names = Vec::new();
    let mut cur = index;
    loop {
        let node = table.get(cur)?;
        match node.parent {
            Some(parent) if parent == cur => break,
            Some(parent) => {
                names.push(node.name.as_str());
                cur = parent;
            }
            None => return Err(VfsError::invalid_args("node is detached from the tree")),
        }
    }
    if names.is_empty() {
        return Ok(SEPARATOR.to_string());
    }
    let mut path = String::new();
    for name in names.iter().rev() {
        path.push(SEPARATOR);
        path.push_str(name);
    }
    Ok(path)
}
