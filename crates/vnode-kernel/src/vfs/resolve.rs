//! Path resolution with mount-point redirection.
//!
//! Paths are split on [`SEPARATOR`]; empty components (leading, trailing or
//! doubled separators) keep the walk where it is. There is no `..`.
//!
//! A node with a mount target ends the walk: whatever is left of the path,
//! starting at the separator in front of the next component, is handed back
//! as a [`Redirect`] for the caller to re-issue against the target instance.
//! The mount check runs before child lookup, so a mount point always shadows
//! local children, and it runs once more after the last component so a path
//! ending on a mount point redirects with an empty remainder.

use super::dir::find_child;
use super::error::{VfsError, VfsResult};
use super::node::{MountTarget, Node};
use super::table::NodeTable;
use super::types::{NodeIndex, SEPARATOR, StreamRequest};

/// Resolution crossed into another instance.
#[derive(Debug, Clone)]
pub struct Redirect {
    /// Instance and root to continue in.
    pub target: MountTarget,
    /// Unconsumed part of the path, including its leading separator.
    pub remaining: String,
}

/// Outcome of [`resolve`].
#[derive(Debug)]
pub enum Walk {
    Found(NodeIndex),
    Redirect(Redirect),
}

/// Outcome of [`resolve_container`].
#[derive(Debug)]
pub enum ContainerWalk<'p> {
    /// `container` is the directory that would hold `leaf`.
    Found { container: NodeIndex, leaf: &'p str },
    Redirect(Redirect),
}

struct Component<'p> {
    /// Where the remaining path starts if the walk stops before this component.
    rest: usize,
    /// Where the component itself starts.
    begin: usize,
    name: &'p str,
}

fn components(path: &str) -> Vec<Component<'_>> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut begin: usize = 0;
    for name in path.split(SEPARATOR) {
        out.push(Component {
            rest: begin.saturating_sub(1),
            begin,
            name,
        });
        begin += name.len() + SEPARATOR.len_utf8();
    }
    out
}

fn redirect(target: &MountTarget, remaining: &str) -> Redirect {
    tracing::trace!(
        fs = %target.fs.id(),
        remaining = %remaining,
        "path crosses mount point"
    );
    Redirect {
        target: target.clone(),
        remaining: remaining.to_string(),
    }
}

fn walk<F>(
    table: &NodeTable<F>,
    base: NodeIndex,
    path: &str,
    comps: &[Component<'_>],
    end: usize,
) -> VfsResult<Walk> {
    let mut cur = base;
    for comp in comps {
        let node = table.get(cur)?;
        if let Some(target) = &node.mount {
            return Ok(Walk::Redirect(redirect(target, &path[comp.rest..])));
        }
        if !node.kind().is_dir() {
            let consumed = &path[..comp.rest];
            return Err(VfsError::not_a_directory(if consumed.is_empty() {
                path
            } else {
                consumed
            }));
        }
        if comp.name.is_empty() {
            continue;
        }
        cur = find_child(table, cur, comp.name)?
            .ok_or_else(|| VfsError::not_found(&path[..comp.begin + comp.name.len()]))?;
    }
    if let Some(target) = &table.get(cur)?.mount {
        return Ok(Walk::Redirect(redirect(target, &path[end..])));
    }
    Ok(Walk::Found(cur))
}

/// Resolve `path` starting at `base`.
pub fn resolve<F>(table: &NodeTable<F>, base: NodeIndex, path: &str) -> VfsResult<Walk> {
    let comps = components(path);
    walk(table, base, path, &comps, path.len())
}

/// Resolve everything but the last component of `path`.
///
/// Returns the directory that would contain the final component along with
/// that component, which may be empty for paths ending in a separator.
pub fn resolve_container<'p, F>(
    table: &NodeTable<F>,
    base: NodeIndex,
    path: &'p str,
) -> VfsResult<ContainerWalk<'p>> {
    let mut comps = components(path);
    let (leaf, end) = match comps.pop() {
        Some(last) => (last.name, last.rest),
        None => ("", 0),
    };
    match walk(table, base, path, &comps, end)? {
        Walk::Redirect(r) => Ok(ContainerWalk::Redirect(r)),
        Walk::Found(container) => {
            if !table.get(container)?.kind().is_dir() {
                return Err(VfsError::not_a_directory(&path[..end]));
            }
            Ok(ContainerWalk::Found { container, leaf })
        }
    }
}

/// Check that `node` carries the requested stream.
pub fn match_stream<F>(node: &Node<F>, request: StreamRequest<'_>, path: &str) -> VfsResult<()> {
    if request.matches(node.kind()) {
        Ok(())
    } else {
        Err(VfsError::not_found(format!(
            "{path}: no {} stream{}",
            request.kind.map_or("matching".to_string(), |k| k.to_string()),
            if request.name.is_empty() {
                String::new()
            } else {
                format!(" named {:?}", request.name)
            }
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemFs;
    use crate::vfs::dir::{create_dir_if_absent, insert_child, make_root, path_of};
    use crate::vfs::mount::{register_mountpoint, unregister_mountpoint};
    use crate::vfs::node::Stream;
    use crate::vfs::ops::FsDriver;
    use crate::vfs::types::{InstanceId, MountFlags, NodeKind};

    fn tree() -> (NodeTable<()>, NodeIndex) {
        let mut table = NodeTable::new();
        let root = make_root(&mut table).unwrap();
        let a = create_dir_if_absent(&mut table, root, "a").unwrap();
        let b = create_dir_if_absent(&mut table, a, "b").unwrap();
        let file = table.create("file", Stream::File(())).unwrap();
        let file = table.insert(file);
        insert_child(&mut table, b, file).unwrap();
        (table, root)
    }

    fn found(walk: Walk) -> NodeIndex {
        match walk {
            Walk::Found(index) => index,
            Walk::Redirect(r) => panic!("unexpected redirect to {:?}", r.remaining),
        }
    }

    fn target() -> MountTarget {
        let fs = MemFs::new().mount(InstanceId(9), MountFlags::default(), None).unwrap();
        MountTarget::root_of(fs)
    }

    #[test]
    fn test_empty_and_separator_resolve_to_base() {
        let (table, root) = tree();
        assert_eq!(found(resolve(&table, root, "").unwrap()), root);
        assert_eq!(found(resolve(&table, root, "/").unwrap()), root);
        assert_eq!(found(resolve(&table, root, "///").unwrap()), root);
    }

    #[test]
    fn test_doubled_separators_are_ignored() {
        let (table, root) = tree();
        let direct = found(resolve(&table, root, "/a/b/file").unwrap());
        let sloppy = found(resolve(&table, root, "//a///b//file").unwrap());
        assert_eq!(direct, sloppy);
        let relative = found(resolve(&table, root, "a/b/file").unwrap());
        assert_eq!(direct, relative);
    }

    #[test]
    fn test_resolved_path_round_trips_through_parents() {
        let (table, root) = tree();
        for path in ["/a", "/a/b", "/a/b/file"] {
            let index = found(resolve(&table, root, path).unwrap());
            assert_eq!(path_of(&table, index).unwrap(), path);
        }
    }

    #[test]
    fn test_missing_component_is_not_found() {
        let (table, root) = tree();
        match resolve(&table, root, "/a/nope/file") {
            Err(VfsError::NotFound(path)) => assert_eq!(path, "/a/nope"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_descending_through_file_is_not_a_directory() {
        let (table, root) = tree();
        assert!(matches!(
            resolve(&table, root, "/a/b/file/more"),
            Err(VfsError::NotADirectory(_))
        ));
        assert!(matches!(
            resolve(&table, root, "/a/b/file/"),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_mount_point_redirects_with_remaining_path() {
        let (mut table, root) = tree();
        let a = found(resolve(&table, root, "/a").unwrap());
        let target = target();
        register_mountpoint(&mut table, a, target.clone()).unwrap();

        match resolve(&table, root, "/a/x/y").unwrap() {
            Walk::Redirect(r) => {
                assert_eq!(r.remaining, "/x/y");
                assert_eq!(r.target.root, target.root);
            }
            Walk::Found(_) => panic!("expected redirect"),
        }
    }

    #[test]
    fn test_mount_point_shadows_local_children() {
        let (mut table, root) = tree();
        let a = found(resolve(&table, root, "/a").unwrap());
        register_mountpoint(&mut table, a, target()).unwrap();

        // "/a/b" exists locally but the mount wins.
        assert!(matches!(resolve(&table, root, "/a/b").unwrap(), Walk::Redirect(_)));
        // Redirect also beats NotFound.
        assert!(matches!(resolve(&table, root, "/a/zzz").unwrap(), Walk::Redirect(_)));
    }

    #[test]
    fn test_path_ending_at_mount_point_redirects_empty() {
        let (mut table, root) = tree();
        let a = found(resolve(&table, root, "/a").unwrap());
        register_mountpoint(&mut table, a, target()).unwrap();

        match resolve(&table, root, "/a").unwrap() {
            Walk::Redirect(r) => assert_eq!(r.remaining, ""),
            Walk::Found(_) => panic!("expected redirect"),
        }
        match resolve(&table, root, "/a/").unwrap() {
            Walk::Redirect(r) => assert_eq!(r.remaining, "/"),
            Walk::Found(_) => panic!("expected redirect"),
        }
    }

    #[test]
    fn test_unregister_restores_resolution() {
        let (mut table, root) = tree();
        let a = found(resolve(&table, root, "/a").unwrap());
        let before = found(resolve(&table, root, "/a/b/file").unwrap());

        register_mountpoint(&mut table, a, target()).unwrap();
        assert!(matches!(resolve(&table, root, "/a/b/file").unwrap(), Walk::Redirect(_)));
        unregister_mountpoint(&mut table, a).unwrap();

        assert_eq!(found(resolve(&table, root, "/a/b/file").unwrap()), before);
        assert!(matches!(
            resolve(&table, root, "/a/missing"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_container_resolution() {
        let (table, root) = tree();
        let b = found(resolve(&table, root, "/a/b").unwrap());
        match resolve_container(&table, root, "/a/b/newfile").unwrap() {
            ContainerWalk::Found { container, leaf } => {
                assert_eq!(container, b);
                assert_eq!(leaf, "newfile");
            }
            ContainerWalk::Redirect(_) => panic!("expected container"),
        }
        match resolve_container(&table, root, "top").unwrap() {
            ContainerWalk::Found { container, leaf } => {
                assert_eq!(container, root);
                assert_eq!(leaf, "top");
            }
            ContainerWalk::Redirect(_) => panic!("expected container"),
        }
        match resolve_container(&table, root, "/a/b/").unwrap() {
            ContainerWalk::Found { container, leaf } => {
                assert_eq!(container, b);
                assert_eq!(leaf, "");
            }
            ContainerWalk::Redirect(_) => panic!("expected container"),
        }
    }

    #[test]
    fn test_container_under_file_is_not_a_directory() {
        let (table, root) = tree();
        assert!(matches!(
            resolve_container(&table, root, "/a/b/file/new"),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_container_at_mount_point_redirects() {
        let (mut table, root) = tree();
        let a = found(resolve(&table, root, "/a").unwrap());
        register_mountpoint(&mut table, a, target()).unwrap();

        match resolve_container(&table, root, "/a/newfile").unwrap() {
            ContainerWalk::Redirect(r) => assert_eq!(r.remaining, "/newfile"),
            ContainerWalk::Found { .. } => panic!("expected redirect"),
        }
        match resolve_container(&table, root, "/a/deep/newfile").unwrap() {
            ContainerWalk::Redirect(r) => assert_eq!(r.remaining, "/deep/newfile"),
            ContainerWalk::Found { .. } => panic!("expected redirect"),
        }
    }

    #[test]
    fn test_stream_mismatch_is_not_found() {
        let (table, root) = tree();
        let file = found(resolve(&table, root, "/a/b/file").unwrap());
        let node = table.get(file).unwrap();

        match_stream(node, StreamRequest::of(NodeKind::File), "/a/b/file").unwrap();
        match_stream(node, StreamRequest::any(), "/a/b/file").unwrap();
        assert!(matches!(
            match_stream(node, StreamRequest::of(NodeKind::Directory), "/a/b/file"),
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            match_stream(node, StreamRequest::named("meta", NodeKind::File), "/a/b/file"),
            Err(VfsError::NotFound(_))
        ));
    }
}
