//! Namespace assembly from a [`VnodeConfig`].

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use vnode_kernel::vfs::backends::{BootFs, BusFs, DevFs, MemFs};
use vnode_kernel::vfs::{
    Filesystem, FsDriver, InstanceId, MountFlags, MountTarget, NodeHandle, NodeKind, SEPARATOR,
    StreamRequest, VfsError, follow, open_path, stat_path,
};
use vnode_kernel::{FsKind, VnodeConfig};

/// One mounted instance and where it lives.
pub struct MountEntry {
    pub path: String,
    pub fs: Arc<dyn Filesystem>,
}

/// Root instance plus everything mounted under it.
pub struct Namespace {
    pub root: Arc<dyn Filesystem>,
    pub mounts: Vec<MountEntry>,
}

impl Namespace {
    /// Build the namespace: a memfs root, then each `[[mount]]` in order of
    /// depth so parents exist before their children.
    pub fn build(config: &VnodeConfig) -> Result<Self> {
        let root = memfs(config).mount(InstanceId(0), MountFlags::default(), None)?;
        let mut ns = Self {
            root,
            mounts: Vec::new(),
        };

        let mut specs: Vec<_> = config.mounts.iter().collect();
        specs.sort_by_key(|spec| depth(&spec.path));

        let mut devfs: Option<DevFs> = None;
        for (n, spec) in specs.into_iter().enumerate() {
            let id = InstanceId(n as u32 + 1);
            let (owner, node) = ns
                .mount_dir(&spec.path)
                .with_context(|| format!("preparing mount point {}", spec.path))?;
            let flags = MountFlags {
                read_only: spec.read_only,
            };
            let driver: Box<dyn FsDriver> = match spec.fs {
                FsKind::Memfs => Box::new(memfs(config)),
                FsKind::Devfs => {
                    let driver = match &devfs {
                        Some(driver) => driver.clone(),
                        None => {
                            let (driver, _) = DevFs::with_standard_devices()?;
                            devfs = Some(driver.clone());
                            driver
                        }
                    };
                    Box::new(driver)
                }
                FsKind::Bootfs => {
                    let mut driver = BootFs::new(config.boot_image()?);
                    if let Some(limit) = config.limits.max_nodes {
                        driver = driver.with_max_nodes(limit);
                    }
                    Box::new(driver)
                }
                FsKind::Busfs => Box::new(BusFs::new(config.bus_topology())),
            };
            let fs = driver
                .mount(id, flags, Some(node))
                .with_context(|| format!("mounting {} at {}", spec.fs, spec.path))?;
            owner.register_mountpoint(node, MountTarget::root_of(Arc::clone(&fs)))?;
            tracing::info!(path = %spec.path, fs_type = fs.fs_type(), instance = %id, "attached");
            ns.mounts.push(MountEntry {
                path: spec.path.clone(),
                fs,
            });
        }
        Ok(ns)
    }

    /// Create every missing directory on `path` and return the owner and
    /// handle of the last one.
    fn mount_dir(&self, path: &str) -> Result<(Arc<dyn Filesystem>, NodeHandle)> {
        let mut prefix = String::new();
        for part in path.split(SEPARATOR).filter(|p| !p.is_empty()) {
            prefix.push(SEPARATOR);
            prefix.push_str(part);
            match stat_path(&self.root, &prefix, StreamRequest::any()) {
                Ok((_, stat)) if stat.is_dir() => continue,
                Ok(_) => bail!("{prefix} exists and is not a directory"),
                Err(VfsError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            let (owner, opened) = follow(&self.root, self.root.root(), &prefix, |fs, base, path| {
                fs.create(base, path, NodeKind::Directory)
            })?;
            owner.close(opened.node, opened.cookie)?;
        }
        let (owner, opened) = open_path(&self.root, path, StreamRequest::of(NodeKind::Directory))?;
        let node = opened.node;
        owner.close(node, opened.cookie)?;
        Ok((owner, node))
    }
}

fn memfs(config: &VnodeConfig) -> MemFs {
    match config.limits.max_nodes {
        Some(limit) => MemFs::with_max_nodes(limit),
        None => MemFs::new(),
    }
}

fn depth(path: &str) -> usize {
    path.split(SEPARATOR).filter(|p| !p.is_empty()).count()
}

/// Append `name` to a directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir.ends_with(SEPARATOR) {
        format!("{dir}{name}")
    } else {
        format!("{dir}{SEPARATOR}{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[[mount]]
path = "/sys/bus/pci"
fs = "busfs"

[[mount]]
path = "/dev"
fs = "devfs"

[[mount]]
path = "/sys"
fs = "memfs"

[[pci]]
bus = 0
device = 2
function = 0
vendor_id = 0x1234
device_id = 0x1111
class = 0x030000
"#;

    #[test]
    fn test_build_orders_by_depth() {
        let config = VnodeConfig::from_toml_str(CONFIG).unwrap();
        let ns = Namespace::build(&config).unwrap();

        let paths: Vec<_> = ns.mounts.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, ["/dev", "/sys", "/sys/bus/pci"]);

        let (owner, stat) = stat_path(&ns.root, "/sys/bus/pci/00/02.0/vendor", StreamRequest::any()).unwrap();
        assert_eq!(owner.fs_type(), "busfs");
        assert_eq!(stat.size, "0x1234\n".len() as u64);

        // the /sys/bus directory lives in the /sys memfs, not the root
        let (owner, _) = stat_path(&ns.root, "/sys/bus", StreamRequest::any()).unwrap();
        assert_eq!(owner.id(), InstanceId(2));
    }

    #[test]
    fn test_second_devfs_refused() {
        let text = "[[mount]]\npath = \"/dev\"\nfs = \"devfs\"\n[[mount]]\npath = \"/dev2\"\nfs = \"devfs\"\n";
        let config = VnodeConfig::from_toml_str(text).unwrap();
        let err = Namespace::build(&config).err().unwrap();
        assert!(err.chain().any(|e| matches!(
            e.downcast_ref::<VfsError>(),
            Some(VfsError::NotAllowed(_))
        )));
    }

    #[test]
    fn test_mount_point_must_be_directory() {
        let config = VnodeConfig::from_toml_str("[[mount]]\npath = \"/dev/null/x\"\nfs = \"memfs\"\n[[mount]]\npath = \"/dev\"\nfs = \"devfs\"\n").unwrap();
        assert!(Namespace::build(&config).is_err());
    }

    #[test]
    fn test_build_from_config_file_with_boot_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("motd.txt"), b"welcome to vnode\n").unwrap();
        let path = dir.path().join("vnode.toml");
        std::fs::write(
            &path,
            "[[mount]]\npath = \"/boot\"\nfs = \"bootfs\"\nread_only = true\n\n\
             [[boot_file]]\npath = \"/etc/motd\"\nsource = \"motd.txt\"\n",
        )
        .unwrap();

        let config = VnodeConfig::load(&path).unwrap();
        let ns = Namespace::build(&config).unwrap();
        assert_eq!(ns.mounts[0].fs.fs_type(), "bootfs");
        assert!(ns.mounts[0].fs.read_only());

        let (owner, mut motd) = open_path(&ns.root, "/boot/etc/motd", StreamRequest::of(NodeKind::File)).unwrap();
        let bytes = owner.read_to_end(motd.node, &mut motd.cookie).unwrap();
        owner.close(motd.node, motd.cookie).unwrap();
        assert_eq!(bytes, b"welcome to vnode\n");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("", "a"), "a");
    }
}
