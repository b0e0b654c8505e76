//! Device filesystem (devfs).
//!
//! A registry of device nodes. Drivers register devices on the [`DevFs`]
//! object, before or after it is mounted; while an instance is live each
//! registration shows up in its tree immediately, intermediate directories
//! included. Paths are relative to the devfs root, so mounting at `/dev`
//! turns `input/keyboard` into `/dev/input/keyboard`.
//!
//! Only one devfs instance may be mounted per driver object at a time. The
//! namespace itself is read-only through `create`/`remove`; reads and writes
//! on device nodes go straight to the device.
//!
//! ```text
//! open("/dev/console")
//!         |
//!         v   redirect at /dev
//!   devfs instance: resolve "/console"
//!         |
//!         v
//!   Stream::Device(ConsoleDevice)
//!         |
//!         v
//!   read/write/ioctl forwarded to the device
//! ```

use std::convert::Infallible;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::devices::{ConsoleDevice, KeyboardDevice, NullDevice, ZeroDevice};
use crate::vfs::device::Device;
use crate::vfs::dir::{create_dir_if_absent, detach_child, find_child, insert_child};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::instance::{Backend, Instance};
use crate::vfs::node::Stream;
use crate::vfs::ops::{Filesystem, FsDriver};
use crate::vfs::table::NodeTable;
use crate::vfs::types::{InstanceId, MountFlags, NodeHandle, NodeIndex, SEPARATOR};

/// Handles to the devices registered by [`DevFs::with_standard_devices`].
#[derive(Debug, Clone)]
pub struct StandardDevices {
    pub console: Arc<ConsoleDevice>,
    pub keyboard: Arc<KeyboardDevice>,
}

struct Registry {
    devices: Mutex<Vec<(String, Arc<dyn Device>)>>,
    live: Mutex<Option<Weak<Instance<DevStreams>>>>,
}

/// Device registry and devfs driver.
#[derive(Clone)]
pub struct DevFs {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for DevFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevFs")
            .field("mounted", &self.is_mounted())
            .field("devices", &self.device_paths())
            .finish()
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl DevFs {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                devices: Mutex::new(Vec::new()),
                live: Mutex::new(None),
            }),
        }
    }

    /// Create a registry holding `null`, `zero`, `console` and
    /// `input/keyboard`.
    pub fn with_standard_devices() -> VfsResult<(Self, StandardDevices)> {
        let devfs = Self::new();
        let console = Arc::new(ConsoleDevice::default());
        let keyboard = Arc::new(KeyboardDevice::new());
        devfs.register_device("null", Arc::new(NullDevice))?;
        devfs.register_device("zero", Arc::new(ZeroDevice))?;
        devfs.register_device("console", console.clone())?;
        devfs.register_device("input/keyboard", keyboard.clone())?;
        Ok((devfs, StandardDevices { console, keyboard }))
    }

    /// Registered device paths, in registration order.
    pub fn device_paths(&self) -> Vec<String> {
        self.registry
            .devices
            .lock()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Returns true while an instance is mounted and still referenced.
    pub fn is_mounted(&self) -> bool {
        self.live().is_some()
    }

    /// Add a device at `path` (relative to the devfs root).
    ///
    /// A device cannot sit below another device, nor where a registered
    /// device needs a directory.
    pub fn register_device(&self, path: &str, device: Arc<dyn Device>) -> VfsResult<()> {
        let path = normalize(path)?;
        let mut devices = self.registry.devices.lock();
        for (existing, _) in devices.iter() {
            if *existing == path || is_below(existing, &path) {
                return Err(VfsError::already_exists(path));
            }
            if is_below(&path, existing) {
                return Err(VfsError::not_a_directory(existing.clone()));
            }
        }
        if let Some(fs) = self.live() {
            fs.with_tree(|_, table, root| insert_device(table, root, &path, device.clone()))?;
        }
        tracing::info!(path = %path, class = device.class(), "registered device");
        devices.push((path, device));
        Ok(())
    }

    /// Remove the device at `path`.
    ///
    /// A live node that is still open stays reachable through its cookies
    /// and is reclaimed on last close.
    pub fn unregister_device(&self, path: &str) -> VfsResult<Arc<dyn Device>> {
        let path = normalize(path)?;
        let mut devices = self.registry.devices.lock();
        let pos = devices
            .iter()
            .position(|(existing, _)| *existing == path)
            .ok_or_else(|| VfsError::not_found(path.clone()))?;
        if let Some(fs) = self.live() {
            fs.with_tree(|_, table, root| remove_device(table, root, &path))?;
        }
        let (_, device) = devices.remove(pos);
        tracing::info!(path = %path, class = device.class(), "unregistered device");
        Ok(device)
    }

    fn live(&self) -> Option<Arc<Instance<DevStreams>>> {
        self.registry.live.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl FsDriver for DevFs {
    fn name(&self) -> &'static str {
        "devfs"
    }

    fn mount(
        &self,
        id: InstanceId,
        flags: MountFlags,
        covered: Option<NodeHandle>,
    ) -> VfsResult<Arc<dyn Filesystem>> {
        let devices = self.registry.devices.lock();
        let mut live = self.registry.live.lock();
        if live.as_ref().is_some_and(|fs| fs.strong_count() > 0) {
            return Err(VfsError::not_allowed("devfs is already mounted"));
        }
        let backend = DevStreams {
            registry: Arc::clone(&self.registry),
        };
        let fs = Instance::mount_with(id, flags, covered, backend, NodeTable::new(), |_, table, root| {
            for (path, device) in devices.iter() {
                insert_device(table, root, path, Arc::clone(device))?;
            }
            Ok(())
        })?;
        *live = Some(Arc::downgrade(&fs));
        Ok(fs)
    }
}

/// devfs holds no regular files.
pub struct DevStreams {
    registry: Arc<Registry>,
}

impl Backend for DevStreams {
    type File = Infallible;

    fn fs_type(&self) -> &'static str {
        "devfs"
    }

    fn file_len(&self, file: &Infallible) -> u64 {
        match *file {}
    }

    fn read_file(&self, file: &Infallible, _pos: u64, _buf: &mut [u8]) -> VfsResult<usize> {
        match *file {}
    }

    fn unmounted(&self) {
        *self.registry.live.lock() = None;
    }
}

fn normalize(path: &str) -> VfsResult<String> {
    let parts: Vec<&str> = path.split(SEPARATOR).filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Err(VfsError::invalid_args(format!("device path {path:?} has no name")));
    }
    Ok(parts.join("/"))
}

/// True when `inner` names a path strictly inside directory `outer`.
fn is_below(inner: &str, outer: &str) -> bool {
    inner
        .strip_prefix(outer)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

fn insert_device<F>(
    table: &mut NodeTable<F>,
    root: NodeIndex,
    path: &str,
    device: Arc<dyn Device>,
) -> VfsResult<()> {
    let (dirs, name) = match path.rsplit_once(SEPARATOR) {
        Some((dirs, name)) => (Some(dirs), name),
        None => (None, path),
    };
    let mut dir = root;
    for part in dirs.into_iter().flat_map(|d| d.split(SEPARATOR)) {
        dir = create_dir_if_absent(table, dir, part)?;
    }
    if find_child(table, dir, name)?.is_some() {
        return Err(VfsError::already_exists(path));
    }
    let node = table.create(name, Stream::Device(device))?;
    let index = table.insert(node);
    insert_child(table, dir, index)
}

fn remove_device<F>(table: &mut NodeTable<F>, root: NodeIndex, path: &str) -> VfsResult<()> {
    let mut parent = root;
    let mut cur = root;
    for part in path.split(SEPARATOR) {
        parent = cur;
        cur = find_child(table, cur, part)?.ok_or_else(|| VfsError::not_found(path))?;
    }
    detach_child(table, parent, cur)?;
    if table.get(cur)?.opens == 0 {
        table.delete(cur, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::devices::CONSOLE_GET_SIZE;
    use crate::vfs::types::{NodeKind, StreamRequest};

    #[test]
    fn test_standard_devices_visible_after_mount() {
        let (devfs, _) = DevFs::with_standard_devices().unwrap();
        let fs = devfs.mount(InstanceId(3), MountFlags::default(), None).unwrap();

        let mut root = fs
            .open(fs.root(), "/", StreamRequest::of(NodeKind::Directory))
            .unwrap()
            .found()
            .unwrap();
        let mut names = fs.read_dir(root.node, &mut root.cookie).unwrap();
        names.sort();
        assert_eq!(names, ["console", "input", "null", "zero"]);

        let stat = fs
            .stat(fs.root(), "/input/keyboard", StreamRequest::of(NodeKind::Device))
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(stat.kind, NodeKind::Device);
        assert_eq!(stat.size, 0);
    }

    #[test]
    fn test_console_write_reaches_device() {
        let (devfs, devices) = DevFs::with_standard_devices().unwrap();
        let fs = devfs.mount(InstanceId(3), MountFlags::default(), None).unwrap();

        let mut con = fs
            .open(fs.root(), "console", StreamRequest::of(NodeKind::Device))
            .unwrap()
            .found()
            .unwrap();
        fs.write(con.node, &mut con.cookie, b"hello\n").unwrap();
        assert_eq!(devices.console.take_output(), b"hello\n");

        let mut arg = [0u8; 4];
        assert_eq!(fs.ioctl(con.node, &mut con.cookie, CONSOLE_GET_SIZE, &mut arg).unwrap(), 4);
        assert!(matches!(
            fs.seek(con.node, &mut con.cookie, std::io::SeekFrom::Start(0)),
            Err(VfsError::NotAllowed(_))
        ));
    }

    #[test]
    fn test_keyboard_read_through_devfs() {
        let (devfs, devices) = DevFs::with_standard_devices().unwrap();
        let fs = devfs.mount(InstanceId(3), MountFlags::default(), None).unwrap();
        devices.keyboard.push_key(b'q');

        let mut kbd = fs
            .open(fs.root(), "/input/keyboard", StreamRequest::any())
            .unwrap()
            .found()
            .unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(kbd.node, &mut kbd.cookie, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'q');
        assert_eq!(fs.read(kbd.node, &mut kbd.cookie, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_only_one_instance() {
        let devfs = DevFs::new();
        let fs = devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();
        assert!(matches!(
            devfs.mount(InstanceId(2), MountFlags::default(), None),
            Err(VfsError::NotAllowed(_))
        ));

        fs.unmount().unwrap();
        assert!(!devfs.is_mounted());
        devfs.mount(InstanceId(2), MountFlags::default(), None).unwrap();
    }

    #[test]
    fn test_remount_after_drop_without_unmount() {
        let devfs = DevFs::new();
        let fs = devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();
        assert!(devfs.is_mounted());
        drop(fs);

        assert!(!devfs.is_mounted());
        let again = devfs.mount(InstanceId(2), MountFlags::default(), None).unwrap();
        assert_eq!(again.id(), InstanceId(2));
    }

    #[test]
    fn test_device_paths_cannot_nest() {
        let devfs = DevFs::new();
        devfs.register_device("null", Arc::new(NullDevice)).unwrap();
        assert!(matches!(
            devfs.register_device("null/x", Arc::new(ZeroDevice)),
            Err(VfsError::NotADirectory(_))
        ));

        devfs.register_device("input/keyboard", Arc::new(NullDevice)).unwrap();
        assert!(matches!(
            devfs.register_device("input", Arc::new(ZeroDevice)),
            Err(VfsError::AlreadyExists(_))
        ));
        // Sharing a name prefix without a separator is fine.
        devfs.register_device("nullable", Arc::new(ZeroDevice)).unwrap();

        assert_eq!(devfs.device_paths(), ["null", "input/keyboard", "nullable"]);
        devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();
    }

    #[test]
    fn test_register_while_mounted() {
        let devfs = DevFs::new();
        let fs = devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();
        assert!(matches!(
            fs.stat(fs.root(), "/disk/0", StreamRequest::any()),
            Err(VfsError::NotFound(_))
        ));

        devfs.register_device("disk/0", Arc::new(NullDevice)).unwrap();
        devfs.register_device("/disk//1", Arc::new(ZeroDevice)).unwrap();
        assert!(fs.stat(fs.root(), "/disk/0", StreamRequest::any()).unwrap().found().is_some());
        assert_eq!(devfs.device_paths(), ["disk/0", "disk/1"]);

        assert!(matches!(
            devfs.register_device("disk/0", Arc::new(NullDevice)),
            Err(VfsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_unregister_removes_node() {
        let (devfs, _) = DevFs::with_standard_devices().unwrap();
        let fs = devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();

        devfs.unregister_device("zero").unwrap();
        assert!(matches!(
            fs.stat(fs.root(), "/zero", StreamRequest::any()),
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(devfs.unregister_device("zero"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_unregister_open_device_reclaimed_on_close() {
        let (devfs, devices) = DevFs::with_standard_devices().unwrap();
        let fs = devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();
        let mut con = fs
            .open(fs.root(), "/console", StreamRequest::of(NodeKind::Device))
            .unwrap()
            .found()
            .unwrap();

        devfs.unregister_device("console").unwrap();
        assert!(matches!(
            fs.stat(fs.root(), "/console", StreamRequest::any()),
            Err(VfsError::NotFound(_))
        ));

        // The open cookie still reaches the device until closed.
        fs.write(con.node, &mut con.cookie, b"bye").unwrap();
        assert_eq!(devices.console.take_output(), b"bye");

        let node = con.node;
        fs.close(node, con.cookie).unwrap();
        assert!(matches!(fs.path_of(node), Err(VfsError::StaleHandle)));
        assert!(matches!(fs.dispose_node(node), Err(VfsError::StaleHandle)));
    }

    #[test]
    fn test_namespace_is_read_only() {
        let devfs = DevFs::new();
        let fs = devfs.mount(InstanceId(1), MountFlags::default(), None).unwrap();
        assert!(fs.read_only());
        assert!(matches!(
            fs.create(fs.root(), "/file", NodeKind::File),
            Err(VfsError::ReadOnlyFilesystem)
        ));
    }

    #[test]
    fn test_bad_device_path() {
        let devfs = DevFs::new();
        assert!(matches!(
            devfs.register_device("//", Arc::new(NullDevice)),
            Err(VfsError::InvalidArgs(_))
        ));
    }
}
