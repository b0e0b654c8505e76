//! Namespace configuration.
//!
//! A TOML file describing which filesystems to mount where, what goes into
//! the boot image and which PCI functions the bus tree shows:
//!
//! ```toml
//! [limits]
//! max_nodes = 4096
//!
//! [[mount]]
//! path = "/dev"
//! fs = "devfs"
//!
//! [[boot_file]]
//! path = "/etc/motd"
//! source = "motd.txt"
//!
//! [[pci]]
//! bus = 0
//! device = 31
//! function = 3
//! vendor_id = 0x8086
//! device_id = 0x2668
//! class = 0x040300
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vfs::SEPARATOR;
use crate::vfs::backends::{BootImage, BusTopology, PciFunction};

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Filesystem driver selected by a `[[mount]]` entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FsKind {
    Memfs,
    Devfs,
    Bootfs,
    Busfs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Per-instance node limit, root included.
    pub max_nodes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountSpec {
    pub path: String,
    pub fs: FsKind,
    #[serde(default)]
    pub read_only: bool,
}

/// A host file packed into the boot image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootFileSpec {
    /// Path inside bootfs.
    pub path: String,
    /// Host file; relative paths start at the config file's directory.
    pub source: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VnodeConfig {
    pub limits: Limits,
    #[serde(rename = "mount")]
    pub mounts: Vec<MountSpec>,
    #[serde(rename = "boot_file")]
    pub boot_files: Vec<BootFileSpec>,
    pub pci: Vec<PciFunction>,
    /// Directory relative boot file sources are read from.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl VnodeConfig {
    /// Parse and validate a config document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; boot file sources resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        tracing::debug!(
            path = %path.display(),
            mounts = config.mounts.len(),
            boot_files = config.boot_files.len(),
            pci = config.pci.len(),
            "loaded config"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_nodes == Some(0) {
            return Err(ConfigError::Invalid("max_nodes must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for mount in &self.mounts {
            if !mount.path.starts_with(SEPARATOR) {
                return Err(ConfigError::Invalid(format!("mount path {:?} is not absolute", mount.path)));
            }
            let normalized = normalize(&mount.path);
            if normalized.is_empty() {
                return Err(ConfigError::Invalid("cannot mount over /".into()));
            }
            if !seen.insert(normalized) {
                return Err(ConfigError::Invalid(format!("{} is mounted twice", mount.path)));
            }
        }
        let mut boot_paths = HashSet::new();
        for file in &self.boot_files {
            let normalized = normalize(&file.path);
            if normalized.is_empty() {
                return Err(ConfigError::Invalid(format!("boot file {:?} has no name", file.path)));
            }
            if !boot_paths.insert(normalized) {
                return Err(ConfigError::Invalid(format!("boot file {} listed twice", file.path)));
            }
        }
        Ok(())
    }

    /// Pack the configured boot files.
    pub fn boot_image(&self) -> Result<BootImage, ConfigError> {
        let files = self
            .boot_files
            .iter()
            .map(|f| (f.path.as_str(), f.source.as_path()));
        Ok(BootImage::from_manifest(&self.base_dir, files)?)
    }

    pub fn bus_topology(&self) -> BusTopology {
        BusTopology::new(self.pci.clone())
    }
}

fn normalize(path: &str) -> String {
    path.split(SEPARATOR)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[limits]
max_nodes = 128

[[mount]]
path = "/dev"
fs = "devfs"

[[mount]]
path = "/boot"
fs = "bootfs"
read_only = true

[[boot_file]]
path = "/etc/motd"
source = "motd.txt"

[[pci]]
bus = 0
device = 31
function = 3
vendor_id = 0x8086
device_id = 0x2668
class = 0x040300
revision = 1
"#;

    #[test]
    fn test_parse_sample() {
        let config = VnodeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.limits.max_nodes, Some(128));
        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0].fs, FsKind::Devfs);
        assert!(!config.mounts[0].read_only);
        assert!(config.mounts[1].read_only);
        assert_eq!(config.boot_files[0].source, PathBuf::from("motd.txt"));
        assert_eq!(config.pci[0].vendor_id, 0x8086);
        assert_eq!(config.bus_topology().functions.len(), 1);
    }

    #[test]
    fn test_empty_config() {
        let config = VnodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, VnodeConfig::default());
    }

    #[test]
    fn test_fs_kind_strings() {
        assert_eq!(FsKind::Busfs.to_string(), "busfs");
        assert_eq!("MemFS".parse::<FsKind>().unwrap(), FsKind::Memfs);
        assert!("ext4".parse::<FsKind>().is_err());
    }

    #[test]
    fn test_unknown_fs_rejected() {
        let text = "[[mount]]\npath = \"/x\"\nfs = \"ext4\"\n";
        assert!(matches!(VnodeConfig::from_toml_str(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_mounts() {
        let relative = "[[mount]]\npath = \"dev\"\nfs = \"devfs\"\n";
        assert!(matches!(VnodeConfig::from_toml_str(relative), Err(ConfigError::Invalid(_))));

        let root = "[[mount]]\npath = \"//\"\nfs = \"memfs\"\n";
        assert!(matches!(VnodeConfig::from_toml_str(root), Err(ConfigError::Invalid(_))));

        let twice = "[[mount]]\npath = \"/a\"\nfs = \"memfs\"\n[[mount]]\npath = \"/a/\"\nfs = \"devfs\"\n";
        assert!(matches!(VnodeConfig::from_toml_str(twice), Err(ConfigError::Invalid(_))));

        let zero = "[limits]\nmax_nodes = 0\n";
        assert!(matches!(VnodeConfig::from_toml_str(zero), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_resolves_boot_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("motd.txt"), b"welcome\n").unwrap();
        let path = dir.path().join("vnode.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = VnodeConfig::load(&path).unwrap();
        assert_eq!(config.base_dir, dir.path());
        let image = config.boot_image().unwrap();
        assert_eq!(image.entries()[0].path, "/etc/motd");
        assert_eq!(image.data(), b"welcome\n");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            VnodeConfig::load(dir.path().join("nope.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
