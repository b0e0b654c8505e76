//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
///
/// Redirects across mount points are not errors; they come back as
/// [`Lookup::Redirect`](super::Lookup::Redirect).
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path component not found, or the stream request did not match.
    #[error("not found: {0}")]
    NotFound(String),

    /// A non-directory was used where a directory is required.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The instance does not accept namespace or file mutations.
    #[error("filesystem is read-only")]
    ReadOnlyFilesystem,

    /// Operation refused by the node's state (non-empty directory,
    /// unsupported seek, busy mount point, ...).
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// Node allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// Malformed argument (wrong node kind for the call, bad offset,
    /// handle from another instance, ...).
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// Handle refers to a reclaimed node or an unmounted instance.
    #[error("stale node handle")]
    StaleHandle,

    /// Too many redirect hops while following mount points.
    #[error("too many mount redirects")]
    MountLoop,
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotAllowed error.
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        Self::NotAllowed(reason.into())
    }

    /// Create an InvalidArgs error.
    pub fn invalid_args(reason: impl Into<String>) -> Self {
        Self::InvalidArgs(reason.into())
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::ReadOnlyFilesystem => {
                io::Error::new(io::ErrorKind::ReadOnlyFilesystem, "filesystem is read-only")
            }
            VfsError::NotAllowed(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::OutOfMemory => io::Error::new(io::ErrorKind::OutOfMemory, "out of memory"),
            VfsError::InvalidArgs(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::StaleHandle => io::Error::new(io::ErrorKind::StaleNetworkFileHandle, "stale node handle"),
            VfsError::MountLoop => io::Error::other("too many mount redirects"),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds() {
        let err: io::Error = VfsError::not_found("/a/b").into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = VfsError::ReadOnlyFilesystem.into();
        assert_eq!(err.kind(), io::ErrorKind::ReadOnlyFilesystem);

        let err: io::Error = VfsError::invalid_args("bad offset").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_display() {
        assert_eq!(VfsError::not_a_directory("/etc/motd").to_string(), "not a directory: /etc/motd");
        assert_eq!(VfsError::not_allowed("directory not empty").to_string(), "not allowed: directory not empty");
    }
}
