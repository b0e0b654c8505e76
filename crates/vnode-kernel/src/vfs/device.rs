//! Device capability set carried by device streams.

use super::error::{VfsError, VfsResult};

/// Operations a device node exposes.
///
/// Implementations live with the driver that owns the hardware; the VFS
/// only forwards calls. `pos` is the caller's cursor and may be ignored by
/// stream-like devices.
pub trait Device: Send + Sync {
    /// Short device class name (e.g. "console").
    fn class(&self) -> &'static str;

    /// Read into `buf`, returning the number of bytes produced.
    fn read(&self, pos: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write from `buf`, returning the number of bytes consumed.
    fn write(&self, pos: u64, buf: &[u8]) -> VfsResult<usize>;

    /// Device-specific control request.
    fn ioctl(&self, op: u32, arg: &mut [u8]) -> VfsResult<usize> {
        let _ = arg;
        Err(VfsError::not_allowed(format!(
            "{}: unsupported ioctl {op:#x}",
            self.class()
        )))
    }
}
