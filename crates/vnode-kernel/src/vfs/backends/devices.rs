//! Built-in devices exposed through devfs.
//!
//! - `null` - discards writes, reads return EOF
//! - `zero` - discards writes, reads fill the buffer with zeros
//! - `console` - collects written output for the console renderer
//! - `keyboard` - queue of key bytes fed from the input interrupt path

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::vfs::device::Device;
use crate::vfs::error::{VfsError, VfsResult};

/// `ioctl` on the console: fills `arg` with columns and rows as two
/// little-endian `u16`s.
pub const CONSOLE_GET_SIZE: u32 = 0x5401;

/// `ioctl` on the keyboard: fills `arg` with the number of queued bytes as a
/// little-endian `u32`.
pub const KEYBOARD_PENDING: u32 = 0x4b01;

/// Discards writes; reads return EOF.
#[derive(Debug, Default)]
pub struct NullDevice;

impl Device for NullDevice {
    fn class(&self) -> &'static str {
        "null"
    }

    fn read(&self, _pos: u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Ok(0)
    }

    fn write(&self, _pos: u64, buf: &[u8]) -> VfsResult<usize> {
        Ok(buf.len())
    }
}

/// Discards writes; reads return zero bytes.
#[derive(Debug, Default)]
pub struct ZeroDevice;

impl Device for ZeroDevice {
    fn class(&self) -> &'static str {
        "zero"
    }

    fn read(&self, _pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&self, _pos: u64, buf: &[u8]) -> VfsResult<usize> {
        Ok(buf.len())
    }
}

/// Console exposer.
///
/// Rendering happens elsewhere; the device only buffers bytes until the
/// renderer takes them.
#[derive(Debug)]
pub struct ConsoleDevice {
    columns: u16,
    rows: u16,
    output: Mutex<Vec<u8>>,
}

impl Default for ConsoleDevice {
    fn default() -> Self {
        Self::new(80, 25)
    }
}

impl ConsoleDevice {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            rows,
            output: Mutex::new(Vec::new()),
        }
    }

    /// Drain everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.lock())
    }
}

impl Device for ConsoleDevice {
    fn class(&self) -> &'static str {
        "console"
    }

    // Console input arrives through the keyboard device.
    fn read(&self, _pos: u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Ok(0)
    }

    fn write(&self, _pos: u64, buf: &[u8]) -> VfsResult<usize> {
        self.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn ioctl(&self, op: u32, arg: &mut [u8]) -> VfsResult<usize> {
        match op {
            CONSOLE_GET_SIZE => {
                let out = arg
                    .get_mut(..4)
                    .ok_or_else(|| VfsError::invalid_args("console size needs 4 bytes"))?;
                out[..2].copy_from_slice(&self.columns.to_le_bytes());
                out[2..].copy_from_slice(&self.rows.to_le_bytes());
                Ok(4)
            }
            _ => Err(VfsError::not_allowed(format!("console: unsupported ioctl {op:#x}"))),
        }
    }
}

/// Keyboard exposer.
///
/// The interrupt side pushes decoded bytes with [`KeyboardDevice::push_key`];
/// reads drain the queue and return 0 when it is empty. Writes are refused.
#[derive(Debug, Default)]
pub struct KeyboardDevice {
    queue: Mutex<VecDeque<u8>>,
}

impl KeyboardDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_key(&self, byte: u8) {
        self.queue.lock().push_back(byte);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Device for KeyboardDevice {
    fn class(&self) -> &'static str {
        "keyboard"
    }

    fn read(&self, _pos: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let mut queue = self.queue.lock();
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, _pos: u64, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::not_allowed("keyboard is read-only"))
    }

    fn ioctl(&self, op: u32, arg: &mut [u8]) -> VfsResult<usize> {
        match op {
            KEYBOARD_PENDING => {
                let out = arg
                    .get_mut(..4)
                    .ok_or_else(|| VfsError::invalid_args("pending count needs 4 bytes"))?;
                let pending = u32::try_from(self.pending()).unwrap_or(u32::MAX);
                out.copy_from_slice(&pending.to_le_bytes());
                Ok(4)
            }
            _ => Err(VfsError::not_allowed(format!("keyboard: unsupported ioctl {op:#x}"))),
        }
    }
}
