//! Wire records of the borg DRM uAPI.
//!
//! Every record has a fixed native-endian layout with explicit padding.
//! Requests are encoded into byte buffers right before the ioctl and decoded right after,
//! so no Rust struct layout ever crosses the kernel boundary.

use crate::utils::{DRM_COMMAND_BASE, drm_iow, drm_iowr};
use std::ffi::c_char;
use std::io;

// ===============================================================================================
// Command Numbers
// ===============================================================================================

pub const DRM_VERSION: u32 = 0x00;
pub const DRM_GEM_CLOSE: u32 = 0x09;

pub const DRM_BORG_GEM_NEW: u32 = 0x40;
pub const DRM_BORG_VM_BIND: u32 = 0x41;

pub const DRM_IOCTL_VERSION: u32 = drm_iowr(DRM_VERSION, size_of::<DrmVersion>());
pub const DRM_IOCTL_GEM_CLOSE: u32 = drm_iow(DRM_GEM_CLOSE, GemCloseArgs::WIRE_SIZE);
pub const DRM_IOCTL_BORG_GEM_NEW: u32 =
    drm_iowr(DRM_COMMAND_BASE + DRM_BORG_GEM_NEW, GemNewArgs::WIRE_SIZE);
pub const DRM_IOCTL_BORG_VM_BIND: u32 =
    drm_iow(DRM_COMMAND_BASE + DRM_BORG_VM_BIND, VmBindArgs::WIRE_SIZE);

// ===============================================================================================
// Field Helpers
// ===============================================================================================

fn put_u32(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 4].copy_from_slice(&val.to_ne_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, val: u64) {
    buf[off..off + 8].copy_from_slice(&val.to_ne_bytes());
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[off..off + 4]);
    u32::from_ne_bytes(raw)
}

fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[off..off + 8]);
    u64::from_ne_bytes(raw)
}

// ===============================================================================================
// Buffer Objects
// ===============================================================================================

/// `struct drm_borg_gem_new`.
///
/// ```text
/// | 0..4   | 4..8 | 8..16 | 16..24    |
/// | handle | pad  | size  | map_token |
/// ```
///
/// `size` is an input, `handle` and `map_token` are filled in by the kernel.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct GemNewArgs {
    pub handle: u32,
    pub size: u64,
    pub map_token: u64,
}

impl GemNewArgs {
    pub const WIRE_SIZE: usize = 24;

    #[must_use]
    pub const fn request(size: u64) -> Self {
        Self {
            handle: 0,
            size,
            map_token: 0,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        put_u32(&mut buf, 0, self.handle);
        put_u64(&mut buf, 8, self.size);
        put_u64(&mut buf, 16, self.map_token);
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        Self {
            handle: get_u32(buf, 0),
            size: get_u64(buf, 8),
            map_token: get_u64(buf, 16),
        }
    }
}

/// `struct drm_gem_close`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct GemCloseArgs {
    pub handle: u32,
}

impl GemCloseArgs {
    pub const WIRE_SIZE: usize = 8;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        put_u32(&mut buf, 0, self.handle);
        buf
    }
}

// ===============================================================================================
// Address Space Binding
// ===============================================================================================

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VmBindOpKind {
    Map = 0,
    Unmap = 1,
}

impl TryFrom<u32> for VmBindOpKind {
    type Error = io::Error;

    fn try_from(raw: u32) -> io::Result<Self> {
        match raw {
            0 => Ok(Self::Map),
            1 => Ok(Self::Unmap),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown vm_bind op {raw}"),
            )),
        }
    }
}

/// `struct drm_borg_vm_bind_op`.
///
/// ```text
/// | 0..4 | 4..8 | 8..16 | 16..24 |
/// | op   | pad  | addr  | range  |
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VmBindOp {
    pub op: VmBindOpKind,
    pub addr: u64,
    pub range: u64,
}

impl VmBindOp {
    pub const WIRE_SIZE: usize = 24;

    #[must_use]
    pub const fn map(addr: u64, range: u64) -> Self {
        Self {
            op: VmBindOpKind::Map,
            addr,
            range,
        }
    }

    #[must_use]
    pub const fn unmap(addr: u64, range: u64) -> Self {
        Self {
            op: VmBindOpKind::Unmap,
            addr,
            range,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        put_u32(&mut buf, 0, self.op as u32);
        put_u64(&mut buf, 8, self.addr);
        put_u64(&mut buf, 16, self.range);
        buf
    }

    /// # Errors
    /// Returns `InvalidData` if the op code is neither MAP nor UNMAP.
    pub fn decode(buf: &[u8; Self::WIRE_SIZE]) -> io::Result<Self> {
        Ok(Self {
            op: VmBindOpKind::try_from(get_u32(buf, 0))?,
            addr: get_u64(buf, 8),
            range: get_u64(buf, 16),
        })
    }
}

/// `struct drm_borg_vm_bind`: a count and a user pointer to an array of encoded ops.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VmBindArgs {
    pub count: u32,
    pub ops_ptr: u64,
}

impl VmBindArgs {
    pub const WIRE_SIZE: usize = 16;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        put_u32(&mut buf, 0, self.count);
        put_u64(&mut buf, 8, self.ops_ptr);
        buf
    }
}

// ===============================================================================================
// Driver Identification
// ===============================================================================================

/// `struct drm_version`. Carries user pointers, so it keeps its C layout.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct DrmVersion {
    pub version_major: i32,
    pub version_minor: i32,
    pub version_patchlevel: i32,
    pub name_len: usize,
    pub name: *mut c_char,
    pub date_len: usize,
    pub date: *mut c_char,
    pub desc_len: usize,
    pub desc: *mut c_char,
}

impl Default for DrmVersion {
    fn default() -> Self {
        Self {
            version_major: 0,
            version_minor: 0,
            version_patchlevel: 0,
            name_len: 0,
            name: std::ptr::null_mut(),
            date_len: 0,
            date: std::ptr::null_mut(),
            desc_len: 0,
            desc: std::ptr::null_mut(),
        }
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<DrmVersion>() == 64);
