#![allow(clippy::used_underscore_items, clippy::cast_possible_truncation)]

const _IOC_NRBITS: u32 = 8;
const _IOC_TYPEBITS: u32 = 8;
const _IOC_SIZEBITS: u32 = 14;

const _IOC_NRSHIFT: u32 = 0;
const _IOC_TYPESHIFT: u32 = _IOC_NRSHIFT + _IOC_NRBITS;
const _IOC_SIZESHIFT: u32 = _IOC_TYPESHIFT + _IOC_TYPEBITS;
const _IOC_DIRSHIFT: u32 = _IOC_SIZESHIFT + _IOC_SIZEBITS;

const _IOC_WRITE: u32 = 1;
const _IOC_READ: u32 = 2;

/// `'d'`, the ioctl type shared by every DRM driver.
pub const DRM_IOCTL_BASE: u32 = 0x64;

/// First ioctl number available to driver-private commands.
pub const DRM_COMMAND_BASE: u32 = 0x40;

#[must_use]
pub const fn _ioc(dir: u32, type_: u32, nr: u32, size: usize) -> u32 {
    (dir << _IOC_DIRSHIFT)
        | (type_ << _IOC_TYPESHIFT)
        | (nr << _IOC_NRSHIFT)
        | ((size as u32) << _IOC_SIZESHIFT)
}

/// Encodes a userspace-to-kernel DRM request carrying `size` payload bytes.
#[must_use]
pub const fn drm_iow(nr: u32, size: usize) -> u32 {
    _ioc(_IOC_WRITE, DRM_IOCTL_BASE, nr, size)
}

/// Encodes a DRM request whose payload the kernel reads and writes back.
#[must_use]
pub const fn drm_iowr(nr: u32, size: usize) -> u32 {
    _ioc(_IOC_READ | _IOC_WRITE, DRM_IOCTL_BASE, nr, size)
}

/// Rounds `val` up to the next multiple of `align`, which must be a power of two.
///
/// Returns `None` if the result does not fit in a `u64`.
#[must_use]
pub const fn align_up(val: u64, align: u64) -> Option<u64> {
    match val.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
