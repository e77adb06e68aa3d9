pub mod binder;
pub mod bo;
pub mod config;
pub mod device;
pub mod heap;
pub mod memory;

#[cfg(test)]
pub(crate) mod fake;

use crate::drm::device::DrmDevice;
use crate::drm::ioctl::{GemNewArgs, VmBindOp};
use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

/// The privileged calls the memory manager needs from the kernel.
///
/// [`DrmDevice`] is the production implementation. Every call is synchronous and blocks the
/// calling thread until the kernel replies.
pub trait Kernel: Debug + Send + Sync {
    /// Create a buffer object of `size` bytes, returning its handle and map token.
    fn create_bo(&self, size: u64) -> io::Result<GemNewArgs>;

    /// Release the kernel handle of a buffer object.
    fn destroy_bo(&self, handle: u32) -> io::Result<()>;

    /// Apply MAP/UNMAP operations to the device page tables.
    fn vm_bind(&self, ops: &[VmBindOp]) -> io::Result<()>;

    /// Map `len` bytes behind `map_token` into the calling process, read/write and shared.
    fn mmap(&self, map_token: u64, len: usize) -> io::Result<NonNull<u8>>;

    /// Undo a mapping returned by [`Kernel::mmap`].
    fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()>;
}

impl Kernel for DrmDevice {
    fn create_bo(&self, size: u64) -> io::Result<GemNewArgs> {
        self.gem_new(size)
    }

    fn destroy_bo(&self, handle: u32) -> io::Result<()> {
        self.gem_close(handle)
    }

    fn vm_bind(&self, ops: &[VmBindOp]) -> io::Result<()> {
        DrmDevice::vm_bind(self, ops)
    }

    fn mmap(&self, map_token: u64, len: usize) -> io::Result<NonNull<u8>> {
        DrmDevice::mmap(self, map_token, len)
    }

    fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        DrmDevice::munmap(self, ptr, len)
    }
}

// Re-export the main entry points for easy access
pub use bo::Bo;
pub use config::DeviceConfig;
pub use device::Device;
pub use memory::{MemoryObject, MemoryState};
