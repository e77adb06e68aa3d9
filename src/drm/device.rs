use crate::drm::ioctl::{
    DRM_IOCTL_BORG_GEM_NEW, DRM_IOCTL_BORG_VM_BIND, DRM_IOCTL_GEM_CLOSE, DRM_IOCTL_VERSION,
    DrmVersion, GemCloseArgs, GemNewArgs, VmBindArgs, VmBindOp,
};
use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::RawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

/// Name the kernel driver reports through `DRM_IOCTL_VERSION`.
pub const BORG_DRIVER_NAME: &str = "borg";

/// A handle to a borg DRM render node (`/dev/dri/renderD*`).
///
/// The file descriptor lives in an `Arc`, so the handle is cheap to clone and share
/// between the device and every buffer object created through it.
#[derive(Clone, Debug)]
pub struct DrmDevice {
    pub file: Arc<File>,
}

impl DrmDevice {
    /// Opens a render node.
    ///
    /// The node is not checked for its driver; see [`DrmDevice::driver_name`].
    ///
    /// # Errors
    /// Returns an error if the node cannot be opened (missing node, permissions).
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;

        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Issues an ioctl on the render node.
    ///
    /// # Safety
    /// `arg` must point to a buffer laid out as `cmd` expects, valid for the kernel to read
    /// and write for the size encoded in `cmd`.
    unsafe fn ioctl(&self, cmd: u32, arg: *mut c_void) -> io::Result<()> {
        loop {
            let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), cmd as _, arg) };
            if ret >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            // drmIoctl semantics: restart on signal interruption.
            if !matches!(err.raw_os_error(), Some(libc::EINTR | libc::EAGAIN)) {
                return Err(err);
            }
        }
    }

    // ===========================================================================================
    // Versioning
    // ===========================================================================================

    /// Query the name of the DRM driver behind this node.
    pub fn driver_name(&self) -> io::Result<String> {
        // First call reports the string lengths, second call fills the buffers.
        let mut args = DrmVersion::default();
        unsafe {
            self.ioctl(DRM_IOCTL_VERSION, (&raw mut args).cast())?;
        }

        let mut name = vec![0u8; args.name_len];
        args = DrmVersion {
            name_len: name.len(),
            name: name.as_mut_ptr().cast(),
            ..DrmVersion::default()
        };
        unsafe {
            self.ioctl(DRM_IOCTL_VERSION, (&raw mut args).cast())?;
        }

        name.truncate(args.name_len);
        Ok(String::from_utf8_lossy(&name).into_owned())
    }

    // ===========================================================================================
    // Buffer Objects
    // ===========================================================================================

    /// Create a buffer object of `size` bytes.
    ///
    /// On success the returned record carries the kernel handle and the map token.
    pub fn gem_new(&self, size: u64) -> io::Result<GemNewArgs> {
        let mut buf = GemNewArgs::request(size).encode();
        unsafe {
            self.ioctl(DRM_IOCTL_BORG_GEM_NEW, buf.as_mut_ptr().cast())?;
        }
        Ok(GemNewArgs::decode(&buf))
    }

    /// Release the kernel handle of a buffer object.
    pub fn gem_close(&self, handle: u32) -> io::Result<()> {
        let mut buf = GemCloseArgs { handle }.encode();
        unsafe { self.ioctl(DRM_IOCTL_GEM_CLOSE, buf.as_mut_ptr().cast()) }
    }

    // ===========================================================================================
    // Address Space
    // ===========================================================================================

    /// Submit MAP/UNMAP operations against the device page tables.
    pub fn vm_bind(&self, ops: &[VmBindOp]) -> io::Result<()> {
        let count = u32::try_from(ops.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many vm_bind ops"))?;

        let mut encoded = Vec::with_capacity(ops.len() * VmBindOp::WIRE_SIZE);
        for op in ops {
            encoded.extend_from_slice(&op.encode());
        }

        let mut buf = VmBindArgs {
            count,
            ops_ptr: encoded.as_ptr() as u64,
        }
        .encode();

        unsafe { self.ioctl(DRM_IOCTL_BORG_VM_BIND, buf.as_mut_ptr().cast()) }
    }

    // ===========================================================================================
    // Host Mappings
    // ===========================================================================================

    /// Map `len` bytes of a buffer object into this process, read/write and shared.
    pub fn mmap(&self, map_token: u64, len: usize) -> io::Result<NonNull<u8>> {
        let offset = libc::off_t::try_from(map_token)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "map token out of range"))?;

        let ret = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                offset,
            )
        };

        if ret == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ret.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))
    }

    /// Tear down a mapping returned by [`DrmDevice::mmap`].
    pub fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        let ret = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for DrmDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
