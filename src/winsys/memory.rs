use crate::error::{BorgError, BorgResult};
use crate::winsys::binder;
use crate::winsys::bo::Bo;
use crate::winsys::device::Device;
use log::{debug, error, warn};
use std::ptr::NonNull;

/// Lifecycle of a [`MemoryObject`].
///
/// ```text
/// allocate ──► Bound ──map──► Mapped ◄──map── Unmapped
///                              │                 ▲
///                              └──────unmap──────┘
/// free (from any state) ──► Freed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    Bound,
    Mapped,
    Unmapped,
    Freed,
}

/// A GPU virtual address range reserved from a device heap.
#[derive(Debug)]
pub struct VaAllocation {
    device: Device,
    addr: u64,
    size: u64,
}

impl VaAllocation {
    #[must_use]
    pub const fn addr(&self) -> u64 {
        self.addr
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }
}

/// Device memory: a VA range, the BO backing it, and at most one CPU mapping.
///
/// The range is bound for the whole life of the object. [`MemoryObject::free`] (or dropping
/// the object) unmaps, unbinds, returns the range to the heap and releases the BO, in that
/// order.
#[derive(Debug)]
pub struct MemoryObject {
    va: VaAllocation,
    bo: Bo,
    map: Option<NonNull<u8>>,
    state: MemoryState,
}

// SAFETY: the mapping pointer is never dereferenced here, only handed back to munmap by
// whichever thread owns the object.
unsafe impl Send for MemoryObject {}

impl MemoryObject {
    /// Creates a BO of `size` bytes, reserves a VA range for it and binds the two.
    ///
    /// Any step that fails undoes the steps before it, so a failed call leaves the heap and
    /// the kernel as they were.
    ///
    /// # Errors
    /// - `InvalidArgument` for a zero size.
    /// - `OutOfDeviceMemory` if the size exceeds the device limit, the kernel refuses the BO,
    ///   or the heap has no room for the range.
    /// - `BindFailed` if the kernel rejects the bind.
    pub fn allocate(device: &Device, size: u64) -> BorgResult<Self> {
        if size == 0 {
            return Err(BorgError::InvalidArgument("memory allocation of zero bytes"));
        }
        if size > device.config().max_bo_size {
            return Err(BorgError::OutOfDeviceMemory(None));
        }

        // 1. Backing storage
        let bo = Bo::create(device.kernel(), size)?;

        // 2. Virtual Address (VA) from the heap
        let addr = match device.heap().alloc(size, device.config().va_align) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("VA allocation of {size:#x} bytes failed: {e}");
                bo.release();
                return Err(BorgError::OutOfDeviceMemory(Some(Box::new(e))));
            }
        };

        // 3. Bind VA to BO
        if let Err(e) = binder::bind(device.kernel().as_ref(), addr, size) {
            if let Err(free_err) = device.heap().free(addr, size) {
                error!("Rollback of VA 0x{addr:x} failed: {free_err}");
            }
            bo.release();
            return Err(e);
        }

        debug!(
            "Allocated memory object: VA 0x{addr:x}+0x{size:x} backed by BO {}",
            bo.handle()
        );

        Ok(Self {
            va: VaAllocation {
                device: device.clone(),
                addr,
                size,
            },
            bo,
            map: None,
            state: MemoryState::Bound,
        })
    }

    fn map_len(&self) -> BorgResult<usize> {
        usize::try_from(self.bo.size())
            .map_err(|_| BorgError::InvalidArgument("BO too large for the host address space"))
    }

    /// Maps the backing BO into this process, read/write and shared with the device.
    ///
    /// # Errors
    /// `AlreadyMapped` if a mapping is live (the existing pointer stays valid), `MapFailed`
    /// if the host refuses the mapping (the state is unchanged).
    pub fn map(&mut self) -> BorgResult<NonNull<u8>> {
        if self.state == MemoryState::Mapped {
            return Err(BorgError::AlreadyMapped);
        }

        let len = self.map_len()?;
        let ptr = self
            .va
            .device
            .kernel()
            .mmap(self.bo.map_token(), len)
            .map_err(BorgError::MapFailed)?;

        self.map = Some(ptr);
        self.state = MemoryState::Mapped;
        debug!("Mapped BO {} at {ptr:p}", self.bo.handle());
        Ok(ptr)
    }

    /// Tears down the CPU mapping. Does nothing if the object is not mapped.
    ///
    /// # Errors
    /// `MapFailed` if the host refuses the unmap; the mapping is then still live.
    pub fn unmap(&mut self) -> BorgResult<()> {
        let Some(ptr) = self.map else {
            return Ok(());
        };

        let len = self.map_len()?;
        self.va
            .device
            .kernel()
            .munmap(ptr, len)
            .map_err(BorgError::MapFailed)?;

        self.map = None;
        self.state = MemoryState::Unmapped;
        Ok(())
    }

    /// Releases everything the object holds.
    ///
    /// The VA range goes back to the heap only once the kernel confirms the unbind. If the
    /// unbind fails the range is leaked for good, so it can never alias a range that is still
    /// bound; the BO is released either way.
    ///
    /// # Errors
    /// `UnbindFailed` after the teardown has completed, if the unbind was refused.
    pub fn free(mut self) -> BorgResult<()> {
        self.teardown()
        // `self` drops here: the BO reference goes last, after the unbind.
    }

    fn teardown(&mut self) -> BorgResult<()> {
        if let Err(e) = self.unmap() {
            warn!("Dropping CPU mapping of BO {} without munmap: {e}", self.bo.handle());
            self.map = None;
        }

        let device = &self.va.device;
        let (addr, size) = (self.va.addr, self.va.size);

        let result = match binder::unbind(device.kernel().as_ref(), addr, size) {
            Ok(()) => {
                if let Err(e) = device.heap().free(addr, size) {
                    error!("Returning VA 0x{addr:x} to the heap failed: {e}");
                }
                Ok(())
            }
            Err(e) => {
                error!("Leaking VA range 0x{addr:x}+0x{size:x}: {e}");
                device.record_leak(size);
                Err(e)
            }
        };

        self.state = MemoryState::Freed;
        result
    }

    #[must_use]
    pub const fn state(&self) -> MemoryState {
        self.state
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.va.size
    }

    #[must_use]
    pub const fn va(&self) -> &VaAllocation {
        &self.va
    }

    #[must_use]
    pub const fn bo(&self) -> &Bo {
        &self.bo
    }

    /// The live CPU mapping, if any.
    #[must_use]
    pub const fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.map
    }

    /// GPU address of a resource bound `offset` bytes into this object.
    ///
    /// # Errors
    /// `InvalidArgument` if `offset` lies outside the object.
    pub fn gpu_address(&self, offset: u64) -> BorgResult<u64> {
        if offset >= self.va.size {
            return Err(BorgError::InvalidArgument("offset outside memory object"));
        }
        Ok(self.va.addr + offset)
    }
}

impl Drop for MemoryObject {
    fn drop(&mut self) {
        if self.state != MemoryState::Freed {
            self.teardown().ok();
        }
    }
}
