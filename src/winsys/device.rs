use crate::drm::device::{BORG_DRIVER_NAME, DrmDevice};
use crate::error::{BorgError, BorgResult};
use crate::utils::align_up;
use crate::winsys::Kernel;
use crate::winsys::config::DeviceConfig;
use crate::winsys::heap::VaHeap;
use crate::winsys::memory::MemoryObject;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct DeviceShared {
    kernel: Arc<dyn Kernel>,
    heap: VaHeap,
    config: DeviceConfig,
    leaked_va_bytes: AtomicU64,
}

/// Size and alignment a resource of a given size needs from a memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
}

/// One GPU: its kernel port, its VA heap and its settings.
///
/// Cheap to clone; clones share the same heap. Every memory object keeps a clone so the
/// heap outlives the ranges it handed out.
#[derive(Clone, Debug)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    /// Opens the render node named in `config` and checks that borg drives it.
    ///
    /// # Errors
    /// `Io` if the node cannot be opened or queried, `IncompatibleDriver` if another DRM
    /// driver owns it.
    pub fn open(config: DeviceConfig) -> BorgResult<Self> {
        let drm = DrmDevice::open(&config.render_node)?;

        let name = drm.driver_name()?;
        if name != BORG_DRIVER_NAME {
            return Err(BorgError::IncompatibleDriver(name));
        }

        info!("Opened borg render node {}", config.render_node.display());
        Self::with_kernel(Arc::new(drm), config)
    }

    /// Builds a device on top of any kernel port.
    ///
    /// # Errors
    /// `InvalidArgument` if the configuration is inconsistent.
    pub fn with_kernel(kernel: Arc<dyn Kernel>, config: DeviceConfig) -> BorgResult<Self> {
        config.validate().map_err(BorgError::InvalidArgument)?;

        let heap = VaHeap::new(config.heap_start, config.heap_end);
        Ok(Self {
            shared: Arc::new(DeviceShared {
                kernel,
                heap,
                config,
                leaked_va_bytes: AtomicU64::new(0),
            }),
        })
    }

    /// Allocates, backs and binds `size` bytes of device memory.
    ///
    /// # Errors
    /// See [`MemoryObject::allocate`].
    pub fn allocate_memory(&self, size: u64) -> BorgResult<MemoryObject> {
        MemoryObject::allocate(self, size)
    }

    /// Requirements for a buffer of `size` bytes.
    ///
    /// # Errors
    /// `OutOfDeviceMemory` if the buffer exceeds the largest supported BO.
    pub fn memory_requirements(&self, size: u64) -> BorgResult<MemoryRequirements> {
        let alignment = self.shared.config.va_align;
        if size > self.shared.config.max_bo_size {
            return Err(BorgError::OutOfDeviceMemory(None));
        }
        let size = align_up(size, alignment).ok_or(BorgError::OutOfDeviceMemory(None))?;
        Ok(MemoryRequirements { size, alignment })
    }

    #[must_use]
    pub fn heap(&self) -> &VaHeap {
        &self.shared.heap
    }

    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    /// Bytes of VA permanently withdrawn from the heap after failed unbinds.
    #[must_use]
    pub fn leaked_va_bytes(&self) -> u64 {
        self.shared.leaked_va_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.shared.kernel
    }

    pub(crate) fn record_leak(&self, size: u64) {
        self.shared
            .leaked_va_bytes
            .fetch_add(size, Ordering::Relaxed);
    }
}
