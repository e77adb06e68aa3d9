//! Userspace memory manager for borg GPUs.
//!
//! The [`drm`] module speaks the render-node ioctl protocol. The [`winsys`] module builds
//! on it: a per-device VA heap, reference-counted buffer objects, binding of VA ranges into
//! the device page tables and CPU mappings, all behind [`winsys::MemoryObject`].

pub mod drm;
pub mod error;
pub mod utils;
pub mod winsys;

pub use error::{BorgError, BorgResult};
