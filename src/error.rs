use std::error::Error as StdError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BorgError {
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    #[error("DRM kernel driver '{0}' in use, borg is required")]
    IncompatibleDriver(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Out of GPU virtual address space (requested {size:#x} bytes, align {align})")]
    OutOfAddressSpace { size: u64, align: u64 },

    /// The cause is the kernel's error when it refused the BO, or the heap error when no VA
    /// range was left for it. Requests over the device limit carry no cause.
    #[error("Out of device memory")]
    OutOfDeviceMemory(#[source] Option<Box<dyn StdError + Send + Sync>>),

    #[error("Failed to bind VA range 0x{addr:x}+0x{range:x}")]
    BindFailed {
        addr: u64,
        range: u64,
        #[source]
        source: io::Error,
    },

    #[error("Failed to unbind VA range 0x{addr:x}+0x{range:x}")]
    UnbindFailed {
        addr: u64,
        range: u64,
        #[source]
        source: io::Error,
    },

    #[error("Memory object couldn't be mapped")]
    MapFailed(#[source] io::Error),

    #[error("Memory object is already mapped")]
    AlreadyMapped,

    #[error("Freed VA range 0x{addr:x}+0x{size:x} was never allocated from this heap")]
    InvalidFree { addr: u64, size: u64 },
}

// A convenient alias
pub type BorgResult<T> = Result<T, BorgError>;
