//! A recording stand-in for the render node, with failure injection.

use crate::drm::ioctl::{GemNewArgs, VmBindOp, VmBindOpKind};
use crate::winsys::Kernel;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

/// One observed kernel call, in the order it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Create(u32),
    Destroy(u32),
    Bind(u64),
    Unbind(u64),
    Mmap(u64),
    Munmap,
}

#[derive(Debug, Default)]
pub(crate) struct FakeKernel {
    next_handle: AtomicU32,
    pub creates: AtomicUsize,
    pub mmaps: AtomicUsize,
    pub munmaps: AtomicUsize,
    pub destroyed: Mutex<Vec<u32>>,
    pub bind_ops: Mutex<Vec<VmBindOp>>,
    pub journal: Mutex<Vec<Call>>,

    pub fail_create: AtomicBool,
    pub fail_destroy: AtomicBool,
    pub fail_map_op: AtomicBool,
    pub fail_unmap_op: AtomicBool,
    pub fail_mmap: AtomicBool,
    pub fail_munmap: AtomicBool,
}

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("injected {what} failure"))
}

impl FakeKernel {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU32::new(1),
            ..Self::default()
        }
    }

    pub fn destroy_count(&self, handle: u32) -> usize {
        self.destroyed
            .lock()
            .unwrap()
            .iter()
            .filter(|&&h| h == handle)
            .count()
    }

    pub fn total_destroys(&self) -> usize {
        self.destroyed.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }

    pub fn ops(&self, kind: VmBindOpKind) -> Vec<VmBindOp> {
        self.bind_ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.op == kind)
            .copied()
            .collect()
    }
}

impl Kernel for FakeKernel {
    fn create_bo(&self, size: u64) -> io::Result<GemNewArgs> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Create(handle));
        // Mirror what the driver hands back: a page-granular fake mmap offset per handle.
        let reply = GemNewArgs {
            handle,
            size,
            map_token: u64::from(handle) << 32,
        };
        Ok(GemNewArgs::decode(&reply.encode()))
    }

    fn destroy_bo(&self, handle: u32) -> io::Result<()> {
        self.destroyed.lock().unwrap().push(handle);
        self.record(Call::Destroy(handle));
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(injected("destroy"));
        }
        Ok(())
    }

    fn vm_bind(&self, ops: &[VmBindOp]) -> io::Result<()> {
        for op in ops {
            let op = VmBindOp::decode(&op.encode())?;
            let fail = match op.op {
                VmBindOpKind::Map => &self.fail_map_op,
                VmBindOpKind::Unmap => &self.fail_unmap_op,
            };
            if fail.load(Ordering::SeqCst) {
                return Err(injected("vm_bind"));
            }
            self.bind_ops.lock().unwrap().push(op);
            self.record(match op.op {
                VmBindOpKind::Map => Call::Bind(op.addr),
                VmBindOpKind::Unmap => Call::Unbind(op.addr),
            });
        }
        Ok(())
    }

    fn mmap(&self, map_token: u64, len: usize) -> io::Result<NonNull<u8>> {
        if self.fail_mmap.load(Ordering::SeqCst) {
            return Err(injected("mmap"));
        }
        let ret = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ret == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        self.mmaps.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Mmap(map_token));
        NonNull::new(ret.cast::<u8>()).ok_or_else(|| injected("null mmap"))
    }

    fn munmap(&self, ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        if self.fail_munmap.load(Ordering::SeqCst) {
            return Err(injected("munmap"));
        }
        let ret = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        self.munmaps.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Munmap);
        Ok(())
    }
}
