use crate::error::{BorgError, BorgResult};
use crate::winsys::Kernel;
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug)]
struct BoInner {
    kernel: Arc<dyn Kernel>,
    handle: u32,
    size: u64,
    map_token: u64,
}

impl Drop for BoInner {
    fn drop(&mut self) {
        // Runs exactly once, on the last release.
        if let Err(e) = self.kernel.destroy_bo(self.handle) {
            warn!("Failed to destroy BO {}: {e}", self.handle);
        } else {
            debug!("Destroyed BO {} ({:#x} bytes)", self.handle, self.size);
        }
    }
}

/// A shared handle to a kernel buffer object.
///
/// Cloning (or [`Bo::retain`]) adds an owner; dropping (or [`Bo::release`]) removes one.
/// The kernel destroy request is issued by whichever owner goes last.
#[derive(Debug, Clone)]
pub struct Bo {
    inner: Arc<BoInner>,
}

impl Bo {
    /// Asks the kernel for `size` bytes of backing storage.
    ///
    /// # Errors
    /// `OutOfDeviceMemory` carrying the kernel's error. The call is not retried.
    pub fn create(kernel: &Arc<dyn Kernel>, size: u64) -> BorgResult<Self> {
        let reply = kernel
            .create_bo(size)
            .map_err(|e| BorgError::OutOfDeviceMemory(Some(e.into())))?;

        debug!(
            "Created BO {} ({size:#x} bytes, map token {:#x})",
            reply.handle, reply.map_token
        );

        Ok(Self {
            inner: Arc::new(BoInner {
                kernel: Arc::clone(kernel),
                handle: reply.handle,
                size,
                map_token: reply.map_token,
            }),
        })
    }

    /// Adds an owner.
    #[must_use]
    pub fn retain(&self) -> Self {
        self.clone()
    }

    /// Drops this owner's reference, destroying the BO if it was the last one.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn handle(&self) -> u32 {
        self.inner.handle
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    #[must_use]
    pub fn map_token(&self) -> u64 {
        self.inner.map_token
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::winsys::fake::FakeKernel;
    use std::sync::atomic::Ordering;
    use std::sync::Barrier;
    use std::thread;

    fn kernel() -> (Arc<FakeKernel>, Arc<dyn Kernel>) {
        let fake = Arc::new(FakeKernel::new());
        let port: Arc<dyn Kernel> = fake.clone();
        (fake, port)
    }

    #[test]
    fn create_reports_kernel_identity() {
        let (fake, port) = kernel();
        let bo = Bo::create(&port, 0x2000).unwrap();
        assert_eq!(bo.size(), 0x2000);
        assert_eq!(bo.ref_count(), 1);
        assert_eq!(bo.map_token(), u64::from(bo.handle()) << 32);
        assert_eq!(fake.creates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn create_failure_is_out_of_device_memory() {
        let (fake, port) = kernel();
        fake.fail_create.store(true, Ordering::SeqCst);
        assert!(matches!(
            Bo::create(&port, 64),
            Err(BorgError::OutOfDeviceMemory(Some(_)))
        ));
        assert_eq!(fake.total_destroys(), 0);
    }

    #[test]
    fn destroyed_only_by_last_release() {
        let (fake, port) = kernel();
        let bo = Bo::create(&port, 64).unwrap();
        let handle = bo.handle();
        let second = bo.retain();
        let third = bo.retain();
        assert_eq!(bo.ref_count(), 3);

        third.release();
        bo.release();
        assert_eq!(fake.destroy_count(handle), 0);
        assert_eq!(second.size(), 64);

        second.release();
        assert_eq!(fake.destroy_count(handle), 1);
    }

    #[test]
    fn destroy_failure_is_swallowed() {
        let (fake, port) = kernel();
        fake.fail_destroy.store(true, Ordering::SeqCst);
        let bo = Bo::create(&port, 64).unwrap();
        let handle = bo.handle();
        bo.release();
        assert_eq!(fake.destroy_count(handle), 1);
    }

    #[test]
    fn concurrent_releases_destroy_exactly_once() {
        let (fake, port) = kernel();

        for _ in 0..32 {
            let bo = Bo::create(&port, 256).unwrap();
            let handle = bo.handle();
            let owners: Vec<Bo> = (0..8).map(|_| bo.retain()).collect();
            bo.release();

            let barrier = Barrier::new(owners.len());
            thread::scope(|s| {
                for owner in owners {
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        owner.release();
                    });
                }
            });

            assert_eq!(fake.destroy_count(handle), 1);
        }
    }
}
