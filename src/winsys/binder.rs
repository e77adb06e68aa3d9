//! Binding of VA ranges into the device page tables.
//!
//! The kernel already associates a freshly created BO with the device address space, so a
//! bind names only the target range. Each call submits exactly one operation.

use crate::drm::ioctl::VmBindOp;
use crate::error::{BorgError, BorgResult};
use crate::winsys::Kernel;
use log::debug;

/// Makes `[addr, addr + range)` GPU-visible.
///
/// # Errors
/// `BindFailed` with the kernel's error.
pub fn bind(kernel: &dyn Kernel, addr: u64, range: u64) -> BorgResult<()> {
    kernel
        .vm_bind(&[VmBindOp::map(addr, range)])
        .map_err(|source| BorgError::BindFailed {
            addr,
            range,
            source,
        })?;
    debug!("Bound VA 0x{addr:x}+0x{range:x}");
    Ok(())
}

/// Removes `[addr, addr + range)` from the device page tables.
///
/// # Errors
/// `UnbindFailed` with the kernel's error. The range must then be treated as still bound.
pub fn unbind(kernel: &dyn Kernel, addr: u64, range: u64) -> BorgResult<()> {
    kernel
        .vm_bind(&[VmBindOp::unmap(addr, range)])
        .map_err(|source| BorgError::UnbindFailed {
            addr,
            range,
            source,
        })?;
    debug!("Unbound VA 0x{addr:x}+0x{range:x}");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drm::ioctl::VmBindOpKind;
    use crate::winsys::fake::FakeKernel;
    use std::sync::atomic::Ordering;

    #[test]
    fn bind_and_unbind_submit_one_op_each() {
        let fake = FakeKernel::new();
        bind(&fake, 0x1000, 0x40).unwrap();
        unbind(&fake, 0x1000, 0x40).unwrap();

        assert_eq!(fake.ops(VmBindOpKind::Map), vec![VmBindOp::map(0x1000, 0x40)]);
        assert_eq!(fake.ops(VmBindOpKind::Unmap), vec![VmBindOp::unmap(0x1000, 0x40)]);
    }

    #[test]
    fn kernel_failures_are_translated() {
        let fake = FakeKernel::new();
        fake.fail_map_op.store(true, Ordering::SeqCst);
        fake.fail_unmap_op.store(true, Ordering::SeqCst);

        assert!(matches!(
            bind(&fake, 0x2000, 8),
            Err(BorgError::BindFailed { addr: 0x2000, range: 8, .. })
        ));
        assert!(matches!(
            unbind(&fake, 0x2000, 8),
            Err(BorgError::UnbindFailed { addr: 0x2000, range: 8, .. })
        ));
        assert!(fake.bind_ops.lock().unwrap().is_empty());
    }
}
