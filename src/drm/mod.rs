pub mod device;
pub mod ioctl;
