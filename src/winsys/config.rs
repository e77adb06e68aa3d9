use std::env;
use std::path::PathBuf;

/// Lowest GPU virtual address handed out. The zero page stays unmapped.
pub const BORG_HEAP_START: u64 = 4096;
/// End (exclusive) of the GPU virtual address window, 38 bits.
pub const BORG_HEAP_END: u64 = 1 << 38;
/// Smallest addressable unit of the device; every VA and allocation size is aligned to it.
pub const BORG_VA_ALIGN: u64 = 4;
/// Largest single buffer object the device accepts.
pub const BORG_MAX_BUFFER_SIZE: u64 = 1 << 31;

pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

/// Environment variable overriding [`DeviceConfig::render_node`].
pub const RENDER_NODE_ENV: &str = "BORG_RENDER_NODE";

/// Per-device settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub render_node: PathBuf,
    pub heap_start: u64,
    pub heap_end: u64,
    pub va_align: u64,
    pub max_bo_size: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            render_node: PathBuf::from(DEFAULT_RENDER_NODE),
            heap_start: BORG_HEAP_START,
            heap_end: BORG_HEAP_END,
            va_align: BORG_VA_ALIGN,
            max_bo_size: BORG_MAX_BUFFER_SIZE,
        }
    }
}

impl DeviceConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the render node taken from `BORG_RENDER_NODE` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match env::var_os(RENDER_NODE_ENV) {
            Some(path) if !path.is_empty() => config.render_node(path),
            _ => config,
        }
    }

    #[must_use]
    pub fn render_node(mut self, path: impl Into<PathBuf>) -> Self {
        self.render_node = path.into();
        self
    }

    #[must_use]
    pub const fn heap_window(mut self, start: u64, end: u64) -> Self {
        self.heap_start = start;
        self.heap_end = end;
        self
    }

    #[must_use]
    pub const fn va_align(mut self, align: u64) -> Self {
        self.va_align = align;
        self
    }

    #[must_use]
    pub const fn max_bo_size(mut self, size: u64) -> Self {
        self.max_bo_size = size;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.heap_start == 0 {
            return Err("heap window must not include VA 0");
        }
        if self.heap_start >= self.heap_end {
            return Err("heap window is empty");
        }
        if !self.va_align.is_power_of_two() {
            return Err("VA alignment must be a power of two");
        }
        if self.max_bo_size == 0 {
            return Err("maximum buffer size must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_device_limits() {
        let config = DeviceConfig::new();
        assert_eq!(config.heap_start, 4096);
        assert_eq!(config.heap_end, 1 << 38);
        assert_eq!(config.va_align, 4);
        assert_eq!(config.max_bo_size, 1 << 31);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_windows_and_alignments() {
        assert!(DeviceConfig::new().heap_window(8192, 4096).validate().is_err());
        assert!(DeviceConfig::new().heap_window(4096, 4096).validate().is_err());
        assert!(DeviceConfig::new().heap_window(0, 4096).validate().is_err());
        assert!(DeviceConfig::new().va_align(3).validate().is_err());
        assert!(DeviceConfig::new().va_align(0).validate().is_err());
        assert!(DeviceConfig::new().max_bo_size(0).validate().is_err());
    }

    #[test]
    fn builder_overrides_render_node() {
        let config = DeviceConfig::new().render_node("/dev/dri/renderD129");
        assert_eq!(config.render_node, PathBuf::from("/dev/dri/renderD129"));
    }
}
