//! Kernel configuration.

use std::path::PathBuf;

/// Options controlling a kernel instance.
#[derive(Debug, Clone, Default)]
pub struct KernelOptions {
    /// Root under which packages are unpacked, one directory per assembly.
    /// When unset, a temporary directory is created on the first `load` and
    /// removed when the kernel is dropped.
    pub install_dir: Option<PathBuf>,
    /// Log every inbound and outbound protocol line at `trace` level.
    pub trace_wire: bool,
}

impl KernelOptions {
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_trace_wire(mut self, enabled: bool) -> Self {
        self.trace_wire = enabled;
        self
    }
}
