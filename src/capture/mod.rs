//! Capture backends behind a platform-neutral device/source interface

pub mod software;
pub mod traits;

#[cfg(target_os = "windows")]
pub mod windows;

pub use software::{SoftwareBackend, SoftwareFeed};
pub use traits::{CaptureBackend, CaptureSource, FramePool, GraphicsDevice, MappedSurface};

#[cfg(not(target_os = "windows"))]
use std::sync::Arc;

#[cfg(not(target_os = "windows"))]
use crate::error::{CaptureError, CaptureResult};
#[cfg(not(target_os = "windows"))]
use crate::types::CaptureTarget;

/// Backend used by the process-wide host and the C API
#[cfg(target_os = "windows")]
pub type PlatformBackend = windows::WgcBackend;

/// Backend used by the process-wide host and the C API
#[cfg(not(target_os = "windows"))]
pub type PlatformBackend = UnsupportedBackend;

/// Create the platform backend
pub fn platform_backend() -> PlatformBackend {
    PlatformBackend::default()
}

/// Stand-in for platforms without a compositor capture API.
///
/// Every session fails with `DeviceUnavailable`.
#[cfg(not(target_os = "windows"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

#[cfg(not(target_os = "windows"))]
impl CaptureBackend for UnsupportedBackend {
    type Device = software::SoftwareDevice;
    type Source = software::SoftwareSource;

    fn name(&self) -> &'static str {
        "Unsupported"
    }

    fn create_device(&self) -> CaptureResult<Arc<Self::Device>> {
        Err(CaptureError::DeviceUnavailable(
            "Windows Graphics Capture is only available on Windows".to_string(),
        ))
    }

    fn bind_target(
        &self,
        _device: &Arc<Self::Device>,
        target: &CaptureTarget,
        _frame_pool_buffers: u32,
    ) -> CaptureResult<Self::Source> {
        Err(CaptureError::TargetUnavailable(format!(
            "cannot capture {} on this platform",
            target
        )))
    }
}
