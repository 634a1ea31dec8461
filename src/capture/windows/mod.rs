//! Windows Graphics Capture backend on a Direct3D 11 device

mod d3d11;
mod wgc;

pub use d3d11::{D3D11Device, D3D11Staging};
pub use wgc::{WgcSource, WgcSurface};

use std::sync::Arc;

use crate::capture::traits::CaptureBackend;
use crate::error::{CaptureError, CaptureResult};
use crate::types::CaptureTarget;

/// Compositor-driven capture through Windows.Graphics.Capture
#[derive(Debug, Default, Clone, Copy)]
pub struct WgcBackend;

impl WgcBackend {
    pub fn new() -> Self {
        Self
    }

    /// Check if Windows Graphics Capture is available on this system
    pub fn is_supported() -> bool {
        wgc::capture_supported()
    }
}

impl CaptureBackend for WgcBackend {
    type Device = D3D11Device;
    type Source = WgcSource;

    fn name(&self) -> &'static str {
        "Windows.Graphics.Capture"
    }

    fn create_device(&self) -> CaptureResult<Arc<D3D11Device>> {
        wgc::ensure_mta()?;
        if !wgc::capture_supported() {
            return Err(CaptureError::DeviceUnavailable(
                "Windows Graphics Capture is not supported on this system".to_string(),
            ));
        }
        Ok(Arc::new(D3D11Device::create()?))
    }

    fn bind_target(
        &self,
        device: &Arc<D3D11Device>,
        target: &CaptureTarget,
        frame_pool_buffers: u32,
    ) -> CaptureResult<WgcSource> {
        let raw = match target {
            CaptureTarget::Window(handle) => handle.raw(),
            CaptureTarget::Monitor(handle) => handle.raw(),
        };
        if raw == 0 {
            return Err(CaptureError::TargetUnavailable(format!("null handle for {}", target)));
        }
        WgcSource::bind(device, target, frame_pool_buffers)
    }
}
