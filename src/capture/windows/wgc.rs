//! Windows.Graphics.Capture sources

use std::ffi::c_void;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use windows::core::{Interface, HSTRING};
use windows::Foundation::Metadata::ApiInformation;
use windows::Foundation::{EventRegistrationToken, TypedEventHandler};
use windows::Graphics::Capture::{
    Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureItem,
    GraphicsCaptureSession,
};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D11::{ID3D11Texture2D, D3D11_TEXTURE2D_DESC};
use windows::Win32::Graphics::Gdi::HMONITOR;
use windows::Win32::System::Com::CoIncrementMTAUsage;
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

use super::d3d11::D3D11Device;
use crate::capture::traits::{CaptureSource, FrameArrivedHandler, FramePool};
use crate::error::{CaptureError, CaptureResult};
use crate::types::{CaptureTarget, Size};

static MTA: OnceCell<()> = OnceCell::new();

/// Keep the process multithreaded apartment alive for the compositor's callbacks
pub(super) fn ensure_mta() -> CaptureResult<()> {
    MTA.get_or_try_init(|| {
        unsafe { CoIncrementMTAUsage() }
            .map(|_cookie| ())
            .map_err(|e| CaptureError::DeviceUnavailable(format!("CoIncrementMTAUsage failed: {}", e)))
    })
    .map(|_| ())
}

/// Whether the OS supports capture sessions at all
pub(super) fn capture_supported() -> bool {
    GraphicsCaptureSession::IsSupported().unwrap_or(false)
}

fn border_toggle_available() -> bool {
    ApiInformation::IsPropertyPresent(
        &HSTRING::from("Windows.Graphics.Capture.GraphicsCaptureSession"),
        &HSTRING::from("IsBorderRequired"),
    )
    .unwrap_or(false)
}

fn create_capture_item(target: &CaptureTarget) -> CaptureResult<GraphicsCaptureItem> {
    let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
        .map_err(|e| {
            CaptureError::DeviceUnavailable(format!("IGraphicsCaptureItemInterop factory: {}", e))
        })?;

    let item: windows::core::Result<GraphicsCaptureItem> = match target {
        CaptureTarget::Window(handle) => unsafe {
            interop.CreateForWindow(HWND(handle.raw() as *mut c_void))
        },
        CaptureTarget::Monitor(handle) => unsafe {
            interop.CreateForMonitor(HMONITOR(handle.raw() as *mut c_void))
        },
    };
    item.map_err(|e| CaptureError::TargetUnavailable(format!("{}: {}", target, e)))
}

/// Frame delivered by the compositor, closed back to its pool on drop
pub struct WgcSurface {
    frame: Direct3D11CaptureFrame,
    texture: ID3D11Texture2D,
    size: Size,
}

impl WgcSurface {
    fn from_frame(frame: Direct3D11CaptureFrame) -> CaptureResult<Self> {
        let access: IDirect3DDxgiInterfaceAccess = frame.Surface()?.cast()?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface() }?;

        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };

        Ok(Self {
            frame,
            texture,
            size: Size::new(desc.Width, desc.Height),
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub(super) fn texture(&self) -> &ID3D11Texture2D {
        &self.texture
    }
}

impl Drop for WgcSurface {
    fn drop(&mut self) {
        let _ = self.frame.Close();
    }
}

struct WgcFramePool<'a>(&'a Direct3D11CaptureFramePool);

impl FramePool<WgcSurface> for WgcFramePool<'_> {
    fn try_next_frame(&self) -> Option<WgcSurface> {
        let frame = self.0.TryGetNextFrame().ok()?;
        match WgcSurface::from_frame(frame) {
            Ok(surface) => Some(surface),
            Err(e) => {
                log::warn!("Dropping undecodable capture frame: {}", e);
                None
            }
        }
    }
}

/// Capture item bound to a free-threaded frame pool and session
pub struct WgcSource {
    item: GraphicsCaptureItem,
    frame_pool: Direct3D11CaptureFramePool,
    session: GraphicsCaptureSession,
    token: Option<EventRegistrationToken>,
    stopped: bool,
}

// SAFETY: the WinRT objects here are agile; the frame pool is free-threaded.
unsafe impl Send for WgcSource {}

impl WgcSource {
    pub(super) fn bind(
        device: &Arc<D3D11Device>,
        target: &CaptureTarget,
        buffers: u32,
    ) -> CaptureResult<Self> {
        let item = create_capture_item(target)?;
        let size = item
            .Size()
            .map_err(|e| CaptureError::TargetUnavailable(format!("{} size: {}", target, e)))?;

        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            device.winrt_device(),
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            buffers.max(1) as i32,
            size,
        )
        .map_err(|e| CaptureError::TargetUnavailable(format!("frame pool for {}: {}", target, e)))?;

        let session = frame_pool
            .CreateCaptureSession(&item)
            .map_err(|e| CaptureError::TargetUnavailable(format!("session for {}: {}", target, e)))?;

        log::debug!(
            "Bound {} as capture item ({}x{})",
            target,
            size.Width,
            size.Height
        );

        Ok(Self {
            item,
            frame_pool,
            session,
            token: None,
            stopped: false,
        })
    }
}

impl CaptureSource for WgcSource {
    type Surface = WgcSurface;

    fn native_size(&self) -> CaptureResult<Size> {
        let size = self.item.Size()?;
        Ok(Size::new(size.Width.max(0) as u32, size.Height.max(0) as u32))
    }

    fn supports_border_toggle(&self) -> bool {
        border_toggle_available()
    }

    fn set_border_required(&mut self, required: bool) -> CaptureResult<()> {
        Ok(self.session.SetIsBorderRequired(required)?)
    }

    fn subscribe(&mut self, handler: FrameArrivedHandler<WgcSurface>) -> CaptureResult<()> {
        if self.token.is_some() {
            return Err(CaptureError::InvalidConfiguration(
                "source already has a frame handler".to_string(),
            ));
        }

        let token = self
            .frame_pool
            .FrameArrived(&TypedEventHandler::<Direct3D11CaptureFramePool, windows::core::IInspectable>::new(
                move |sender, _| {
                    if let Some(pool) = sender {
                        handler(&WgcFramePool(pool));
                    }
                    Ok(())
                },
            ))
            .map_err(|e| CaptureError::TargetUnavailable(format!("FrameArrived registration: {}", e)))?;

        self.token = Some(token);
        Ok(())
    }

    fn start(&mut self) -> CaptureResult<()> {
        self.session
            .StartCapture()
            .map_err(|e| CaptureError::TargetUnavailable(format!("StartCapture failed: {}", e)))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let _ = self.session.Close();
        if let Some(token) = self.token.take() {
            let _ = self.frame_pool.RemoveFrameArrived(token);
        }
        let _ = self.frame_pool.Close();
    }
}

impl Drop for WgcSource {
    fn drop(&mut self) {
        self.stop();
    }
}
