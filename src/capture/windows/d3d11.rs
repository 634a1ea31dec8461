//! Direct3D 11 device, staging surfaces and GPU-to-CPU readback

use std::slice;

use windows::core::Interface;
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Win32::Foundation::{BOOL, HMODULE};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Multithread, ID3D11Texture2D,
    D3D11_BOX, D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;

use super::wgc::WgcSurface;
use crate::capture::traits::{GraphicsDevice, MappedSurface};
use crate::error::{CaptureError, CaptureResult};
use crate::region::region_within;
use crate::types::{Region, Size, BYTES_PER_PIXEL};

/// Hardware D3D11 device with BGRA support, plus its WinRT wrapper
pub struct D3D11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    winrt_device: IDirect3DDevice,
}

// SAFETY: the device is multithread-protected and the immediate context is
// only driven from inside the frame slot's lock.
unsafe impl Send for D3D11Device {}
unsafe impl Sync for D3D11Device {}

impl D3D11Device {
    /// Create a device on the default hardware adapter
    pub fn create() -> CaptureResult<Self> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| CaptureError::DeviceUnavailable(format!("D3D11CreateDevice failed: {}", e)))?;

        let device = device.ok_or_else(|| {
            CaptureError::DeviceUnavailable("D3D11CreateDevice returned no device".to_string())
        })?;
        let context = context.ok_or_else(|| {
            CaptureError::DeviceUnavailable("D3D11CreateDevice returned no context".to_string())
        })?;

        if let Ok(multithread) = context.cast::<ID3D11Multithread>() {
            unsafe {
                let _ = multithread.SetMultithreadProtected(BOOL::from(true));
            }
        }

        let winrt_device = create_winrt_device(&device)?;
        log::debug!("Created D3D11 device with BGRA support");

        Ok(Self {
            device,
            context,
            winrt_device,
        })
    }

    /// WinRT device handed to the compositor's frame pool
    pub fn winrt_device(&self) -> &IDirect3DDevice {
        &self.winrt_device
    }
}

fn create_winrt_device(device: &ID3D11Device) -> CaptureResult<IDirect3DDevice> {
    let dxgi_device: IDXGIDevice = device.cast().map_err(|e| {
        CaptureError::DeviceUnavailable(format!("ID3D11Device is not an IDXGIDevice: {}", e))
    })?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device) }.map_err(|e| {
        CaptureError::DeviceUnavailable(format!(
            "CreateDirect3D11DeviceFromDXGIDevice failed: {}",
            e
        ))
    })?;
    Ok(inspectable.cast()?)
}

/// CPU-readable BGRA texture
pub struct D3D11Staging {
    texture: ID3D11Texture2D,
    size: Size,
}

// SAFETY: only touched through D3D11Device under the frame slot's lock.
unsafe impl Send for D3D11Staging {}

impl GraphicsDevice for D3D11Device {
    type Surface = WgcSurface;
    type Staging = D3D11Staging;

    fn create_staging(&self, size: Size) -> CaptureResult<D3D11Staging> {
        if size.is_empty() {
            return Err(CaptureError::InvalidLayout(format!(
                "cannot create a {}x{} staging texture",
                size.width, size.height
            )));
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: size.width,
            Height: size.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut texture)) }.map_err(|e| {
            CaptureError::DeviceUnavailable(format!("CreateTexture2D (staging) failed: {}", e))
        })?;
        let texture = texture.ok_or_else(|| {
            CaptureError::DeviceUnavailable("CreateTexture2D returned no texture".to_string())
        })?;

        Ok(D3D11Staging { texture, size })
    }

    fn surface_size(&self, surface: &WgcSurface) -> Size {
        surface.size()
    }

    fn copy_surface(&self, dst: &mut D3D11Staging, src: &WgcSurface) -> CaptureResult<()> {
        if src.size() != dst.size {
            return Err(CaptureError::CopyFailed(format!(
                "frame is {}x{}, staging texture is {}x{}",
                src.size().width,
                src.size().height,
                dst.size.width,
                dst.size.height
            )));
        }

        unsafe { self.context.CopyResource(&dst.texture, src.texture()) };
        Ok(())
    }

    fn copy_surface_region(
        &self,
        dst: &mut D3D11Staging,
        src: &WgcSurface,
        region: &Region,
    ) -> CaptureResult<()> {
        // The driver drops an out-of-bounds box silently; reject it here instead.
        if !region_within(region, src.size()) || region.size() != dst.size {
            return Err(CaptureError::CopyFailed(format!(
                "crop {} does not fit a {}x{} frame",
                region,
                src.size().width,
                src.size().height
            )));
        }

        let source_box = D3D11_BOX {
            left: region.x as u32,
            top: region.y as u32,
            front: 0,
            right: region.x as u32 + region.width,
            bottom: region.y as u32 + region.height,
            back: 1,
        };

        unsafe {
            self.context.CopySubresourceRegion(
                &dst.texture,
                0,
                0,
                0,
                0,
                src.texture(),
                0,
                Some(&source_box),
            )
        };
        Ok(())
    }

    fn map_staging<R, F>(&self, staging: &mut D3D11Staging, read: F) -> CaptureResult<R>
    where
        F: FnOnce(MappedSurface<'_>) -> CaptureResult<R>,
    {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(&staging.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|e| CaptureError::CopyFailed(format!("Map (staging) failed: {}", e)))?;

        let row_pitch = mapped.RowPitch as usize;
        let row_bytes = staging.size.width as usize * BYTES_PER_PIXEL;
        let len = row_pitch * (staging.size.height as usize - 1) + row_bytes;

        let result = if mapped.pData.is_null() || row_pitch < row_bytes {
            Err(CaptureError::InvalidLayout(format!(
                "mapped staging texture has row pitch {} for {} byte rows",
                row_pitch, row_bytes
            )))
        } else {
            // SAFETY: the mapping covers RowPitch bytes for every row but the last,
            // which holds at least `row_bytes`. It stays valid until Unmap below.
            let data = unsafe { slice::from_raw_parts(mapped.pData as *const u8, len) };
            read(MappedSurface {
                data,
                row_pitch,
                size: staging.size,
            })
        };

        unsafe { self.context.Unmap(&staging.texture, 0) };
        result
    }
}
