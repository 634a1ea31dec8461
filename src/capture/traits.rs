//! Seams between the capture pipeline and the platform.
//!
//! A [`CaptureBackend`] hands out a shared [`GraphicsDevice`] and binds
//! [`CaptureSource`]s to windows or monitors. Sources push "frame arrived"
//! notifications to a handler, which pulls surfaces out of a [`FramePool`].

use std::sync::Arc;

use crate::error::CaptureResult;
use crate::types::{CaptureTarget, Region, Size};

/// CPU view of a mapped staging surface
#[derive(Debug, Clone, Copy)]
pub struct MappedSurface<'a> {
    /// Mapped bytes; at least `row_pitch * (height - 1) + width * 4` long
    pub data: &'a [u8],
    /// Byte stride between rows, never assumed to equal `width * 4`
    pub row_pitch: usize,
    pub size: Size,
}

/// GPU device plus its immediate command context
pub trait GraphicsDevice: Send + Sync + 'static {
    /// Opaque compositor surface delivered by a frame pool
    type Surface;
    /// CPU-readable surface the pipeline copies into
    type Staging: Send + 'static;

    /// Create a CPU-read, GPU-write surface of `size` BGRA pixels
    fn create_staging(&self, size: Size) -> CaptureResult<Self::Staging>;

    /// Dimensions of a delivered surface
    fn surface_size(&self, surface: &Self::Surface) -> Size;

    /// Copy a whole surface into the staging surface
    fn copy_surface(&self, dst: &mut Self::Staging, src: &Self::Surface) -> CaptureResult<()>;

    /// Copy `region` of `src` into the staging surface at (0, 0)
    fn copy_surface_region(
        &self,
        dst: &mut Self::Staging,
        src: &Self::Surface,
        region: &Region,
    ) -> CaptureResult<()>;

    /// Map the staging surface for reading, run `read`, then unmap
    fn map_staging<R, F>(&self, staging: &mut Self::Staging, read: F) -> CaptureResult<R>
    where
        F: FnOnce(MappedSurface<'_>) -> CaptureResult<R>;
}

/// Pull side of the compositor's surface stream
pub trait FramePool<S> {
    /// Next delivered surface, or `None` when the signal was spurious
    fn try_next_frame(&self) -> Option<S>;
}

/// Callback invoked on the compositor's thread for every frame signal
pub type FrameArrivedHandler<S> = Box<dyn Fn(&dyn FramePool<S>) + Send + Sync + 'static>;

/// A window or monitor bound as a capture source
pub trait CaptureSource: Send + 'static {
    type Surface;

    /// Size of the source as reported at bind time
    fn native_size(&self) -> CaptureResult<Size>;

    /// Whether the platform lets callers toggle the capture border
    fn supports_border_toggle(&self) -> bool {
        false
    }

    fn set_border_required(&mut self, required: bool) -> CaptureResult<()>;

    /// Register the frame handler; at most one per source
    fn subscribe(&mut self, handler: FrameArrivedHandler<Self::Surface>) -> CaptureResult<()>;

    /// Start delivering frames to the handler
    fn start(&mut self) -> CaptureResult<()>;

    /// Stop the stream and drop the subscription. Idempotent.
    fn stop(&mut self);
}

/// Factory for devices and capture sources
pub trait CaptureBackend: Send + Sync + 'static {
    type Device: GraphicsDevice;
    type Source: CaptureSource<Surface = <Self::Device as GraphicsDevice>::Surface>;

    /// Get the implementation name
    fn name(&self) -> &'static str;

    /// Acquire a hardware device; fails with `DeviceUnavailable`
    fn create_device(&self) -> CaptureResult<Arc<Self::Device>>;

    /// Bind `target` as a capture source on `device`; fails with `TargetUnavailable`
    fn bind_target(
        &self,
        device: &Arc<Self::Device>,
        target: &CaptureTarget,
        frame_pool_buffers: u32,
    ) -> CaptureResult<Self::Source>;
}
