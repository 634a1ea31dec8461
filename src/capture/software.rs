//! In-memory capture backend.
//!
//! Emulates the GPU side of the pipeline in host memory: surfaces and staging
//! surfaces carry a row pitch aligned like a real driver's, and frames are
//! pumped by hand through a [`SoftwareFeed`]. Pushing a frame invokes the
//! session's frame handler on the pushing thread, the way the compositor
//! invokes it on one of its own threads.
//!
//! Live resources are counted so tests can verify that every session path
//! releases what it acquired.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::capture::traits::{
    CaptureBackend, CaptureSource, FrameArrivedHandler, FramePool, GraphicsDevice, MappedSurface,
};
use crate::error::{CaptureError, CaptureResult};
use crate::pitch::{copy_rows, RowCopy};
use crate::region::region_within;
use crate::types::{CaptureTarget, Region, Size, BYTES_PER_PIXEL};

/// Row pitch alignment used unless configured otherwise
pub const DEFAULT_PITCH_ALIGNMENT: usize = 256;

/// Byte value written into row padding
pub const PADDING_BYTE: u8 = 0xCD;

/// Step of session construction that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Device,
    Staging,
    Subscribe,
    Start,
}

/// Resources currently alive in a software backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveResources {
    pub devices: usize,
    pub staging_surfaces: usize,
    pub sources: usize,
    pub subscriptions: usize,
}

impl LiveResources {
    pub fn is_empty(&self) -> bool {
        *self == LiveResources::default()
    }
}

#[derive(Default)]
struct Counters {
    devices: AtomicUsize,
    staging_surfaces: AtomicUsize,
    sources: AtomicUsize,
    subscriptions: AtomicUsize,
}

#[derive(Clone, Copy)]
enum Resource {
    Device,
    Staging,
    Source,
    Subscription,
}

impl Counters {
    fn of(&self, resource: Resource) -> &AtomicUsize {
        match resource {
            Resource::Device => &self.devices,
            Resource::Staging => &self.staging_surfaces,
            Resource::Source => &self.sources,
            Resource::Subscription => &self.subscriptions,
        }
    }
}

/// Decrements a live-resource counter on drop
struct LiveGuard {
    world: Arc<World>,
    resource: Resource,
}

impl LiveGuard {
    fn new(world: &Arc<World>, resource: Resource) -> Self {
        world.counters.of(resource).fetch_add(1, Ordering::SeqCst);
        Self {
            world: world.clone(),
            resource,
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.world
            .counters
            .of(self.resource)
            .fetch_sub(1, Ordering::SeqCst);
    }
}

type SharedHandler = Arc<dyn Fn(&dyn FramePool<SoftwareSurface>) + Send + Sync>;

struct Subscriber {
    id: u64,
    handler: SharedHandler,
    started: bool,
    capacity: usize,
    pending: Arc<Mutex<VecDeque<SoftwareSurface>>>,
}

struct TargetState {
    size: Size,
    alive: bool,
    border_required: Option<bool>,
    subscribers: Vec<Subscriber>,
}

struct World {
    pitch_alignment: usize,
    device_available: AtomicBool,
    border_toggle_supported: AtomicBool,
    failure: Mutex<Option<FailurePoint>>,
    targets: Mutex<HashMap<CaptureTarget, TargetState>>,
    counters: Counters,
    next_subscriber: AtomicU64,
}

impl World {
    fn take_failure(&self, point: FailurePoint) -> bool {
        let mut failure = self.failure.lock();
        if *failure == Some(point) {
            *failure = None;
            true
        } else {
            false
        }
    }
}

fn aligned_pitch(width: u32, alignment: usize) -> usize {
    let row = width as usize * BYTES_PER_PIXEL;
    row.div_ceil(alignment.max(1)) * alignment.max(1)
}

/// Host-memory implementation of [`CaptureBackend`]
#[derive(Clone)]
pub struct SoftwareBackend {
    world: Arc<World>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::with_pitch_alignment(DEFAULT_PITCH_ALIGNMENT)
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose surfaces pad rows to a multiple of `alignment` bytes
    pub fn with_pitch_alignment(alignment: usize) -> Self {
        Self {
            world: Arc::new(World {
                pitch_alignment: alignment.max(1),
                device_available: AtomicBool::new(true),
                border_toggle_supported: AtomicBool::new(true),
                failure: Mutex::new(None),
                targets: Mutex::new(HashMap::new()),
                counters: Counters::default(),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Register a window of the given native size and return its feed
    pub fn add_window(&self, raw_handle: isize, size: Size) -> SoftwareFeed {
        self.add_target(CaptureTarget::window(raw_handle), size)
    }

    /// Register a monitor of the given native size and return its feed
    pub fn add_monitor(&self, raw_handle: isize, size: Size) -> SoftwareFeed {
        self.add_target(CaptureTarget::monitor(raw_handle), size)
    }

    fn add_target(&self, target: CaptureTarget, size: Size) -> SoftwareFeed {
        self.world.targets.lock().insert(
            target,
            TargetState {
                size,
                alive: true,
                border_required: None,
                subscribers: Vec::new(),
            },
        );
        SoftwareFeed {
            world: self.world.clone(),
            target,
        }
    }

    /// Simulate a machine without a usable adapter
    pub fn set_device_available(&self, available: bool) {
        self.world
            .device_available
            .store(available, Ordering::SeqCst);
    }

    pub fn set_border_toggle_supported(&self, supported: bool) {
        self.world
            .border_toggle_supported
            .store(supported, Ordering::SeqCst);
    }

    /// Make the next pass through `point` fail once
    pub fn fail_next(&self, point: FailurePoint) {
        *self.world.failure.lock() = Some(point);
    }

    pub fn pitch_alignment(&self) -> usize {
        self.world.pitch_alignment
    }

    pub fn live_resources(&self) -> LiveResources {
        let counters = &self.world.counters;
        LiveResources {
            devices: counters.devices.load(Ordering::SeqCst),
            staging_surfaces: counters.staging_surfaces.load(Ordering::SeqCst),
            sources: counters.sources.load(Ordering::SeqCst),
            subscriptions: counters.subscriptions.load(Ordering::SeqCst),
        }
    }
}

impl CaptureBackend for SoftwareBackend {
    type Device = SoftwareDevice;
    type Source = SoftwareSource;

    fn name(&self) -> &'static str {
        "Software"
    }

    fn create_device(&self) -> CaptureResult<Arc<SoftwareDevice>> {
        if !self.world.device_available.load(Ordering::SeqCst)
            || self.world.take_failure(FailurePoint::Device)
        {
            return Err(CaptureError::DeviceUnavailable(
                "software adapter disabled".to_string(),
            ));
        }
        Ok(Arc::new(SoftwareDevice {
            pitch_alignment: self.world.pitch_alignment,
            world: self.world.clone(),
            _live: LiveGuard::new(&self.world, Resource::Device),
        }))
    }

    fn bind_target(
        &self,
        _device: &Arc<SoftwareDevice>,
        target: &CaptureTarget,
        frame_pool_buffers: u32,
    ) -> CaptureResult<SoftwareSource> {
        let targets = self.world.targets.lock();
        let state = targets
            .get(target)
            .filter(|state| state.alive)
            .ok_or_else(|| CaptureError::TargetUnavailable(format!("no such {}", target)))?;

        Ok(SoftwareSource {
            world: self.world.clone(),
            target: *target,
            size: state.size,
            capacity: frame_pool_buffers.max(1) as usize,
            subscriber: None,
            _live: LiveGuard::new(&self.world, Resource::Source),
        })
    }
}

/// Emulated device; copies run synchronously in host memory
pub struct SoftwareDevice {
    pitch_alignment: usize,
    world: Arc<World>,
    _live: LiveGuard,
}

/// Compositor surface held in host memory, rows padded to the backend's alignment
#[derive(Clone)]
pub struct SoftwareSurface {
    size: Size,
    pitch: usize,
    data: Arc<[u8]>,
}

impl SoftwareSurface {
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn row_pitch(&self) -> usize {
        self.pitch
    }
}

/// CPU-readable staging surface
pub struct SoftwareStaging {
    size: Size,
    pitch: usize,
    data: Vec<u8>,
    _live: LiveGuard,
}

impl SoftwareStaging {
    pub fn row_pitch(&self) -> usize {
        self.pitch
    }
}

impl GraphicsDevice for SoftwareDevice {
    type Surface = SoftwareSurface;
    type Staging = SoftwareStaging;

    fn create_staging(&self, size: Size) -> CaptureResult<SoftwareStaging> {
        if size.is_empty() {
            return Err(CaptureError::InvalidLayout(format!(
                "cannot create a {}x{} staging surface",
                size.width, size.height
            )));
        }
        if self.world.take_failure(FailurePoint::Staging) {
            return Err(CaptureError::DeviceUnavailable(
                "staging surface allocation failed".to_string(),
            ));
        }

        let pitch = aligned_pitch(size.width, self.pitch_alignment);
        Ok(SoftwareStaging {
            size,
            pitch,
            data: vec![PADDING_BYTE; pitch * size.height as usize],
            _live: LiveGuard::new(&self.world, Resource::Staging),
        })
    }

    fn surface_size(&self, surface: &SoftwareSurface) -> Size {
        surface.size
    }

    fn copy_surface(&self, dst: &mut SoftwareStaging, src: &SoftwareSurface) -> CaptureResult<()> {
        if dst.size != src.size {
            return Err(CaptureError::CopyFailed(format!(
                "surface is {}x{}, staging is {}x{}",
                src.size.width, src.size.height, dst.size.width, dst.size.height
            )));
        }
        copy_rows(
            &src.data,
            &mut dst.data,
            RowCopy {
                rows: src.size.height as usize,
                row_bytes: src.size.width as usize * BYTES_PER_PIXEL,
                src_pitch: src.pitch,
                dst_pitch: dst.pitch,
            },
        )
    }

    fn copy_surface_region(
        &self,
        dst: &mut SoftwareStaging,
        src: &SoftwareSurface,
        region: &Region,
    ) -> CaptureResult<()> {
        if !region_within(region, src.size) {
            return Err(CaptureError::CopyFailed(format!(
                "crop {} exceeds {}x{} surface",
                region, src.size.width, src.size.height
            )));
        }
        if region.size() != dst.size {
            return Err(CaptureError::CopyFailed(format!(
                "crop {} does not match {}x{} staging surface",
                region, dst.size.width, dst.size.height
            )));
        }

        let offset = region.y as usize * src.pitch + region.x as usize * BYTES_PER_PIXEL;
        copy_rows(
            &src.data[offset..],
            &mut dst.data,
            RowCopy {
                rows: region.height as usize,
                row_bytes: region.row_bytes(),
                src_pitch: src.pitch,
                dst_pitch: dst.pitch,
            },
        )
    }

    fn map_staging<R, F>(&self, staging: &mut SoftwareStaging, read: F) -> CaptureResult<R>
    where
        F: FnOnce(MappedSurface<'_>) -> CaptureResult<R>,
    {
        read(MappedSurface {
            data: &staging.data,
            row_pitch: staging.pitch,
            size: staging.size,
        })
    }
}

struct PendingPool<'a> {
    pending: &'a Mutex<VecDeque<SoftwareSurface>>,
}

impl FramePool<SoftwareSurface> for PendingPool<'_> {
    fn try_next_frame(&self) -> Option<SoftwareSurface> {
        self.pending.lock().pop_front()
    }
}

/// Capture source bound to a registered target
pub struct SoftwareSource {
    world: Arc<World>,
    target: CaptureTarget,
    size: Size,
    capacity: usize,
    subscriber: Option<(u64, LiveGuard)>,
    _live: LiveGuard,
}

impl SoftwareSource {
    fn with_subscriber<T>(&self, f: impl FnOnce(&mut Subscriber) -> T) -> Option<T> {
        let (id, _) = self.subscriber.as_ref()?;
        let mut targets = self.world.targets.lock();
        targets
            .get_mut(&self.target)?
            .subscribers
            .iter_mut()
            .find(|s| s.id == *id)
            .map(f)
    }
}

impl CaptureSource for SoftwareSource {
    type Surface = SoftwareSurface;

    fn native_size(&self) -> CaptureResult<Size> {
        Ok(self.size)
    }

    fn supports_border_toggle(&self) -> bool {
        self.world.border_toggle_supported.load(Ordering::SeqCst)
    }

    fn set_border_required(&mut self, required: bool) -> CaptureResult<()> {
        if !self.supports_border_toggle() {
            return Err(CaptureError::Other(anyhow::anyhow!(
                "border toggle not supported"
            )));
        }
        if let Some(state) = self.world.targets.lock().get_mut(&self.target) {
            state.border_required = Some(required);
        }
        Ok(())
    }

    fn subscribe(&mut self, handler: FrameArrivedHandler<SoftwareSurface>) -> CaptureResult<()> {
        if self.subscriber.is_some() {
            return Err(CaptureError::InvalidConfiguration(
                "source already has a frame handler".to_string(),
            ));
        }
        if self.world.take_failure(FailurePoint::Subscribe) {
            return Err(CaptureError::TargetUnavailable(
                "frame pool subscription failed".to_string(),
            ));
        }

        let id = self.world.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let mut targets = self.world.targets.lock();
        let state = targets
            .get_mut(&self.target)
            .ok_or_else(|| CaptureError::TargetUnavailable(format!("no such {}", self.target)))?;
        state.subscribers.push(Subscriber {
            id,
            handler: Arc::from(handler),
            started: false,
            capacity: self.capacity,
            pending: Arc::new(Mutex::new(VecDeque::new())),
        });
        drop(targets);

        self.subscriber = Some((id, LiveGuard::new(&self.world, Resource::Subscription)));
        Ok(())
    }

    fn start(&mut self) -> CaptureResult<()> {
        if self.world.take_failure(FailurePoint::Start) {
            return Err(CaptureError::TargetUnavailable(
                "capture stream failed to start".to_string(),
            ));
        }
        self.with_subscriber(|s| s.started = true)
            .ok_or_else(|| {
                CaptureError::InvalidConfiguration("start before subscribe".to_string())
            })
    }

    fn stop(&mut self) {
        let Some((id, live)) = self.subscriber.take() else {
            return;
        };
        if let Some(state) = self.world.targets.lock().get_mut(&self.target) {
            state.subscribers.retain(|s| s.id != id);
        }
        drop(live);
    }
}

impl Drop for SoftwareSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer handle for a registered target
#[derive(Clone)]
pub struct SoftwareFeed {
    world: Arc<World>,
    target: CaptureTarget,
}

impl SoftwareFeed {
    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    /// Current size of the target
    pub fn size(&self) -> Size {
        self.world
            .targets
            .lock()
            .get(&self.target)
            .map(|s| s.size)
            .unwrap_or_default()
    }

    /// Change the target's size; frames pushed afterwards use it
    pub fn resize(&self, size: Size) {
        if let Some(state) = self.world.targets.lock().get_mut(&self.target) {
            state.size = size;
        }
    }

    /// Mark the target as gone; later binds fail
    pub fn close(&self) {
        if let Some(state) = self.world.targets.lock().get_mut(&self.target) {
            state.alive = false;
        }
    }

    /// Last border request made by a bound source
    pub fn border_required(&self) -> Option<bool> {
        self.world
            .targets
            .lock()
            .get(&self.target)
            .and_then(|s| s.border_required)
    }

    /// Number of started subscriptions
    pub fn active_streams(&self) -> usize {
        self.world
            .targets
            .lock()
            .get(&self.target)
            .map(|s| s.subscribers.iter().filter(|sub| sub.started).count())
            .unwrap_or(0)
    }

    /// Deliver a frame built from dense BGRA rows.
    ///
    /// Returns the number of streams the frame reached.
    pub fn push_frame(&self, dense: &[u8]) -> usize {
        let size = self.size();
        let pitch = aligned_pitch(size.width, self.world.pitch_alignment);
        let row_bytes = size.width as usize * BYTES_PER_PIXEL;
        let mut data = vec![PADDING_BYTE; pitch * size.height as usize];
        if copy_rows(
            dense,
            &mut data,
            RowCopy {
                rows: size.height as usize,
                row_bytes,
                src_pitch: row_bytes,
                dst_pitch: pitch,
            },
        )
        .is_err()
        {
            log::warn!(
                "push_frame: {} bytes do not cover a {}x{} frame",
                dense.len(),
                size.width,
                size.height
            );
            return 0;
        }

        self.deliver(Some(SoftwareSurface {
            size,
            pitch,
            data: Arc::from(data),
        }))
    }

    /// Deliver a frame where pixel (x, y) is produced by `pixel`
    pub fn push_with(&self, pixel: impl Fn(u32, u32) -> [u8; 4]) -> usize {
        let size = self.size();
        let mut dense = Vec::with_capacity(size.width as usize * size.height as usize * 4);
        for y in 0..size.height {
            for x in 0..size.width {
                dense.extend_from_slice(&pixel(x, y));
            }
        }
        self.push_frame(&dense)
    }

    /// Deliver a frame of a single BGRA color
    pub fn push_solid(&self, bgra: [u8; 4]) -> usize {
        self.push_with(|_, _| bgra)
    }

    /// Raise a frame signal with nothing in the pool
    pub fn signal_empty(&self) -> usize {
        self.deliver(None)
    }

    fn deliver(&self, surface: Option<SoftwareSurface>) -> usize {
        let receivers: Vec<(SharedHandler, Arc<Mutex<VecDeque<SoftwareSurface>>>)> = {
            let targets = self.world.targets.lock();
            let Some(state) = targets.get(&self.target) else {
                return 0;
            };
            state
                .subscribers
                .iter()
                .filter(|s| s.started)
                .map(|s| {
                    if let Some(surface) = &surface {
                        let mut pending = s.pending.lock();
                        if pending.len() >= s.capacity {
                            pending.pop_front();
                        }
                        pending.push_back(surface.clone());
                    }
                    (s.handler.clone(), s.pending.clone())
                })
                .collect()
        };

        // Handlers run without the target lock, like compositor callbacks.
        for (handler, pending) in &receivers {
            handler(&PendingPool { pending });
        }
        receivers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_alignment() {
        assert_eq!(aligned_pitch(10, 256), 256);
        assert_eq!(aligned_pitch(64, 256), 256);
        assert_eq!(aligned_pitch(65, 256), 512);
        assert_eq!(aligned_pitch(3, 1), 12);
    }

    #[test]
    fn test_staging_rows_are_padded() {
        let backend = SoftwareBackend::with_pitch_alignment(64);
        let device = backend.create_device().unwrap();
        let staging = device.create_staging(Size::new(5, 2)).unwrap();
        assert_eq!(staging.row_pitch(), 64);
        assert_eq!(backend.live_resources().staging_surfaces, 1);
        drop(staging);
        assert_eq!(backend.live_resources().staging_surfaces, 0);
    }

    #[test]
    fn test_region_copy_rejects_out_of_bounds() {
        let backend = SoftwareBackend::new();
        let device = backend.create_device().unwrap();
        let mut staging = device.create_staging(Size::new(4, 4)).unwrap();
        let surface = SoftwareSurface {
            size: Size::new(6, 6),
            pitch: 256,
            data: Arc::from(vec![0u8; 256 * 6]),
        };
        let region = Region {
            x: 3,
            y: 0,
            width: 4,
            height: 4,
            clipped: true,
        };
        assert!(matches!(
            device.copy_surface_region(&mut staging, &surface, &region),
            Err(CaptureError::CopyFailed(_))
        ));
    }

    #[test]
    fn test_frames_only_reach_started_subscribers() {
        let backend = SoftwareBackend::new();
        let feed = backend.add_window(1, Size::new(2, 2));
        let device = backend.create_device().unwrap();
        let mut source = backend
            .bind_target(&device, &CaptureTarget::window(1), 1)
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        source
            .subscribe(Box::new(move |pool: &dyn FramePool<SoftwareSurface>| {
                if pool.try_next_frame().is_some() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();

        assert_eq!(feed.push_solid([1, 2, 3, 4]), 0);
        source.start().unwrap();
        assert_eq!(feed.push_solid([1, 2, 3, 4]), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.stop();
        assert_eq!(feed.push_solid([1, 2, 3, 4]), 0);
        assert_eq!(backend.live_resources().subscriptions, 0);
    }

    #[test]
    fn test_unknown_or_closed_target_unavailable() {
        let backend = SoftwareBackend::new();
        let device = backend.create_device().unwrap();
        assert!(matches!(
            backend.bind_target(&device, &CaptureTarget::window(99), 1),
            Err(CaptureError::TargetUnavailable(_))
        ));

        let feed = backend.add_window(5, Size::new(8, 8));
        feed.close();
        assert!(matches!(
            backend.bind_target(&device, &CaptureTarget::window(5), 1),
            Err(CaptureError::TargetUnavailable(_))
        ));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let backend = SoftwareBackend::new();
        backend.fail_next(FailurePoint::Device);
        assert!(backend.create_device().is_err());
        assert!(backend.create_device().is_ok());
    }
}
