//! Persistent capture session.
//!
//! A session binds one capture target, resolves its region, allocates one
//! staging surface and subscribes a frame handler to the compositor's stream.
//! The handler copies each delivered surface into the staging surface under
//! the frame slot's lock; readers export it as dense BGRA rows.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::traits::{CaptureBackend, CaptureSource, FramePool, GraphicsDevice};
use crate::error::{CaptureError, CaptureResult};
use crate::pitch::{copy_rows, RowCopy};
use crate::region::resolve_region;
use crate::slot::FrameSlot;
use crate::types::{
    CaptureConfig, CaptureTarget, CropRequest, Frame, FrameInfo, ReadPolicy, Region,
    SessionState, SessionStats, BYTES_PER_PIXEL,
};

/// State shared between the session and its frame handler
struct SessionShared<D: GraphicsDevice> {
    device: Arc<D>,
    region: Region,
    slot: FrameSlot<D::Staging>,
    empty_signals: AtomicU64,
    callback_faults: AtomicU64,
}

impl<D: GraphicsDevice> SessionShared<D> {
    fn on_frame_arrived(&self, pool: &dyn FramePool<D::Surface>) {
        // Older surfaces still queued in the pool are superseded by the newest one.
        let mut newest = None;
        while let Some(surface) = pool.try_next_frame() {
            newest = Some(surface);
        }

        let Some(surface) = newest else {
            self.empty_signals.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let result = self.slot.publish(|staging| {
            if self.region.clipped {
                self.device
                    .copy_surface_region(staging, &surface, &self.region)
            } else {
                self.device.copy_surface(staging, &surface)
            }
        });

        match result {
            Ok(sequence) => log::trace!("Published frame {}", sequence),
            Err(CaptureError::SessionClosed) => {}
            Err(e) => {
                self.callback_faults.fetch_add(1, Ordering::Relaxed);
                log::warn!("Skipping frame: {}", e);
            }
        }
    }
}

/// Live capture of one window or monitor
pub struct CaptureSession<B: CaptureBackend> {
    target: CaptureTarget,
    region: Region,
    config: CaptureConfig,
    state: SessionState,
    shared: Option<Arc<SessionShared<B::Device>>>,
    source: Option<B::Source>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Create and start a session.
    ///
    /// A crop with non-positive width or height captures the full frame.
    /// Any failure releases everything acquired so far.
    pub fn start(
        backend: &B,
        target: CaptureTarget,
        crop: CropRequest,
        config: CaptureConfig,
    ) -> CaptureResult<Self> {
        config.validate()?;
        log::debug!("Session for {}: {}", target, SessionState::Starting);

        let device = backend.create_device()?;
        let mut source = backend.bind_target(&device, &target, config.frame_pool_buffers)?;

        let native = source.native_size()?;
        let region = resolve_region(crop, native)?;
        log::debug!(
            "Resolved region {} for {} ({}x{} native)",
            region,
            target,
            native.width,
            native.height
        );

        let staging = device.create_staging(region.size())?;

        if config.suppress_border {
            if source.supports_border_toggle() {
                if let Err(e) = source.set_border_required(false) {
                    log::warn!("Could not suppress capture border: {}", e);
                }
            } else {
                log::debug!("Capture border toggle not supported on {}", backend.name());
            }
        }

        let shared = Arc::new(SessionShared {
            device,
            region,
            slot: FrameSlot::new(staging),
            empty_signals: AtomicU64::new(0),
            callback_faults: AtomicU64::new(0),
        });

        let handler_state = Arc::clone(&shared);
        let subscribed = source.subscribe(Box::new(
            move |pool: &dyn FramePool<<B::Device as GraphicsDevice>::Surface>| {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                    handler_state.on_frame_arrived(pool)
                }));
                if delivered.is_err() {
                    handler_state.callback_faults.fetch_add(1, Ordering::Relaxed);
                    log::error!("Frame handler panicked; frame skipped");
                }
            },
        ));

        if let Err(e) = subscribed.and_then(|_| source.start()) {
            source.stop();
            shared.slot.close();
            log::debug!("Session for {} failed to start: {}", target, e);
            return Err(e);
        }

        log::debug!("Session for {}: {}", target, SessionState::Running);
        Ok(Self {
            target,
            region,
            config,
            state: SessionState::Running,
            shared: Some(shared),
            source: Some(source),
        })
    }

    fn shared(&self) -> CaptureResult<&SessionShared<B::Device>> {
        match (&self.state, &self.shared) {
            (SessionState::Running, Some(shared)) => Ok(&**shared),
            _ => Err(CaptureError::SessionClosed),
        }
    }

    /// Copy the latest frame into `dst` as dense `height * width * 4` BGRA rows.
    ///
    /// Never blocks. Fails with [`CaptureError::NoFrameYet`] until the first
    /// frame arrives and with [`CaptureError::BufferTooSmall`] (leaving `dst`
    /// untouched) when `dst` cannot hold the region.
    pub fn try_read_latest(&self, dst: &mut [u8]) -> CaptureResult<FrameInfo> {
        let shared = self.shared()?;
        let region = self.region;
        let required = region.frame_bytes();

        let (_, sequence) = shared.slot.read(self.config.read_policy, |staging| {
            if dst.len() < required {
                return Err(CaptureError::BufferTooSmall {
                    required,
                    provided: dst.len(),
                });
            }
            shared.device.map_staging(staging, |mapped| {
                copy_rows(
                    mapped.data,
                    dst,
                    RowCopy::dense(region.height as usize, region.row_bytes(), mapped.row_pitch),
                )
            })
        })?;

        Ok(FrameInfo {
            width: region.width,
            height: region.height,
            sequence,
        })
    }

    /// Copy the top-left `width x height` corner of the latest frame into `dst`.
    ///
    /// Destination rows are `width * 4` bytes apart. Only
    /// `min(width, region width)` columns of `min(height, region height)` rows
    /// are written; the rest of `dst` is left as it was. The ready flag is
    /// left alone.
    pub fn read_latest_into(
        &self,
        dst: &mut [u8],
        width: u32,
        height: u32,
    ) -> CaptureResult<FrameInfo> {
        let shared = self.shared()?;
        let required = width as usize * height as usize * BYTES_PER_PIXEL;
        if dst.len() < required {
            return Err(CaptureError::BufferTooSmall {
                required,
                provided: dst.len(),
            });
        }

        let rows = height.min(self.region.height) as usize;
        let cols = width.min(self.region.width) as usize;

        let (_, sequence) = shared.slot.read(ReadPolicy::Retain, |staging| {
            shared.device.map_staging(staging, |mapped| {
                copy_rows(
                    mapped.data,
                    dst,
                    RowCopy {
                        rows,
                        row_bytes: cols * BYTES_PER_PIXEL,
                        src_pitch: mapped.row_pitch,
                        dst_pitch: width as usize * BYTES_PER_PIXEL,
                    },
                )
            })
        })?;

        Ok(FrameInfo {
            width: cols as u32,
            height: rows as u32,
            sequence,
        })
    }

    /// Latest frame as an owned buffer
    pub fn latest_frame(&self) -> CaptureResult<Frame> {
        let mut data = vec![0u8; self.region.frame_bytes()];
        let info = self.try_read_latest(&mut data)?;
        Ok(Frame {
            data,
            width: info.width,
            height: info.height,
            sequence: info.sequence,
        })
    }

    /// Block until a frame newer than `after` is ready (0 accepts any frame)
    pub fn wait_for_frame(&self, after: u64, timeout: Duration) -> CaptureResult<u64> {
        self.shared()?.slot.wait_for_frame(after, timeout)
    }

    /// Whether a frame is ready to be read
    pub fn has_frame(&self) -> bool {
        self.shared().map(|s| s.slot.is_ready()).unwrap_or(false)
    }

    pub fn stats(&self) -> SessionStats {
        let Some(shared) = &self.shared else {
            return SessionStats::default();
        };
        let counters = shared.slot.counters();
        SessionStats {
            frames_published: counters.published,
            frames_overwritten: counters.overwritten,
            reads_served: counters.reads,
            empty_signals: shared.empty_signals.load(Ordering::Relaxed),
            callback_faults: shared.callback_faults.load(Ordering::Relaxed),
        }
    }

    /// Stop the stream and release every resource. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        if let Some(shared) = self.shared.take() {
            shared.slot.close();
        }

        self.state = SessionState::Closed;
        log::debug!("Session for {}: {}", self.target, self.state);
    }

    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}
