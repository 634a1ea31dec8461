//! Holder for the one persistent session a process exposes.
//!
//! Initializing while a session is running closes it first. Cleanup is
//! idempotent. One-shot captures run beside the persistent session without
//! touching it.

use parking_lot::Mutex;

use crate::capture::traits::CaptureBackend;
use crate::error::{CaptureError, CaptureResult};
use crate::oneshot;
use crate::session::CaptureSession;
use crate::types::{CaptureConfig, CaptureTarget, CropRequest, FrameInfo, Region, SessionStats};

/// Backend plus at most one live persistent session
pub struct SessionHost<B: CaptureBackend> {
    backend: B,
    config: CaptureConfig,
    session: Mutex<Option<CaptureSession<B>>>,
}

impl<B: CaptureBackend> SessionHost<B> {
    pub fn new(backend: B, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Start a persistent session on `target`, replacing any running one.
    ///
    /// The old session is fully closed before the new one is built. On
    /// failure no session remains.
    pub fn init(&self, target: CaptureTarget, crop: CropRequest) -> CaptureResult<Region> {
        let mut guard = self.session.lock();
        if let Some(mut previous) = guard.take() {
            log::debug!("Replacing session for {}", previous.target());
            previous.close();
        }

        let session = CaptureSession::start(&self.backend, target, crop, self.config.clone())?;
        let region = session.region();
        *guard = Some(session);
        Ok(region)
    }

    /// Copy the latest frame of the persistent session into `dst`
    pub fn get_latest_frame(&self, dst: &mut [u8]) -> CaptureResult<FrameInfo> {
        self.session
            .lock()
            .as_ref()
            .ok_or(CaptureError::SessionClosed)?
            .try_read_latest(dst)
    }

    /// Close the persistent session, if any
    pub fn cleanup(&self) {
        if let Some(mut session) = self.session.lock().take() {
            session.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Region of the persistent session
    pub fn region(&self) -> Option<Region> {
        self.session.lock().as_ref().map(|s| s.region())
    }

    /// Counters of the persistent session
    pub fn stats(&self) -> Option<SessionStats> {
        self.session.lock().as_ref().map(|s| s.stats())
    }

    /// Run a one-shot capture with the host's backend and configuration
    pub fn capture_once(
        &self,
        target: CaptureTarget,
        dst: &mut [u8],
        width: u32,
        height: u32,
    ) -> CaptureResult<FrameInfo> {
        oneshot::capture_once(&self.backend, target, dst, width, height, &self.config)
    }
}
