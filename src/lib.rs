//! Window and monitor capture through Windows Graphics Capture
//!
//! Frames are pushed by the OS compositor into a GPU staging surface and
//! handed out as dense, top-down BGRA rows. Two consumption modes exist: a
//! persistent [`CaptureSession`] that is polled for its latest frame, and a
//! one-shot [`capture_once`] that blocks until a single frame arrives.
//!
//! # Example
//!
//! ```
//! use wgc_capture_rust::{CaptureConfig, CaptureSession, CropRequest, Size, SoftwareBackend};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // The in-memory backend stands in for the compositor
//! let backend = SoftwareBackend::new();
//! let feed = backend.add_window(0x10, Size::new(64, 32));
//!
//! let session = CaptureSession::start(
//!     &backend,
//!     feed.target(),
//!     CropRequest::none(),
//!     CaptureConfig::default(),
//! )?;
//! feed.push_solid([0, 0, 255, 255]);
//!
//! let mut pixels = vec![0u8; session.region().frame_bytes()];
//! let info = session.try_read_latest(&mut pixels)?;
//! assert_eq!((info.width, info.height), (64, 32));
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod capture;
pub mod env_config;
pub mod error;
pub mod host;
pub mod oneshot;
pub mod pitch;
pub mod region;
pub mod session;
pub mod slot;
pub mod types;

#[cfg(feature = "c-api")]
pub mod ffi;

// Re-export main types
pub use capture::{
    platform_backend, CaptureBackend, CaptureSource, GraphicsDevice, PlatformBackend,
    SoftwareBackend, SoftwareFeed,
};
pub use error::{CaptureError, CaptureResult};
pub use host::SessionHost;
pub use oneshot::{capture_once, capture_once_to_vec};
pub use session::CaptureSession;
pub use types::{
    CaptureConfig, CaptureTarget, CropRequest, Frame, FrameInfo, MonitorHandle, ReadPolicy,
    Region, SessionState, SessionStats, Size, WindowHandle,
};

/// Library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get library capabilities
pub fn capabilities() -> String {
    let mut caps = vec![platform_backend().name()];

    #[cfg(target_os = "windows")]
    if capture::windows::WgcBackend::is_supported() {
        caps.push("Supported");
    }

    #[cfg(feature = "c-api")]
    caps.push("C API");

    caps.join(", ")
}
