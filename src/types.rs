//! Core types shared by the capture pipeline

use std::fmt;
use std::time::Duration;

use crate::error::{CaptureError, CaptureResult};

/// Bytes per pixel of every surface in the pipeline (B, G, R, A)
pub const BYTES_PER_PIXEL: usize = 4;

/// Default wait budget of the one-shot capture
pub const DEFAULT_ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(2);

/// Native window handle (`HWND`) stored as an integer so it can cross threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> isize {
        self.0
    }
}

/// Native monitor handle (`HMONITOR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorHandle(isize);

impl MonitorHandle {
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> isize {
        self.0
    }
}

/// Window or monitor a session captures from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    Window(WindowHandle),
    Monitor(MonitorHandle),
}

impl CaptureTarget {
    pub const fn window(raw: isize) -> Self {
        CaptureTarget::Window(WindowHandle::from_raw(raw))
    }

    pub const fn monitor(raw: isize) -> Self {
        CaptureTarget::Monitor(MonitorHandle::from_raw(raw))
    }
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Window(h) => write!(f, "window 0x{:x}", h.raw() as usize),
            CaptureTarget::Monitor(h) => write!(f, "monitor 0x{:x}", h.raw() as usize),
        }
    }
}

/// Pixel dimensions of a surface or capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Crop rectangle as requested by a caller, before resolution.
///
/// Any non-positive width or height means "no crop".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRequest {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CropRequest {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Full-frame request
    pub const fn none() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn is_crop(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Resolved capture rectangle in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// `true` when the rectangle was caller-supplied and is cropped on the GPU
    pub clipped: bool,
}

impl Region {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Bytes in one dense destination row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Bytes of a dense `height * width * 4` export
    pub fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.height as usize
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {}){}",
            self.width,
            self.height,
            self.x,
            self.y,
            if self.clipped { " [crop]" } else { "" }
        )
    }
}

/// Metadata of a frame exported by a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    /// Monotonic publish counter; equal values mean the same frame
    pub sequence: u64,
}

/// Owned dense BGRA frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Top-down rows of `width * 4` bytes, no padding
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

impl Frame {
    /// Get the total size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the BGRA bytes of a pixel
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data.get(offset..offset + BYTES_PER_PIXEL)
    }
}

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Running,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "Uninitialized"),
            SessionState::Starting => write!(f, "Starting"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// What a successful read does to the slot's ready flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Frame stays readable until the next callback overwrites it
    #[default]
    Retain,
    /// Frame is consumed; the next read fails until a new frame arrives
    Consume,
}

impl ReadPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Some(ReadPolicy::Retain),
            "consume" | "clear" => Some(ReadPolicy::Consume),
            _ => None,
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Ready-flag behaviour of the polling reader
    pub read_policy: ReadPolicy,
    /// Wait budget of the one-shot capture
    pub one_shot_timeout: Duration,
    /// Ask the compositor to hide the capture border (when supported)
    pub suppress_border: bool,
    /// Surfaces kept in the compositor frame pool
    pub frame_pool_buffers: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            read_policy: ReadPolicy::Retain,
            one_shot_timeout: DEFAULT_ONE_SHOT_TIMEOUT,
            suppress_border: true,
            frame_pool_buffers: 1,
        }
    }
}

impl CaptureConfig {
    /// Validate the configuration
    pub fn validate(&self) -> CaptureResult<()> {
        if self.one_shot_timeout.is_zero() {
            return Err(CaptureError::InvalidConfiguration(
                "one-shot timeout must be non-zero".to_string(),
            ));
        }
        if self.frame_pool_buffers == 0 {
            return Err(CaptureError::InvalidConfiguration(
                "frame pool needs at least one buffer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters of a capture session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames copied into the staging surface
    pub frames_published: u64,
    /// Published frames overwritten before any read saw them
    pub frames_overwritten: u64,
    /// Successful exports
    pub reads_served: u64,
    /// Callbacks that found no frame in the pool
    pub empty_signals: u64,
    /// Callbacks whose copy failed and was skipped
    pub callback_faults: u64,
}

impl SessionStats {
    /// Percentage of published frames never read
    pub fn overwrite_rate(&self) -> f64 {
        if self.frames_published == 0 {
            0.0
        } else {
            (self.frames_overwritten as f64 / self.frames_published as f64) * 100.0
        }
    }
}
